use crate::utils::error::{PortalError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    DueDate,
    Title,
    Author,
    CallNumber,
    Date,
    Status,
}

impl FromStr for SortField {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "due_date" | "due" => Ok(Self::DueDate),
            "title" => Ok(Self::Title),
            "author" => Ok(Self::Author),
            "call_number" | "callnumber" => Ok(Self::CallNumber),
            "date" | "placed" => Ok(Self::Date),
            "status" => Ok(Self::Status),
            other => Err(PortalError::validation(format!("Unknown sort field: {}", other))),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DueDate => "due_date",
            Self::Title => "title",
            Self::Author => "author",
            Self::CallNumber => "call_number",
            Self::Date => "date",
            Self::Status => "status",
        };
        f.write_str(name)
    }
}

/// Items without a date sort after every dated item.
pub fn date_component(date: Option<DateTime<Utc>>) -> String {
    match date {
        Some(d) => format!("{:012}", d.timestamp().max(0)),
        None => "999999999999".to_string(),
    }
}

/// Joins components the same way for every sortable record, so mixed lists
/// (ILS holds next to ILLiad transactions) compare sensibly.
pub fn join_key(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim().to_lowercase())
        .collect::<Vec<_>>()
        .join("---")
}

pub trait Sortable {
    fn sort_key(&self, field: SortField) -> String;
}

impl<T: Sortable + ?Sized> Sortable for &T {
    fn sort_key(&self, field: SortField) -> String {
        (**self).sort_key(field)
    }
}

pub fn sort_by<T: Sortable>(items: &mut [T], field: SortField) {
    items.sort_by_cached_key(|item| item.sort_key(field));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_sort_field() {
        assert_eq!("due_date".parse::<SortField>().unwrap(), SortField::DueDate);
        assert_eq!("Title".parse::<SortField>().unwrap(), SortField::Title);
        assert!("shelf".parse::<SortField>().is_err());
    }

    #[test]
    fn test_undated_sorts_last() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(date_component(Some(early)) < date_component(None));
    }

    #[test]
    fn test_join_key_is_case_insensitive() {
        assert_eq!(join_key(&["Zebra ", "abc"]), "zebra---abc");
    }
}
