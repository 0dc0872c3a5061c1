use crate::domain::cdl::CdlInfo;
use crate::domain::pickup::PickupLibraries;
use crate::domain::sort::{date_component, join_key, SortField, Sortable};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestSource {
    Ils,
    BorrowDirect,
    Reshare,
    Illiad,
}

impl RequestSource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ils => "Library",
            Self::BorrowDirect | Self::Reshare => "BorrowDirect",
            Self::Illiad => "Interlibrary Loan",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub key: String,
    pub source: RequestSource,
    pub title: String,
    pub author: Option<String>,
    pub call_number: Option<String>,
    pub catalog_key: Option<String>,
    pub item_key: Option<String>,
    pub status: String,
    pub ready: bool,
    pub queue_position: Option<u32>,
    pub queue_length: Option<u32>,
    pub pickup_library: Option<String>,
    pub placed_date: Option<DateTime<Utc>>,
    /// "Not needed after" date.
    pub fill_by_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    /// Date the item went on the hold shelf.
    pub waiting_date: Option<DateTime<Utc>>,
    pub patron_key: String,
    /// Location code of the requested item, used for pickup restrictions.
    pub item_location: Option<String>,
    pub comment: Option<String>,
    /// Where to manage requests that live outside the ILS.
    pub manage_url: Option<String>,
}

impl Request {
    pub fn new(key: impl Into<String>, source: RequestSource, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            source,
            title: title.into(),
            author: None,
            call_number: None,
            catalog_key: None,
            item_key: None,
            status: String::new(),
            ready: false,
            queue_position: None,
            queue_length: None,
            pickup_library: None,
            placed_date: None,
            fill_by_date: None,
            expiration_date: None,
            waiting_date: None,
            patron_key: String::new(),
            item_location: None,
            comment: None,
            manage_url: None,
        }
    }

    pub fn ready_for_pickup(&self) -> bool {
        self.ready
    }

    pub fn cdl(&self) -> Option<CdlInfo> {
        self.comment.as_deref().and_then(CdlInfo::parse)
    }

    /// Position among patrons waiting for a digital copy.
    pub fn cdl_waitlist_position(&self) -> Option<String> {
        let info = self.cdl()?;
        if !info.waitlisted() {
            return None;
        }
        Some(match (self.queue_position, self.queue_length) {
            (Some(pos), Some(len)) if len > 0 => format!("{} of {}", pos, len),
            (Some(pos), _) => pos.to_string(),
            _ => "Unknown".to_string(),
        })
    }

    pub fn cancellable(&self) -> bool {
        self.source == RequestSource::Ils && self.cdl().map_or(true, |c| !c.checked_out())
    }

    pub fn modifiable(&self) -> bool {
        self.source == RequestSource::Ils && !self.ready && self.cdl().is_none()
    }

    pub fn pickup_options(&self, pickup: &PickupLibraries) -> Vec<String> {
        if !self.modifiable() {
            return self.pickup_library.iter().cloned().collect();
        }
        pickup.options_for(self.item_location.as_deref(), self.pickup_library.as_deref())
    }

    pub fn pickup_allowed(&self, pickup: &PickupLibraries, code: &str) -> bool {
        self.modifiable() && pickup.allowed(self.item_location.as_deref(), code)
    }
}

impl Sortable for Request {
    fn sort_key(&self, field: SortField) -> String {
        let placed = date_component(self.placed_date);
        let title = self.title.as_str();
        let author = self.author.as_deref().unwrap_or("");
        let call_number = self.call_number.as_deref().unwrap_or("");
        match field {
            SortField::Title => join_key(&[title, &placed, author]),
            SortField::Author => join_key(&[author, title, &placed]),
            SortField::CallNumber => join_key(&[call_number, title, &placed]),
            SortField::Status => {
                // ready items first, then by queue position
                let readiness = if self.ready { "0" } else { "1" };
                let position = format!("{:06}", self.queue_position.unwrap_or(999_999));
                join_key(&[readiness, &position, title])
            }
            SortField::DueDate => join_key(&[&date_component(self.expiration_date), title]),
            SortField::Date => join_key(&[&placed, title, author]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sort::sort_by;
    use std::collections::{BTreeMap, HashMap};

    fn pickup() -> PickupLibraries {
        let mut libraries = BTreeMap::new();
        libraries.insert("GREEN".to_string(), "Green Library".to_string());
        libraries.insert("MUSIC".to_string(), "Music Library".to_string());
        let mut restrictions = HashMap::new();
        restrictions.insert("PAGE-MU".to_string(), vec!["MUSIC".to_string()]);
        PickupLibraries {
            libraries,
            default: vec!["GREEN".to_string()],
            restrictions,
        }
    }

    #[test]
    fn test_cdl_waitlist_position() {
        let mut r = Request::new("1", RequestSource::Ils, "Digital thing");
        r.comment = Some("CDL;bb1;;0;WAITLIST".to_string());
        r.queue_position = Some(2);
        r.queue_length = Some(5);
        assert_eq!(r.cdl_waitlist_position().as_deref(), Some("2 of 5"));
        assert!(!r.modifiable());
        assert!(r.cancellable());

        r.comment = Some("CDL;bb1;9;1714564800;ACTIVE".to_string());
        assert_eq!(r.cdl_waitlist_position(), None);
        assert!(!r.cancellable());
    }

    #[test]
    fn test_external_requests_are_read_only() {
        let r = Request::new("TN-1", RequestSource::Illiad, "ILL book");
        assert!(!r.cancellable());
        assert!(!r.modifiable());
        assert!(!r.pickup_allowed(&pickup(), "GREEN"));
    }

    #[test]
    fn test_pickup_eligibility_follows_location() {
        let mut r = Request::new("1", RequestSource::Ils, "Score");
        r.item_location = Some("PAGE-MU".to_string());
        r.pickup_library = Some("MUSIC".to_string());
        assert_eq!(r.pickup_options(&pickup()), vec!["MUSIC"]);
        assert!(r.pickup_allowed(&pickup(), "MUSIC"));
        assert!(!r.pickup_allowed(&pickup(), "GREEN"));

        r.ready = true;
        assert!(!r.pickup_allowed(&pickup(), "MUSIC"));
    }

    #[test]
    fn test_status_sort_puts_ready_first() {
        let mut waiting = Request::new("1", RequestSource::Ils, "A");
        waiting.queue_position = Some(1);
        let mut ready = Request::new("2", RequestSource::Ils, "B");
        ready.ready = true;
        let mut items = vec![waiting, ready];
        sort_by(&mut items, SortField::Status);
        assert_eq!(items[0].key, "2");
    }
}
