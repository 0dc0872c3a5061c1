//! Controlled Digital Lending state carried in a hold's comment field.
//!
//! Format: `CDL;{druid};{circ_record_key};{checkout_epoch};{state}`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;

/// Time a patron has to claim a digital loan once they are next in line.
pub const CLAIM_WINDOW_MINUTES: i64 = 30;

const VIEWER_BASE: &str = "https://embed.stanford.edu/iiif/cdl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CdlState {
    CheckedOut,
    NextUp,
    Waitlist,
    Expired,
    Other(String),
}

impl CdlState {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" | "CHECKEDOUT" | "CHECKED_OUT" => Self::CheckedOut,
            "NEXT_UP" | "NEXTUP" => Self::NextUp,
            "WAITLIST" | "WAITING" => Self::Waitlist,
            "EXPIRED" => Self::Expired,
            _ => Self::Other(raw.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CdlInfo {
    pub druid: String,
    pub circ_record_key: Option<String>,
    pub checkout_date: Option<DateTime<Utc>>,
    pub state: CdlState,
}

impl CdlInfo {
    /// `None` unless the comment is a complete five-part CDL record.
    pub fn parse(comment: &str) -> Option<Self> {
        let parts: Vec<&str> = comment.trim().split(';').collect();
        if parts.len() < 5 || parts[0].trim() != "CDL" {
            return None;
        }

        let druid = parts[1].trim();
        if druid.is_empty() {
            return None;
        }

        let circ_record_key = Some(parts[2].trim())
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        let checkout_date = parts[3]
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|epoch| *epoch > 0)
            .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single());

        Some(Self {
            druid: druid.to_string(),
            circ_record_key,
            checkout_date,
            state: CdlState::parse(parts[4]),
        })
    }

    pub fn checked_out(&self) -> bool {
        self.state == CdlState::CheckedOut
    }

    pub fn next_up(&self) -> bool {
        self.state == CdlState::NextUp
    }

    pub fn waitlisted(&self) -> bool {
        self.state == CdlState::Waitlist
    }

    pub fn claim_expires_at(&self) -> Option<DateTime<Utc>> {
        if !self.next_up() {
            return None;
        }
        self.checkout_date
            .map(|d| d + Duration::minutes(CLAIM_WINDOW_MINUTES))
    }

    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        self.state == CdlState::Expired || self.claim_expires_at().is_some_and(|at| at <= now)
    }

    pub fn viewer_url(&self) -> String {
        format!("{}/{}", VIEWER_BASE, self.druid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_complete_comment() {
        let info = CdlInfo::parse("CDL;bb123cd4567;20000101;1714564800;NEXT_UP").unwrap();
        assert_eq!(info.druid, "bb123cd4567");
        assert_eq!(info.circ_record_key.as_deref(), Some("20000101"));
        assert_eq!(info.checkout_date.unwrap().timestamp(), 1_714_564_800);
        assert!(info.next_up());
        assert_eq!(
            info.claim_expires_at().unwrap().timestamp(),
            1_714_564_800 + 30 * 60
        );
        assert_eq!(info.viewer_url(), "https://embed.stanford.edu/iiif/cdl/bb123cd4567");
    }

    #[test]
    fn test_next_up_expires_after_claim_window() {
        let info = CdlInfo::parse("CDL;bb123cd4567;;1714564800;NEXT_UP").unwrap();
        let start = info.checkout_date.unwrap();
        assert!(!info.expired(start + Duration::minutes(29)));
        assert!(info.expired(start + Duration::minutes(30)));
        assert_eq!(info.circ_record_key, None);
    }

    #[test]
    fn test_waitlist_without_epoch() {
        let info = CdlInfo::parse("CDL;bb123cd4567;;0;WAITLIST").unwrap();
        assert!(info.waitlisted());
        assert_eq!(info.checkout_date, None);
        assert_eq!(info.claim_expires_at(), None);
    }

    #[test]
    fn test_malformed_comments() {
        assert_eq!(CdlInfo::parse(""), None);
        assert_eq!(CdlInfo::parse("Please hold at the front desk"), None);
        assert_eq!(CdlInfo::parse("CDL;bb123cd4567;123"), None);
        assert_eq!(CdlInfo::parse("CDL;;123;1714564800;ACTIVE"), None);
        assert_eq!(CdlInfo::parse("XYZ;bb1;2;3;ACTIVE"), None);
    }

    #[test]
    fn test_unknown_state_kept() {
        let info = CdlInfo::parse("CDL;bb1;2;x;Returned").unwrap();
        assert_eq!(info.state, CdlState::Other("Returned".to_string()));
        assert_eq!(info.checkout_date, None);
    }
}
