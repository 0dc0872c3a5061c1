use crate::domain::renewal::{self, NonRenewableReason, RenewalFacts};
use crate::domain::sort::{date_component, join_key, SortField, Sortable};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

pub use crate::domain::renewal::Renewals;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoanPolicy {
    pub name: String,
    /// False for item categories that never renew (e.g. non-circulating types).
    pub renewable: bool,
    /// Renewal is allowed this many days before the due date.
    pub renew_from_days: Option<i64>,
    pub renew_items_with_request: bool,
    /// Loan periods measured in hours rather than days.
    pub short_term: bool,
}

impl Default for LoanPolicy {
    fn default() -> Self {
        Self {
            name: String::new(),
            renewable: true,
            renew_from_days: None,
            renew_items_with_request: true,
            short_term: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Checkout {
    pub key: String,
    pub item_key: String,
    pub barcode: Option<String>,
    pub catalog_key: Option<String>,
    pub title: String,
    pub author: Option<String>,
    pub call_number: Option<String>,
    pub library: Option<String>,
    pub location: Option<String>,
    pub patron_key: String,
    pub checkout_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub recall_due_date: Option<DateTime<Utc>>,
    pub claims_returned_date: Option<DateTime<Utc>>,
    pub lost: bool,
    /// As reported by the ILS; `overdue()` also checks the due date.
    pub overdue_flag: bool,
    pub accrued: Decimal,
    pub reserve: bool,
    pub cdl: bool,
    pub policy: LoanPolicy,
    pub hold_queue_length: u32,
    pub renewal_count: u32,
    pub unseen_renewals_remaining: Renewals,
    pub seen_renewals_remaining: Renewals,
}

impl Checkout {
    pub fn new(key: impl Into<String>, item_key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            item_key: item_key.into(),
            barcode: None,
            catalog_key: None,
            title: title.into(),
            author: None,
            call_number: None,
            library: None,
            location: None,
            patron_key: String::new(),
            checkout_date: None,
            due_date: None,
            recall_due_date: None,
            claims_returned_date: None,
            lost: false,
            overdue_flag: false,
            accrued: Decimal::ZERO,
            reserve: false,
            cdl: false,
            policy: LoanPolicy::default(),
            hold_queue_length: 0,
            renewal_count: 0,
            unseen_renewals_remaining: Renewals::Unlimited,
            seen_renewals_remaining: Renewals::Unlimited,
        }
    }

    pub fn overdue(&self, now: DateTime<Utc>) -> bool {
        self.overdue_flag || self.due_date.is_some_and(|due| due < now)
    }

    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        match self.due_date {
            Some(due) if due < now => (now - due).num_days(),
            _ => 0,
        }
    }

    pub fn recalled(&self) -> bool {
        self.recall_due_date.is_some()
            || (self.hold_queue_length > 0 && !self.policy.renew_items_with_request)
    }

    pub fn lost(&self) -> bool {
        self.lost
    }

    pub fn claimed_returned(&self) -> bool {
        self.claims_returned_date.is_some()
    }

    pub fn short_term_loan(&self) -> bool {
        self.policy.short_term
    }

    /// `None` when there is no window, or when the window reaches past the
    /// representable date range (renewable at any time).
    pub fn renewable_at(&self) -> Option<DateTime<Utc>> {
        let days = self.policy.renew_from_days?;
        let due = self.due_date?;
        Duration::try_days(days).and_then(|window| due.checked_sub_signed(window))
    }

    pub fn renewal_facts(&self) -> RenewalFacts {
        RenewalFacts {
            lost: self.lost(),
            recalled: self.recalled(),
            claimed_returned: self.claimed_returned(),
            unseen_renewals: self.unseen_renewals_remaining,
            seen_renewals: self.seen_renewals_remaining,
            reserve_item: self.reserve,
            category_renewable: self.policy.renewable,
            renewable_at: self.renewable_at(),
        }
    }

    pub fn non_renewable_reason(&self, now: DateTime<Utc>) -> Option<NonRenewableReason> {
        renewal::evaluate(&self.renewal_facts(), now)
    }

    pub fn renewable(&self, now: DateTime<Utc>) -> bool {
        self.non_renewable_reason(now).is_none()
    }

    pub fn catalog_url(&self, base: &str) -> Option<String> {
        self.catalog_key
            .as_ref()
            .map(|key| format!("{}/view/{}", base.trim_end_matches('/'), key))
    }
}

impl Sortable for Checkout {
    fn sort_key(&self, field: SortField) -> String {
        let due = date_component(self.recall_due_date.or(self.due_date));
        let title = self.title.as_str();
        let author = self.author.as_deref().unwrap_or("");
        let call_number = self.call_number.as_deref().unwrap_or("");
        match field {
            SortField::Title => join_key(&[title, &due, author, call_number]),
            SortField::Author => join_key(&[author, title, &due, call_number]),
            SortField::CallNumber => join_key(&[call_number, title, &due, author]),
            SortField::Date => {
                join_key(&[&date_component(self.checkout_date), title, author, call_number])
            }
            SortField::DueDate | SortField::Status => join_key(&[&due, title, author, call_number]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sort::sort_by;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn loan(title: &str, due_in_days: i64) -> Checkout {
        let mut c = Checkout::new(format!("c-{}", title), format!("i-{}", title), title);
        c.due_date = Some(now() + Duration::days(due_in_days));
        c
    }

    #[test]
    fn test_overdue_and_days_overdue() {
        let c = loan("Late", -3);
        assert!(c.overdue(now()));
        assert_eq!(c.days_overdue(now()), 3);

        let c = loan("OnTime", 5);
        assert!(!c.overdue(now()));
        assert_eq!(c.days_overdue(now()), 0);
    }

    #[test]
    fn test_hold_queue_counts_as_recall_when_policy_forbids_renewing_requested_items() {
        let mut c = loan("Wanted", 10);
        c.hold_queue_length = 2;
        assert!(!c.recalled());

        c.policy.renew_items_with_request = false;
        assert!(c.recalled());
        assert_eq!(c.non_renewable_reason(now()), Some(NonRenewableReason::Recalled));
    }

    #[test]
    fn test_renew_window() {
        let mut c = loan("Window", 10);
        c.policy.renew_from_days = Some(7);
        let reason = c.non_renewable_reason(now());
        assert_eq!(reason, Some(NonRenewableReason::TooSoon(now() + Duration::days(3))));

        c.policy.renew_from_days = Some(14);
        assert!(c.renewable(now()));
    }

    #[test]
    fn test_oversized_renew_window_does_not_overflow() {
        let mut c = loan("Forever", 10);
        c.policy.renew_from_days = Some(4_000_000_000);
        assert_eq!(c.renewable_at(), None);
        assert!(c.renewable(now()));

        c.policy.renew_from_days = Some(i64::MAX);
        assert_eq!(c.renewable_at(), None);
    }

    #[test]
    fn test_lost_beats_recall_on_a_loan() {
        let mut c = loan("Gone", -40);
        c.lost = true;
        c.recall_due_date = Some(now());
        assert_eq!(c.non_renewable_reason(now()), Some(NonRenewableReason::Lost));
    }

    #[test]
    fn test_sort_by_due_date_prefers_recall_date() {
        let mut a = loan("Alpha", 20);
        a.recall_due_date = Some(now() + Duration::days(1));
        let b = loan("Beta", 5);
        let mut items = vec![b, a];
        sort_by(&mut items, SortField::DueDate);
        assert_eq!(items[0].title, "Alpha");

        sort_by(&mut items, SortField::Title);
        assert_eq!(items[0].title, "Alpha");
        assert_eq!(items[1].title, "Beta");
    }

    #[test]
    fn test_catalog_url() {
        let mut c = loan("Linked", 1);
        assert_eq!(c.catalog_url("https://searchworks.example.edu"), None);
        c.catalog_key = Some("12345".to_string());
        assert_eq!(
            c.catalog_url("https://searchworks.example.edu/").as_deref(),
            Some("https://searchworks.example.edu/view/12345")
        );
    }
}
