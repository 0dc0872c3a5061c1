//! Renewal eligibility.
//!
//! A loan is renewable unless one of the reasons below applies. When several
//! apply, the patron sees the first one in this order:
//!
//! 1. lost
//! 2. recalled
//! 3. claimed returned
//! 4. online (unseen) renewals exhausted
//! 5. all (seen) renewals exhausted
//! 6. reserve item
//! 7. item category not renewable
//! 8. too early in the renewal schedule

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Renewals left on a loan. Symphony reports "unlimited" as a separate flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "count", rename_all = "snake_case")]
pub enum Renewals {
    Unlimited,
    Remaining(u32),
}

impl Renewals {
    pub fn exhausted(&self) -> bool {
        matches!(self, Renewals::Remaining(0))
    }

    /// `allowed - used`, floored at zero; `None` allowed means unlimited.
    pub fn from_allowance(allowed: Option<u32>, used: u32) -> Self {
        match allowed {
            None => Renewals::Unlimited,
            Some(n) => Renewals::Remaining(n.saturating_sub(used)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "until", rename_all = "snake_case")]
pub enum NonRenewableReason {
    Lost,
    Recalled,
    ClaimedReturned,
    NoOnlineRenewals,
    NoRenewals,
    ReserveItem,
    NotRenewable,
    TooSoon(DateTime<Utc>),
}

impl fmt::Display for NonRenewableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lost => f.write_str("Item is assumed lost; you must return the item or pay the fee"),
            Self::Recalled => f.write_str("Item has been recalled"),
            Self::ClaimedReturned => f.write_str("Item is claimed as returned"),
            Self::NoOnlineRenewals => {
                f.write_str("No online renewals left; you may renew this item in person")
            }
            Self::NoRenewals => f.write_str("No renewals left"),
            Self::ReserveItem => f.write_str("Reserve items cannot be renewed"),
            Self::NotRenewable => f.write_str("Item type cannot be renewed"),
            Self::TooSoon(date) => {
                write!(f, "Item can't be renewed until {}", date.format("%b %-d, %Y"))
            }
        }
    }
}

/// Everything the rules look at, already normalized from either ILS.
#[derive(Debug, Clone, PartialEq)]
pub struct RenewalFacts {
    pub lost: bool,
    pub recalled: bool,
    pub claimed_returned: bool,
    pub unseen_renewals: Renewals,
    pub seen_renewals: Renewals,
    pub reserve_item: bool,
    pub category_renewable: bool,
    pub renewable_at: Option<DateTime<Utc>>,
}

impl Default for RenewalFacts {
    fn default() -> Self {
        Self {
            lost: false,
            recalled: false,
            claimed_returned: false,
            unseen_renewals: Renewals::Unlimited,
            seen_renewals: Renewals::Unlimited,
            reserve_item: false,
            category_renewable: true,
            renewable_at: None,
        }
    }
}

pub fn evaluate(facts: &RenewalFacts, now: DateTime<Utc>) -> Option<NonRenewableReason> {
    if facts.lost {
        return Some(NonRenewableReason::Lost);
    }
    if facts.recalled {
        return Some(NonRenewableReason::Recalled);
    }
    if facts.claimed_returned {
        return Some(NonRenewableReason::ClaimedReturned);
    }
    if facts.unseen_renewals.exhausted() {
        return Some(NonRenewableReason::NoOnlineRenewals);
    }
    if facts.seen_renewals.exhausted() {
        return Some(NonRenewableReason::NoRenewals);
    }
    if facts.reserve_item {
        return Some(NonRenewableReason::ReserveItem);
    }
    if !facts.category_renewable {
        return Some(NonRenewableReason::NotRenewable);
    }
    match facts.renewable_at {
        Some(at) if at > now => Some(NonRenewableReason::TooSoon(at)),
        _ => None,
    }
}
