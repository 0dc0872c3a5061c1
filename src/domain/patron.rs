use crate::domain::checkout::Checkout;
use crate::domain::fine::{self, Fine, Payment};
use crate::domain::group::{Group, View};
use crate::domain::request::Request;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Standing {
    Ok,
    Blocked,
    Barred,
    Expired,
}

impl Standing {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Blocked => "Blocked",
            Self::Barred => "Barred",
            Self::Expired => "Expired",
        }
    }

    /// Maps Symphony standing keys and FOLIO block summaries.
    pub fn from_ils(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OK" | "" => Self::Ok,
            "BARRED" => Self::Barred,
            "EXPIRED" => Self::Expired,
            // DELINQUENT, BLOCKED, COLLECTION and anything unrecognised
            _ => Self::Blocked,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Sponsor,
    Proxy,
    Plain,
}

impl Role {
    pub fn from_flags(sponsor: bool, proxy: bool) -> Self {
        match (sponsor, proxy) {
            (true, _) => Self::Sponsor,
            (false, true) => Self::Proxy,
            _ => Self::Plain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Patron {
    pub key: String,
    pub barcode: Option<String>,
    /// University login, used to look up interlibrary loan transactions.
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub preferred_name: Option<String>,
    pub email: Option<String>,
    pub patron_type: Option<String>,
    /// Standing as reported by the ILS, before expiration and proxy rules.
    pub standing: Standing,
    pub expires_at: Option<DateTime<Utc>>,
    pub sponsor: bool,
    pub proxy: bool,
    pub sponsor_standing: Option<Standing>,
    pub checkouts: Vec<Checkout>,
    pub requests: Vec<Request>,
    pub fines: Vec<Fine>,
    pub payments: Vec<Payment>,
    pub group: Option<Group>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatronSummary {
    pub key: String,
    pub name: String,
    pub status: Standing,
    pub status_label: &'static str,
    pub role: Role,
    pub checkouts: usize,
    pub overdue: usize,
    pub recalled: usize,
    pub requests: usize,
    pub ready_for_pickup: usize,
    pub total_owed: Decimal,
    pub group_checkouts: usize,
    pub group_requests: usize,
    pub group_owed: Decimal,
}

impl Patron {
    pub fn new(key: impl Into<String>, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            barcode: None,
            username: None,
            first_name: first_name.into(),
            last_name: last_name.into(),
            preferred_name: None,
            email: None,
            patron_type: None,
            standing: Standing::Ok,
            expires_at: None,
            sponsor: false,
            proxy: false,
            sponsor_standing: None,
            checkouts: Vec::new(),
            requests: Vec::new(),
            fines: Vec::new(),
            payments: Vec::new(),
            group: None,
        }
    }

    pub fn display_name(&self) -> String {
        let name = match self.preferred_name.as_deref().map(str::trim) {
            Some(preferred) if !preferred.is_empty() => format!("{} {}", preferred, self.last_name),
            _ => format!("{} {}", self.first_name, self.last_name),
        };
        name.trim().to_string()
    }

    pub fn role(&self) -> Role {
        Role::from_flags(self.sponsor, self.proxy)
    }

    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }

    /// Proxies borrow on the sponsor's account, so the sponsor's standing wins.
    pub fn status(&self, now: DateTime<Utc>) -> Standing {
        if self.role() == Role::Proxy {
            if let Some(standing) = self.sponsor_standing {
                return standing;
            }
        }
        match self.standing {
            Standing::Barred => Standing::Barred,
            Standing::Blocked => Standing::Blocked,
            _ if self.expired(now) => Standing::Expired,
            other => other,
        }
    }

    pub fn can_renew(&self, now: DateTime<Utc>) -> bool {
        self.status(now) == Standing::Ok
    }

    pub fn can_request(&self, now: DateTime<Utc>) -> bool {
        self.status(now) == Standing::Ok
    }

    pub fn has_group_view(&self) -> bool {
        self.role() != Role::Plain && self.group.is_some()
    }

    pub fn visible_checkouts(&self, view: View) -> Vec<&Checkout> {
        match (view, self.role(), &self.group) {
            (View::Own, _, _) => self.checkouts.iter().collect(),
            (View::Group, Role::Sponsor, Some(group)) => group.checkouts.iter().collect(),
            (View::Group, Role::Proxy, Some(group)) => group.checkouts_except(&self.key),
            _ => Vec::new(),
        }
    }

    pub fn visible_requests(&self, view: View) -> Vec<&Request> {
        match (view, self.role(), &self.group) {
            (View::Own, _, _) => self.requests.iter().collect(),
            (View::Group, Role::Sponsor, Some(group)) => group.requests.iter().collect(),
            (View::Group, Role::Proxy, Some(group)) => group.requests_except(&self.key),
            _ => Vec::new(),
        }
    }

    /// Proxy fines roll up to the sponsor: a proxy never sees fines.
    pub fn visible_fines(&self, view: View) -> Vec<&Fine> {
        match (view, self.role(), &self.group) {
            (_, Role::Proxy, _) => Vec::new(),
            (View::Own, _, _) => self.fines.iter().collect(),
            (View::Group, Role::Sponsor, Some(group)) => group.fines.iter().collect(),
            _ => Vec::new(),
        }
    }

    pub fn visible_payments(&self, view: View) -> Vec<&Payment> {
        match (view, self.role(), &self.group) {
            (_, Role::Proxy, _) => Vec::new(),
            (View::Own, _, _) => self.payments.iter().collect(),
            (View::Group, Role::Sponsor, Some(group)) => group.payments.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// A visible fine is not enough: the visible balance must be positive,
    /// since the gateway cannot take a zero-amount sale.
    pub fn can_pay(&self, view: View) -> bool {
        self.role() != Role::Proxy
            && fine::total_owed_refs(&self.visible_fines(view)) > Decimal::ZERO
    }

    pub fn find_checkout(&self, key: &str) -> Option<&Checkout> {
        self.checkouts
            .iter()
            .chain(self.group.iter().flat_map(|g| g.checkouts.iter()))
            .find(|c| c.key == key || c.item_key == key)
    }

    pub fn find_request(&self, key: &str) -> Option<&Request> {
        self.requests
            .iter()
            .chain(self.group.iter().flat_map(|g| g.requests.iter()))
            .find(|r| r.key == key)
    }

    pub fn summary(&self, now: DateTime<Utc>) -> PatronSummary {
        let own_checkouts = self.visible_checkouts(View::Own);
        let own_requests = self.visible_requests(View::Own);
        let group_fines = self.visible_fines(View::Group);
        let status = self.status(now);

        PatronSummary {
            key: self.key.clone(),
            name: self.display_name(),
            status,
            status_label: status.label(),
            role: self.role(),
            checkouts: own_checkouts.len(),
            overdue: own_checkouts.iter().filter(|c| c.overdue(now)).count(),
            recalled: own_checkouts.iter().filter(|c| c.recalled()).count(),
            requests: own_requests.len(),
            ready_for_pickup: own_requests.iter().filter(|r| r.ready_for_pickup()).count(),
            total_owed: fine::total_owed_refs(&self.visible_fines(View::Own)),
            group_checkouts: self.visible_checkouts(View::Group).len(),
            group_requests: self.visible_requests(View::Group).len(),
            group_owed: fine::total_owed_refs(&group_fines),
        }
    }
}
