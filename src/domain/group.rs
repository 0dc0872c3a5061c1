use crate::domain::checkout::Checkout;
use crate::domain::fine::{Fine, Payment};
use crate::domain::request::Request;
use crate::utils::error::{PortalError, Result};
use serde::Serialize;
use std::str::FromStr;

/// Which tab of the portal is being looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum View {
    #[default]
    Own,
    Group,
}

impl FromStr for View {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "own" | "self" | "" => Ok(Self::Own),
            "group" => Ok(Self::Group),
            other => Err(PortalError::validation(format!("Unknown view: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMember {
    pub key: String,
    pub name: String,
    pub sponsor: bool,
}

/// A sponsor's research group. Holds only what proxies borrowed or requested
/// on the group's behalf; each item keeps the `patron_key` of the proxy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Group {
    pub sponsor_key: Option<String>,
    pub members: Vec<GroupMember>,
    pub checkouts: Vec<Checkout>,
    pub requests: Vec<Request>,
    pub fines: Vec<Fine>,
    pub payments: Vec<Payment>,
}

impl Group {
    pub fn member_name(&self, key: &str) -> Option<&str> {
        self.members
            .iter()
            .find(|m| m.key == key)
            .map(|m| m.name.as_str())
    }

    pub fn sponsor(&self) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.sponsor)
    }

    pub fn proxies(&self) -> impl Iterator<Item = &GroupMember> {
        self.members.iter().filter(|m| !m.sponsor)
    }

    pub fn checkouts_except(&self, patron_key: &str) -> Vec<&Checkout> {
        self.checkouts
            .iter()
            .filter(|c| c.patron_key != patron_key)
            .collect()
    }

    pub fn requests_except(&self, patron_key: &str) -> Vec<&Request> {
        self.requests
            .iter()
            .filter(|r| r.patron_key != patron_key)
            .collect()
    }
}
