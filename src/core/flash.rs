use crate::utils::error::PortalError;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashLevel {
    Success,
    Notice,
    Alert,
}

/// One-line outcome shown to the patron after an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Success,
            message: message.into(),
        }
    }

    pub fn notice(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Notice,
            message: message.into(),
        }
    }

    pub fn alert(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Alert,
            message: message.into(),
        }
    }

    pub fn from_error(error: &PortalError) -> Self {
        Self::alert(error.user_friendly_message())
    }

    pub fn is_alert(&self) -> bool {
        self.level == FlashLevel::Alert
    }
}

impl fmt::Display for Flash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.level {
            FlashLevel::Success => "success",
            FlashLevel::Notice => "notice",
            FlashLevel::Alert => "alert",
        };
        write!(f, "[{}] {}", label, self.message)
    }
}
