use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV export error: {0}")]
    Csv(#[from] csv::Error),

    #[error("ILS error: {message}")]
    Ils { message: String },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("{what} not found: {key}")]
    NotFound { what: String, key: String },

    #[error("Renewal failed: {message}")]
    Checkout { message: String },

    #[error("Request update failed: {message}")]
    Request { message: String },

    #[error("Pickup library not allowed for this request: {library}")]
    PickupNotAllowed { library: String },

    #[error("Payment response signature is invalid")]
    InvalidSignature,

    #[error("Payment was not accepted (decision: {decision}, reason code: {reason_code}): {message}")]
    PaymentFailed {
        decision: String,
        reason_code: String,
        message: String,
    },

    #[error("Payment not allowed: {message}")]
    PaymentNotAllowed { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfig { field: String },

    #[error("Invalid configuration value for {field} ({value}): {reason}")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidation { field: String, message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Submission rejected as spam: {reason}")]
    Spam { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Ils,
    Patron,
    Payment,
    Configuration,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl PortalError {
    pub fn ils(message: impl Into<String>) -> Self {
        Self::Ils {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Http(_) | Self::Io(_) => ErrorCategory::Network,
            Self::Serialization(_) | Self::Ils { .. } | Self::NotFound { .. } => ErrorCategory::Ils,
            Self::Authentication { .. }
            | Self::Checkout { .. }
            | Self::Request { .. }
            | Self::PickupNotAllowed { .. } => ErrorCategory::Patron,
            Self::InvalidSignature | Self::PaymentFailed { .. } | Self::PaymentNotAllowed { .. } => {
                ErrorCategory::Payment
            }
            Self::MissingConfig { .. }
            | Self::InvalidConfigValue { .. }
            | Self::ConfigValidation { .. } => ErrorCategory::Configuration,
            Self::Csv(_) | Self::Validation { .. } | Self::Spam { .. } => ErrorCategory::Input,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Spam { .. } | Self::PickupNotAllowed { .. } => ErrorSeverity::Low,
            Self::Http(_)
            | Self::Checkout { .. }
            | Self::Request { .. }
            | Self::PaymentFailed { .. }
            | Self::PaymentNotAllowed { .. }
            | Self::Validation { .. } => ErrorSeverity::Medium,
            Self::Ils { .. }
            | Self::NotFound { .. }
            | Self::Authentication { .. }
            | Self::Serialization(_)
            | Self::Csv(_)
            | Self::Io(_) => ErrorSeverity::High,
            Self::InvalidSignature
            | Self::MissingConfig { .. }
            | Self::InvalidConfigValue { .. }
            | Self::ConfigValidation { .. } => ErrorSeverity::Critical,
        }
    }

    /// Message safe to show a patron.
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Http(_) | Self::Io(_) => {
                "The library system could not be reached. Please try again later.".to_string()
            }
            Self::Serialization(_) | Self::Ils { .. } => {
                "The library system returned an unexpected response.".to_string()
            }
            Self::NotFound { what, .. } => format!("We could not find that {}.", what),
            Self::Authentication { .. } => {
                "Unable to authenticate. Please check your library ID and PIN.".to_string()
            }
            Self::Checkout { message } | Self::Request { message } => message.clone(),
            Self::PickupNotAllowed { library } => {
                format!("{} is not an allowed pickup location for this item.", library)
            }
            Self::InvalidSignature => {
                "There was a problem with your payment. No payment was made.".to_string()
            }
            Self::PaymentFailed { decision, .. } if decision == "CANCEL" => {
                "Payment canceled. No payment was made.".to_string()
            }
            Self::PaymentFailed { .. } => {
                "Payment failed. Your payment was not accepted.".to_string()
            }
            Self::PaymentNotAllowed { message } => message.clone(),
            Self::MissingConfig { .. }
            | Self::InvalidConfigValue { .. }
            | Self::ConfigValidation { .. } => {
                "The portal is not configured correctly.".to_string()
            }
            Self::Csv(_) => "The export could not be written.".to_string(),
            Self::Validation { message } => message.clone(),
            Self::Spam { .. } => "Your message could not be sent.".to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => "Check connectivity to the ILS and retry the action",
            ErrorCategory::Ils => "Check the ILS service logs for the failing call",
            ErrorCategory::Patron => "Contact circulation staff for help with this item",
            ErrorCategory::Payment => "Verify the payment secret and gateway profile settings",
            ErrorCategory::Configuration => "Fix the configuration file and restart",
            ErrorCategory::Input => "Correct the submitted values and try again",
        }
    }
}

pub type Result<T> = std::result::Result<T, PortalError>;
