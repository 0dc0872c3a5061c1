use crate::utils::error::{PortalError, Result};
use crate::utils::spam;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub message: String,
    /// Page the patron was on.
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feedback {
    pub name: String,
    pub email: String,
    pub message: String,
    pub url: Option<String>,
    pub received_at: DateTime<Utc>,
}

pub fn submit(form: FeedbackForm) -> Result<Feedback> {
    let message = form.message.trim();
    if message.is_empty() {
        return Err(PortalError::validation("Please enter a message."));
    }
    if let Err(e) = spam::check(&form.name, message) {
        tracing::info!("Feedback rejected: {}", e);
        return Err(e);
    }

    let feedback = Feedback {
        name: form.name.trim().to_string(),
        email: form.email.trim().to_string(),
        message: message.to_string(),
        url: form.url,
        received_at: Utc::now(),
    };
    tracing::info!(
        name = %feedback.name,
        email = %feedback.email,
        url = ?feedback.url,
        "Feedback received: {}",
        feedback.message
    );
    Ok(feedback)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(name: &str, message: &str) -> FeedbackForm {
        FeedbackForm {
            name: name.to_string(),
            email: "patron@example.edu".to_string(),
            message: message.to_string(),
            url: Some("/checkouts".to_string()),
        }
    }

    #[test]
    fn test_accepts_ordinary_feedback() {
        let feedback = submit(form("Pat Ron", "  The renew button is hard to find.  ")).unwrap();
        assert_eq!(feedback.message, "The renew button is hard to find.");
    }

    #[test]
    fn test_rejects_spam_and_empty() {
        assert!(matches!(
            submit(form("http://cheap.example.com", "hello")),
            Err(PortalError::Spam { .. })
        ));
        assert!(matches!(submit(form("Pat", "   ")), Err(PortalError::Validation { .. })));
    }
}
