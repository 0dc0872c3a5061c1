use crate::domain::money::parse_amount;
use crate::payment::security::Security;
use crate::utils::error::{PortalError, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// A verified gateway callback. Construction fails unless the signature is
/// valid and the decision is `ACCEPT`.
#[derive(Debug, Clone)]
pub struct PaymentResponse {
    params: HashMap<String, String>,
}

impl PaymentResponse {
    pub fn from_params(params: HashMap<String, String>, secret: &str) -> Result<Self> {
        Security::verify(&params, secret)?;

        let response = Self { params };
        if response.decision() != "ACCEPT" {
            return Err(PortalError::PaymentFailed {
                decision: response.decision().to_string(),
                reason_code: response.reason_code().to_string(),
                message: response.message().to_string(),
            });
        }
        Ok(response)
    }

    fn field(&self, name: &str) -> &str {
        self.params.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn decision(&self) -> &str {
        self.field("decision")
    }

    pub fn reason_code(&self) -> &str {
        self.field("reason_code")
    }

    pub fn message(&self) -> &str {
        self.field("message")
    }

    pub fn transaction_id(&self) -> &str {
        self.field("transaction_id")
    }

    pub fn session_id(&self) -> &str {
        self.field("req_transaction_uuid")
    }

    pub fn patron_key(&self) -> &str {
        self.field("req_reference_number")
    }

    pub fn amount(&self) -> Decimal {
        parse_amount(self.field("req_amount"))
    }
}
