use crate::config::toml_config::PaymentConfig;
use crate::domain::money::to_gateway_amount;
use crate::payment::security::Security;
use crate::utils::error::{PortalError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

pub const SIGNED_FIELD_NAMES: &str = "access_key,profile_id,transaction_uuid,signed_field_names,unsigned_field_names,signed_date_time,locale,transaction_type,reference_number,amount,currency";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

/// A signed hosted-checkout form. Field order matches `signed_field_names`,
/// with `signature` last.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequest {
    pub form_url: String,
    pub transaction_uuid: String,
    pub amount: Decimal,
    pub fields: Vec<FormField>,
}

impl PaymentRequest {
    pub fn new(
        config: &PaymentConfig,
        patron_key: &str,
        amount: Decimal,
        now: DateTime<Utc>,
        transaction_uuid: Uuid,
    ) -> Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(PortalError::PaymentNotAllowed {
                message: "There is nothing to pay.".to_string(),
            });
        }

        let transaction_uuid = transaction_uuid.to_string();
        let values = [
            ("access_key", config.access_key.clone()),
            ("profile_id", config.profile_id.clone()),
            ("transaction_uuid", transaction_uuid.clone()),
            ("signed_field_names", SIGNED_FIELD_NAMES.to_string()),
            ("unsigned_field_names", String::new()),
            ("signed_date_time", now.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            ("locale", config.locale.clone()),
            ("transaction_type", "sale".to_string()),
            ("reference_number", patron_key.to_string()),
            ("amount", to_gateway_amount(amount)),
            ("currency", config.currency.clone()),
        ];

        let map: HashMap<String, String> = values
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        let signature = Security::sign(&map, &config.secret_key)?;

        let mut fields: Vec<FormField> = values
            .into_iter()
            .map(|(name, value)| FormField {
                name: name.to_string(),
                value,
            })
            .collect();
        fields.push(FormField {
            name: "signature".to_string(),
            value: signature,
        });

        tracing::debug!(
            "Signed payment request {} for {} ({})",
            transaction_uuid,
            patron_key,
            to_gateway_amount(amount)
        );

        Ok(Self {
            form_url: config.form_url.clone(),
            transaction_uuid,
            amount,
            fields,
        })
    }

    pub fn form_url(&self) -> &str {
        &self.form_url
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn signature(&self) -> &str {
        self.get("signature").unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> PaymentConfig {
        PaymentConfig {
            form_url: "https://testsecureacceptance.cybersource.com/pay".to_string(),
            access_key: "access".to_string(),
            profile_id: "profile".to_string(),
            secret_key: "shared-secret".to_string(),
            currency: "USD".to_string(),
            locale: "en".to_string(),
        }
    }

    fn uuid() -> Uuid {
        Uuid::parse_str("00000000-0000-4000-8000-000000000001").unwrap()
    }

    #[test]
    fn test_signature_matches_known_value() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let request = PaymentRequest::new(&config(), "p1", Decimal::new(1250, 2), now, uuid()).unwrap();

        assert_eq!(request.get("signed_date_time"), Some("2024-05-01T12:00:00Z"));
        assert_eq!(request.get("amount"), Some("12.50"));
        assert_eq!(request.get("reference_number"), Some("p1"));
        assert_eq!(request.signature(), "RgP7i6fGKFBkjaV/RzW1Jse4LAxfPKNbV77MS3WwoAY=");

        let names: Vec<&str> = request.fields.iter().map(|f| f.name.as_str()).collect();
        let mut expected: Vec<&str> = SIGNED_FIELD_NAMES.split(',').collect();
        expected.push("signature");
        assert_eq!(names, expected);
    }

    #[test]
    fn test_zero_amount_is_refused() {
        let now = Utc::now();
        assert!(matches!(
            PaymentRequest::new(&config(), "p1", Decimal::ZERO, now, uuid()),
            Err(PortalError::PaymentNotAllowed { .. })
        ));
    }

    #[test]
    fn test_amount_rounds_to_cents() {
        let now = Utc::now();
        let request = PaymentRequest::new(&config(), "p1", Decimal::new(10005, 3), now, uuid()).unwrap();
        assert_eq!(request.get("amount"), Some("10.01"));
    }
}
