use crate::utils::error::{PortalError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 signing shared with the payment gateway.
pub struct Security;

impl Security {
    /// `name=value` pairs for every field named in `signed_field_names`,
    /// comma-joined in that order. Missing fields sign as empty values.
    pub fn data_to_sign(fields: &HashMap<String, String>) -> Result<String> {
        let names = fields
            .get("signed_field_names")
            .ok_or(PortalError::InvalidSignature)?;
        Ok(names
            .split(',')
            .map(|name| {
                let value = fields.get(name).map(String::as_str).unwrap_or("");
                format!("{}={}", name, value)
            })
            .collect::<Vec<_>>()
            .join(","))
    }

    pub fn sign(fields: &HashMap<String, String>, secret: &str) -> Result<String> {
        let data = Self::data_to_sign(fields)?;
        Ok(STANDARD.encode(Self::mac(secret, &data)?.finalize().into_bytes()))
    }

    /// Checks the `signature` field against the signed fields.
    pub fn verify(fields: &HashMap<String, String>, secret: &str) -> Result<()> {
        let signature = fields.get("signature").ok_or(PortalError::InvalidSignature)?;
        let provided = STANDARD
            .decode(signature.trim())
            .map_err(|_| PortalError::InvalidSignature)?;
        let data = Self::data_to_sign(fields)?;
        Self::mac(secret, &data)?
            .verify_slice(&provided)
            .map_err(|_| PortalError::InvalidSignature)
    }

    fn mac(secret: &str, data: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| PortalError::InvalidConfigValue {
            field: "payment.secret_key".to_string(),
            value: "<redacted>".to_string(),
            reason: e.to_string(),
        })?;
        mac.update(data.as_bytes());
        Ok(mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_known_hmac_vector() {
        let signed = fields(&[
            ("signed_field_names", "message"),
            ("message", "The quick brown fox jumps over the lazy dog"),
        ]);
        // data_to_sign prefixes the name, so check the raw MAC separately
        let mac = Security::mac("key", "The quick brown fox jumps over the lazy dog").unwrap();
        assert_eq!(
            STANDARD.encode(mac.finalize().into_bytes()),
            "97yD9DBThCSxMpjmqm+xQ+9NWaFJRhdZl0edvC0aPNg="
        );
        assert_eq!(
            Security::data_to_sign(&signed).unwrap(),
            "message=The quick brown fox jumps over the lazy dog"
        );
    }

    #[test]
    fn test_verify_rejects_changed_field() {
        let mut response = fields(&[
            ("signed_field_names", "decision,req_amount"),
            ("decision", "ACCEPT"),
            ("req_amount", "12.50"),
        ]);
        let signature = Security::sign(&response, "secret").unwrap();
        response.insert("signature".to_string(), signature);
        assert!(Security::verify(&response, "secret").is_ok());
        assert!(matches!(
            Security::verify(&response, "other-secret"),
            Err(PortalError::InvalidSignature)
        ));

        response.insert("req_amount".to_string(), "1.00".to_string());
        assert!(matches!(
            Security::verify(&response, "secret"),
            Err(PortalError::InvalidSignature)
        ));
    }

    #[test]
    fn test_field_order_changes_signature() {
        let a = fields(&[
            ("signed_field_names", "decision,req_amount"),
            ("decision", "ACCEPT"),
            ("req_amount", "12.50"),
        ]);
        let b = fields(&[
            ("signed_field_names", "req_amount,decision"),
            ("decision", "ACCEPT"),
            ("req_amount", "12.50"),
        ]);
        assert_ne!(
            Security::sign(&a, "secret").unwrap(),
            Security::sign(&b, "secret").unwrap()
        );
    }

    #[test]
    fn test_missing_signature_or_names() {
        let unsigned = fields(&[("signed_field_names", "decision"), ("decision", "ACCEPT")]);
        assert!(matches!(
            Security::verify(&unsigned, "secret"),
            Err(PortalError::InvalidSignature)
        ));
        let garbage = fields(&[("decision", "ACCEPT"), ("signature", "not base64!")]);
        assert!(matches!(
            Security::verify(&garbage, "secret"),
            Err(PortalError::InvalidSignature)
        ));
    }
}
