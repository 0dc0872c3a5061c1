use crate::utils::error::{PortalError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(PortalError::InvalidConfigValue {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(PortalError::InvalidConfigValue {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(PortalError::InvalidConfigValue {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| PortalError::MissingConfig {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PortalError::InvalidConfigValue {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(PortalError::InvalidConfigValue {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

/// Library and location codes are upper-case identifiers such as `GREEN` or `SAL3-PAGE-MU`.
pub fn validate_library_code(field_name: &str, code: &str) -> Result<()> {
    validate_non_empty_string(field_name, code)?;
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(PortalError::InvalidConfigValue {
            field: field_name.to_string(),
            value: code.to_string(),
            reason: "Codes may only contain upper-case letters, digits, '-' and '_'".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("symphony.base_url", "https://symws.example.edu/symws").is_ok());
        assert!(validate_url("symphony.base_url", "http://localhost:8080").is_ok());
        assert!(validate_url("symphony.base_url", "").is_err());
        assert!(validate_url("symphony.base_url", "invalid-url").is_err());
        assert!(validate_url("symphony.base_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("cache.reference_data_ttl_seconds", 3600, 1, 86400).is_ok());
        assert!(validate_range("cache.reference_data_ttl_seconds", 0, 1, 86400).is_err());
    }

    #[test]
    fn test_validate_library_code() {
        assert!(validate_library_code("pickup.default", "GREEN").is_ok());
        assert!(validate_library_code("pickup.default", "SAL3-PAGE-MU").is_ok());
        assert!(validate_library_code("pickup.default", "green").is_err());
        assert!(validate_library_code("pickup.default", " ").is_err());
    }

    #[test]
    fn test_validate_required_field() {
        let present = Some("secret".to_string());
        let missing: Option<String> = None;
        assert_eq!(validate_required_field("payment", &present).unwrap(), "secret");
        assert!(matches!(
            validate_required_field("payment", &missing),
            Err(PortalError::MissingConfig { .. })
        ));
    }
}
