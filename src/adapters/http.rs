//! Small helpers shared by the HTTP adapters.

use crate::utils::error::{PortalError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

const USER_AGENT: &str = concat!("patron-portal/", env!("CARGO_PKG_VERSION"));

pub fn build_client(timeout_seconds: Option<u64>) -> Result<Client> {
    let mut builder = Client::builder().user_agent(USER_AGENT);
    if let Some(timeout) = timeout_seconds {
        builder = builder.timeout(Duration::from_secs(timeout));
    }
    Ok(builder.build()?)
}

/// Reads a response body as JSON. Empty bodies become `Value::Null`, since
/// several ILS endpoints answer 204 or an empty 200.
pub async fn read_json(response: Response) -> Result<(StatusCode, Value)> {
    let status = response.status();
    let body = response.text().await?;
    if body.trim().is_empty() {
        return Ok((status, Value::Null));
    }
    match serde_json::from_str(&body) {
        Ok(value) => Ok((status, value)),
        Err(e) if status.is_success() => Err(PortalError::Serialization(e)),
        // error pages are often HTML or plain text
        Err(_) => Ok((status, Value::String(body))),
    }
}

pub fn str_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn u32_at(value: &Value, pointer: &str) -> Option<u32> {
    match value.pointer(pointer)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn bool_at(value: &Value, pointer: &str) -> bool {
    match value.pointer(pointer) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "true" | "y" | "yes"),
        _ => false,
    }
}

pub fn date_at(value: &Value, pointer: &str) -> Option<DateTime<Utc>> {
    str_at(value, pointer).and_then(|s| parse_datetime(&s))
}

/// Accepts RFC 3339 timestamps, offset timestamps without a colon
/// (`2024-05-01T23:59:00-0700`), naive timestamps (taken as UTC) and plain dates.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("never") {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
    }
    tracing::debug!("Unrecognised date format: {}", raw);
    None
}

/// Pulls the first human-readable message out of an ILS error body.
/// Symphony uses `messageList[].message`, FOLIO `errors[].message`.
pub fn error_message(body: &Value) -> Option<String> {
    ["/messageList/0/message", "/errors/0/message", "/message", "/Message", "/error"]
        .iter()
        .find_map(|pointer| str_at(body, pointer))
        .or_else(|| match body {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
}
