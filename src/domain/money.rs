//! Decimal-safe money handling.
//!
//! Amounts arrive as strings (Symphony `{"amount": "12.50"}`) or as JSON
//! numbers (FOLIO). Both are parsed through their textual form.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Parses an amount, treating blanks and garbage as zero.
pub fn parse_amount(raw: &str) -> Decimal {
    let cleaned = raw.trim().trim_start_matches('$').replace(',', "");
    if cleaned.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(&cleaned).unwrap_or_else(|_| {
        tracing::warn!("Unparseable amount '{}', treating as zero", raw);
        Decimal::ZERO
    })
}

/// Reads a string or number JSON value as an amount.
pub fn amount_from_json(value: Option<&serde_json::Value>) -> Decimal {
    match value {
        Some(serde_json::Value::String(s)) => parse_amount(s),
        Some(serde_json::Value::Number(n)) => parse_amount(&n.to_string()),
        Some(serde_json::Value::Object(obj)) => amount_from_json(obj.get("amount")),
        _ => Decimal::ZERO,
    }
}

pub fn total<'a, I>(amounts: I) -> Decimal
where
    I: IntoIterator<Item = &'a Decimal>,
{
    amounts.into_iter().copied().sum()
}

/// Two places, half-up, the way the gateway expects `amount`.
pub fn to_gateway_amount(amount: Decimal) -> String {
    format!(
        "{:.2}",
        amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}

pub fn format_currency(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-${:.2}", rounded.abs())
    } else {
        format!("${:.2}", rounded.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_variants() {
        assert_eq!(parse_amount("12.50"), Decimal::new(1250, 2));
        assert_eq!(parse_amount(" $1,234.05 "), Decimal::new(123405, 2));
        assert_eq!(parse_amount(""), Decimal::ZERO);
        assert_eq!(parse_amount("n/a"), Decimal::ZERO);
    }

    #[test]
    fn test_amount_from_json_number_avoids_float_drift() {
        let value = serde_json::json!(0.1);
        let sum = amount_from_json(Some(&value)) + amount_from_json(Some(&value)) + amount_from_json(Some(&value));
        assert_eq!(sum, Decimal::new(3, 1));
    }

    #[test]
    fn test_amount_from_symphony_money_object() {
        let value = serde_json::json!({"currencyCode": "USD", "amount": "7.25"});
        assert_eq!(amount_from_json(Some(&value)), Decimal::new(725, 2));
        assert_eq!(amount_from_json(None), Decimal::ZERO);
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_currency(Decimal::new(5, 0)), "$5.00");
        assert_eq!(format_currency(Decimal::new(12345, 3)), "$12.35");
        assert_eq!(format_currency(Decimal::new(-250, 2)), "-$2.50");
        assert_eq!(to_gateway_amount(Decimal::new(1005, 3)), "1.01");
        assert_eq!(to_gateway_amount(Decimal::new(20, 0)), "20.00");
    }
}
