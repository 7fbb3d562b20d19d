//! Raw price parsing.
//!
//! Producers hand over prices as JSON numbers or text in decimal
//! ("2.10", "2,10"), fractional ("5/2") or American ("+150", "-200") form.
//! Everything ends up as a validated decimal [`OddsQuote`].

use serde_json::Value;

use crate::domain::OddsQuote;
use crate::error::PriceError;

/// Parse any raw JSON price value into a decimal quote
pub fn parse_price(raw: &Value) -> Result<OddsQuote, PriceError> {
    match raw {
        Value::Number(n) => {
            let v = n.as_f64().ok_or(PriceError::NonFinite)?;
            OddsQuote::new(v)
        }
        Value::String(s) => parse_price_text(s),
        Value::Null => Err(PriceError::Empty),
        other => Err(PriceError::NotNumeric(other.to_string())),
    }
}

/// Parse a textual price (decimal, fractional or signed American)
pub fn parse_price_text(text: &str) -> Result<OddsQuote, PriceError> {
    let s = text.trim();
    if s.is_empty() {
        return Err(PriceError::Empty);
    }

    if let Some((num, den)) = s.split_once('/') {
        let num = parse_number(num).ok_or_else(|| PriceError::BadFractional(s.to_string()))?;
        let den = parse_number(den).ok_or_else(|| PriceError::BadFractional(s.to_string()))?;
        if num <= 0.0 || den <= 0.0 {
            return Err(PriceError::BadFractional(s.to_string()));
        }
        return OddsQuote::new(1.0 + num / den);
    }

    if s.starts_with('+') || s.starts_with('-') {
        let n = parse_number(s).ok_or_else(|| PriceError::NotNumeric(s.to_string()))?;
        return OddsQuote::new(american_to_decimal(n)?);
    }

    let v = parse_number(s).ok_or_else(|| PriceError::NotNumeric(s.to_string()))?;
    OddsQuote::new(v)
}

/// American odds to decimal: +150 -> 2.5, -200 -> 1.5
pub fn american_to_decimal(n: f64) -> Result<f64, PriceError> {
    if !n.is_finite() {
        return Err(PriceError::NonFinite);
    }
    if n.abs() < 100.0 {
        return Err(PriceError::BadAmerican(n));
    }
    Ok(if n > 0.0 { 1.0 + n / 100.0 } else { 1.0 + 100.0 / n.abs() })
}

/// Lenient float parse: trims, accepts comma decimals and a leading '+'
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned = text.trim().replace(',', ".");
    let cleaned = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Numeric JSON value or numeric text, e.g. a line or a signal
pub fn value_as_f64(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn price(v: Value) -> f64 {
        parse_price(&v).unwrap().price()
    }

    #[test]
    fn test_decimal_forms() {
        assert_eq!(price(json!(2.1)), 2.1);
        assert_eq!(price(json!("2.10")), 2.1);
        assert_eq!(price(json!(" 2,10 ")), 2.1);
    }

    #[test]
    fn test_fractional_and_american() {
        assert!((price(json!("5/2")) - 3.5).abs() < 1e-12);
        assert!((price(json!("+150")) - 2.5).abs() < 1e-12);
        assert!((price(json!("-200")) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert_eq!(parse_price(&json!("")), Err(PriceError::Empty));
        assert_eq!(parse_price(&json!(null)), Err(PriceError::Empty));
        assert!(matches!(parse_price(&json!("abc")), Err(PriceError::NotNumeric(_))));
        assert!(matches!(parse_price(&json!(1.0)), Err(PriceError::OutOfRange { .. })));
        assert!(matches!(parse_price(&json!(0.5)), Err(PriceError::OutOfRange { .. })));
        assert!(matches!(parse_price(&json!("-50")), Err(PriceError::BadAmerican(_))));
        assert!(matches!(parse_price(&json!("0/3")), Err(PriceError::BadFractional(_))));
        assert!(matches!(parse_price(&json!([2.0])), Err(PriceError::NotNumeric(_))));
    }

    #[test]
    fn test_value_as_f64() {
        assert_eq!(value_as_f64(&json!("2,5")), Some(2.5));
        assert_eq!(value_as_f64(&json!("+1.5")), Some(1.5));
        assert_eq!(value_as_f64(&json!(-3.5)), Some(-3.5));
        assert_eq!(value_as_f64(&json!(true)), None);
    }
}
