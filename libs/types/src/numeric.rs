//! Exact decimal parsing for wire values
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Feed payloads carry prices and amounts as JSON numbers; they are converted
//! through their textual form so that `0.1` becomes exactly `0.1`.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::errors::TypesError;

/// Parse a decimal from text, accepting both plain and scientific notation.
pub fn parse_decimal(text: &str) -> Result<Decimal, TypesError> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|_| TypesError::InvalidDecimal(text.to_string()))
}

/// Convert a JSON number (or numeric string) into an exact decimal.
///
/// Returns `Ok(None)` for `null` so callers can distinguish a missing field
/// from a malformed one.
pub fn decimal_from_json(value: &Value) -> Result<Option<Decimal>, TypesError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => parse_decimal(&n.to_string()).map(Some),
        Value::String(s) => parse_decimal(s).map(Some),
        other => Err(TypesError::InvalidDecimal(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_parse_plain_and_scientific() {
        assert_eq!(parse_decimal("50000").unwrap(), Decimal::from(50000));
        assert_eq!(
            parse_decimal("0.1").unwrap(),
            Decimal::from_str_exact("0.1").unwrap()
        );
        assert_eq!(
            parse_decimal("1e-8").unwrap(),
            Decimal::from_str_exact("0.00000001").unwrap()
        );
        assert!(parse_decimal("abc").is_err());
    }

    #[test]
    fn test_decimal_from_json() {
        assert_eq!(
            decimal_from_json(&json!(0.5)).unwrap(),
            Some(Decimal::from_str_exact("0.5").unwrap())
        );
        assert_eq!(
            decimal_from_json(&json!(-1.25)).unwrap(),
            Some(Decimal::from_str_exact("-1.25").unwrap())
        );
        assert_eq!(
            decimal_from_json(&json!("3.75")).unwrap(),
            Some(Decimal::from_str_exact("3.75").unwrap())
        );
        assert_eq!(decimal_from_json(&Value::Null).unwrap(), None);
        assert!(decimal_from_json(&json!([1])).is_err());
    }

    proptest! {
        #[test]
        fn prop_integer_values_are_exact(n in -1_000_000_000i64..1_000_000_000) {
            let parsed = decimal_from_json(&json!(n)).unwrap();
            prop_assert_eq!(parsed, Some(Decimal::from(n)));
        }
    }
}
