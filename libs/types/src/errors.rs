//! Error types for the shared type definitions
//!
//! Comprehensive error taxonomy using thiserror

use thiserror::Error;

/// Errors raised while constructing or parsing core types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    #[error("Invalid instrument: {0:?} (expected BASE/COUNTER)")]
    InvalidInstrument(String),

    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TypesError::InvalidInstrument("BTCUSD".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid instrument: \"BTCUSD\" (expected BASE/COUNTER)"
        );

        let err = TypesError::InvalidDecimal("abc".to_string());
        assert_eq!(err.to_string(), "Invalid decimal: abc");
    }
}
