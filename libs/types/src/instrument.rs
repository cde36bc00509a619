//! Instrument identity types
//!
//! An instrument is an ordered (base, counter) pair of currency codes.
//! Both halves are normalized to upper case on construction so that
//! `btc/usd` and `BTC/USD` identify the same book.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::TypesError;

/// Currency (asset) code, e.g. `BTC`, `USD`, `USDC`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Create a currency code, rejecting empty or non-alphanumeric input.
    pub fn new(code: impl AsRef<str>) -> Result<Self, TypesError> {
        let code = code.as_ref().trim();
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(TypesError::InvalidCurrency(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// Get the currency code
    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// Trading instrument identified by its ordered currency pair.
///
/// Formatted and parsed as `BASE/COUNTER`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Instrument {
    base: Currency,
    counter: Currency,
}

impl Instrument {
    pub fn new(base: Currency, counter: Currency) -> Self {
        Self { base, counter }
    }

    /// Build an instrument from two raw currency codes.
    pub fn from_codes(base: &str, counter: &str) -> Result<Self, TypesError> {
        Ok(Self::new(Currency::new(base)?, Currency::new(counter)?))
    }

    pub fn base(&self) -> &Currency {
        &self.base
    }

    pub fn counter(&self) -> &Currency {
        &self.counter
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.counter)
    }
}

impl FromStr for Instrument {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((base, counter)) if !counter.contains('/') => {
                Self::from_codes(base, counter)
                    .map_err(|_| TypesError::InvalidInstrument(s.to_string()))
            }
            _ => Err(TypesError::InvalidInstrument(s.to_string())),
        }
    }
}

impl TryFrom<String> for Instrument {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Instrument> for String {
    fn from(instrument: Instrument) -> Self {
        instrument.to_string()
    }
}
