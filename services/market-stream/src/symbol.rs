//! Instrument → wire symbol mapping
//!
//! Wire symbols are the trading-pair marker `t` followed by the (aliased)
//! base and counter codes. Base codes longer than three characters are
//! separated from the counter by `:`.
//!
//! ```text
//! BTC/USD   → tBTCUSD
//! DOGE/USD  → tDOGE:USD
//! USDC/USD  → tUDCUSD   (base alias applied before the length rule)
//! BTC/USDT  → tBTCUST   (counter alias)
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use types::instrument::Instrument;

/// Channel marker for trading-pair symbols.
pub const TRADING_PAIR_PREFIX: char = 't';

/// Delimiter inserted after long base codes.
pub const PAIR_DELIMITER: char = ':';

/// Base codes longer than this get a delimiter.
const MAX_UNDELIMITED_BASE_LEN: usize = 3;

/// Currency code substitutions applied before building a wire symbol.
///
/// Keys and values are upper-case currency codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AliasTable {
    /// Substitutions applied to the base code.
    pub base: BTreeMap<String, String>,
    /// Substitutions applied to the counter code.
    pub counter: BTreeMap<String, String>,
}

impl AliasTable {
    /// A table with no substitutions.
    pub fn empty() -> Self {
        Self {
            base: BTreeMap::new(),
            counter: BTreeMap::new(),
        }
    }

    /// Add a base-code alias.
    pub fn with_base_alias(mut self, code: &str, alias: &str) -> Self {
        self.base.insert(code.to_ascii_uppercase(), alias.to_ascii_uppercase());
        self
    }

    /// Add a counter-code alias.
    pub fn with_counter_alias(mut self, code: &str, alias: &str) -> Self {
        self.counter.insert(code.to_ascii_uppercase(), alias.to_ascii_uppercase());
        self
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::empty()
            .with_base_alias("USDC", "UDC")
            .with_counter_alias("USDT", "UST")
    }
}

/// Maps instruments to wire symbols using an alias table.
#[derive(Debug, Clone, Default)]
pub struct SymbolMapper {
    aliases: AliasTable,
}

impl SymbolMapper {
    pub fn new(aliases: AliasTable) -> Self {
        Self { aliases }
    }

    /// Build the wire symbol for an instrument.
    pub fn wire_symbol(&self, instrument: &Instrument) -> String {
        let base = resolve(&self.aliases.base, instrument.base().code());
        let counter = resolve(&self.aliases.counter, instrument.counter().code());

        let mut symbol = String::with_capacity(base.len() + counter.len() + 2);
        symbol.push(TRADING_PAIR_PREFIX);
        symbol.push_str(base);
        if base.chars().count() > MAX_UNDELIMITED_BASE_LEN {
            symbol.push(PAIR_DELIMITER);
        }
        symbol.push_str(counter);
        symbol
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }
}

fn resolve<'a>(table: &'a BTreeMap<String, String>, code: &'a str) -> &'a str {
    table.get(code).map(String::as_str).unwrap_or(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(base: &str, counter: &str) -> String {
        let instrument = Instrument::from_codes(base, counter).unwrap();
        SymbolMapper::default().wire_symbol(&instrument)
    }

    #[test]
    fn test_short_base_concatenates() {
        assert_eq!(map("BTC", "USD"), "tBTCUSD");
        assert_eq!(map("ETH", "EUR"), "tETHEUR");
    }

    #[test]
    fn test_long_base_gets_delimiter() {
        assert_eq!(map("DOGE", "USD"), "tDOGE:USD");
        assert_eq!(map("MATIC", "BTC"), "tMATIC:BTC");
    }

    #[test]
    fn test_base_alias_applied_before_length_rule() {
        assert_eq!(map("USDC", "USD"), "tUDCUSD");
    }

    #[test]
    fn test_counter_alias() {
        assert_eq!(map("BTC", "USDT"), "tBTCUST");
        assert_eq!(map("DOGE", "USDT"), "tDOGE:UST");
    }

    #[test]
    fn test_alias_table_is_extensible() {
        let aliases = AliasTable::default().with_base_alias("dash", "dsh");
        let mapper = SymbolMapper::new(aliases);
        let instrument = Instrument::from_codes("DASH", "USD").unwrap();
        assert_eq!(mapper.wire_symbol(&instrument), "tDSHUSD");
    }

    #[test]
    fn test_empty_alias_table() {
        let mapper = SymbolMapper::new(AliasTable::empty());
        let instrument = Instrument::from_codes("USDC", "USDT").unwrap();
        assert_eq!(mapper.wire_symbol(&instrument), "tUSDC:USDT");
    }

    #[test]
    fn test_alias_table_deserializes_partially() {
        let table: AliasTable = serde_json::from_str(r#"{"base":{"TEST":"TST"}}"#).unwrap();
        assert_eq!(table.base.get("TEST").map(String::as_str), Some("TST"));
        // Missing sections fall back to the default table.
        assert_eq!(table.counter.get("USDT").map(String::as_str), Some("UST"));
    }
}
