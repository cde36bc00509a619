//! Ticker adapter
//!
//! Stateless 1:1 transform of the ticker field array
//! `[BID, BID_SIZE, ASK, ASK_SIZE, DAILY_CHANGE, DAILY_CHANGE_RELATIVE,
//! LAST_PRICE, VOLUME, HIGH, LOW]` into the public `Ticker` shape.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use types::instrument::Instrument;
use types::numeric::decimal_from_json;

use crate::error::{Result, StreamError};
use crate::events::ChannelKind;

const TICKER_FIELDS: [&str; 10] = [
    "bid",
    "bid_size",
    "ask",
    "ask_size",
    "daily_change",
    "daily_change_relative",
    "last_price",
    "volume",
    "high",
    "low",
];

/// Latest top-of-book and daily statistics for an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub instrument: Instrument,
    pub bid: Decimal,
    pub bid_size: Decimal,
    pub ask: Decimal,
    pub ask_size: Decimal,
    pub daily_change: Decimal,
    /// Daily change as a fraction (0.01 = 1%).
    pub daily_change_relative: Decimal,
    pub last: Decimal,
    pub volume: Decimal,
    pub high: Decimal,
    pub low: Decimal,
}

/// Build a `Ticker` from the classified field array.
pub fn adapt_ticker(instrument: &Instrument, fields: &[Value]) -> Result<Ticker> {
    if fields.len() < TICKER_FIELDS.len() {
        return Err(StreamError::malformed(
            ChannelKind::Ticker,
            format!("expected {} fields, got {}", TICKER_FIELDS.len(), fields.len()),
        ));
    }

    let mut values = [Decimal::ZERO; 10];
    for (index, name) in TICKER_FIELDS.iter().enumerate() {
        values[index] = decimal_from_json(&fields[index])
            .map_err(|e| StreamError::malformed(ChannelKind::Ticker, format!("invalid {name}: {e}")))?
            .ok_or_else(|| StreamError::malformed(ChannelKind::Ticker, format!("missing {name}")))?;
    }

    let [bid, bid_size, ask, ask_size, daily_change, daily_change_relative, last, volume, high, low] =
        values;

    Ok(Ticker {
        instrument: instrument.clone(),
        bid,
        bid_size,
        ask,
        ask_size,
        daily_change,
        daily_change_relative,
        last,
        volume,
        high,
        low,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn btc_usd() -> Instrument {
        Instrument::from_codes("BTC", "USD").unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    #[test]
    fn test_adapt_ticker() {
        let body = json!([7616.5, 31.89, 7617.5, 43.36, -550.8, -0.0674, 7617.1, 8314.71, 8257.8, 7500]);
        let ticker = adapt_ticker(&btc_usd(), body.as_array().unwrap()).unwrap();

        assert_eq!(ticker.instrument, btc_usd());
        assert_eq!(ticker.bid, dec("7616.5"));
        assert_eq!(ticker.ask_size, dec("43.36"));
        assert_eq!(ticker.daily_change_relative, dec("-0.0674"));
        assert_eq!(ticker.last, dec("7617.1"));
        assert_eq!(ticker.low, Decimal::from(7500));
    }

    #[test]
    fn test_short_ticker_rejected() {
        let body = json!([1, 2, 3]);
        let err = adapt_ticker(&btc_usd(), body.as_array().unwrap()).unwrap_err();
        assert!(matches!(err, StreamError::MalformedMessage { .. }));
    }

    #[test]
    fn test_null_field_rejected() {
        let body = json!([1, 2, 3, 4, 5, 6, null, 8, 9, 10]);
        let err = adapt_ticker(&btc_usd(), body.as_array().unwrap()).unwrap_err();
        assert_eq!(
            err,
            StreamError::MalformedMessage {
                channel: ChannelKind::Ticker,
                reason: "missing last_price".to_string(),
            }
        );
    }
}
