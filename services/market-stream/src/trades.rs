//! Trade adapter
//!
//! Turns trade payloads into individual public `Trade` records:
//! - snapshot replays are flattened into the same shape as live events and
//!   always forwarded;
//! - live events are forwarded only when their type matches the consumer's
//!   `TradeType` filter, so preview events do not leak into an execution
//!   stream.
//!
//! Wire trade entry: `[ID, MTS, AMOUNT, PRICE]`, where a positive amount
//! means the taker bought.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use types::instrument::Instrument;
use types::numeric::decimal_from_json;
use types::side::Side;

use crate::error::{Result, StreamError};
use crate::events::{ChannelKind, TradeType};

/// A public trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub instrument: Instrument,
    /// Exchange trade identifier.
    pub id: u64,
    /// Execution time (millisecond precision).
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    /// Traded amount (absolute).
    pub amount: Decimal,
    /// `Bid` when the taker bought, `Ask` when the taker sold.
    pub taker_side: Side,
}

impl Trade {
    /// Trade value (price × amount).
    pub fn value(&self) -> Decimal {
        self.price * self.amount
    }
}

fn malformed(reason: impl Into<String>) -> StreamError {
    StreamError::malformed(ChannelKind::Trades, reason)
}

/// Decode one `[ID, MTS, AMOUNT, PRICE]` entry.
pub fn decode_trade(instrument: &Instrument, entry: &Value) -> Result<Trade> {
    let fields = entry
        .as_array()
        .ok_or_else(|| malformed(format!("trade entry is not an array: {entry}")))?;

    let id = fields
        .first()
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed(format!("missing trade id in {entry}")))?;
    let timestamp = fields
        .get(1)
        .and_then(Value::as_i64)
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| malformed(format!("missing or invalid timestamp in {entry}")))?;

    let signed_amount = decimal(fields, 2, "amount")?;
    let price = decimal(fields, 3, "price")?;
    let taker_side = Side::from_signed_amount(signed_amount)
        .ok_or_else(|| malformed(format!("zero amount in trade {id}")))?;

    Ok(Trade {
        instrument: instrument.clone(),
        id,
        timestamp,
        price,
        amount: signed_amount.abs(),
        taker_side,
    })
}

fn decimal(fields: &[Value], index: usize, name: &str) -> Result<Decimal> {
    decimal_from_json(fields.get(index).unwrap_or(&Value::Null))
        .map_err(|e| malformed(format!("invalid {name}: {e}")))?
        .ok_or_else(|| malformed(format!("missing {name}")))
}

/// Flatten a snapshot replay into individual trades, oldest first.
///
/// The feed replays newest first; a single bad entry rejects the batch.
pub fn adapt_snapshot(instrument: &Instrument, entries: &[Value]) -> Result<Vec<Trade>> {
    let mut trades = entries
        .iter()
        .map(|entry| decode_trade(instrument, entry))
        .collect::<Result<Vec<_>>>()?;
    trades.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
    Ok(trades)
}

/// Whether a live event of type `kind` passes a consumer's filter.
pub fn passes_filter(filter: TradeType, kind: TradeType) -> bool {
    filter == kind
}
