//! Order book state store and merger
//!
//! Maintains per-instrument bid/ask level maps reconstructed from a feed of
//! full snapshots and per-level updates. Uses `BTreeMap` keyed by exact
//! decimal price, so each side holds at most one level per price and
//! iteration order is deterministic.
//!
//! The store is mutated only through two operations:
//! - `apply_snapshot` → replace the instrument's book wholesale
//! - `apply_update` → delete (count = 0) or upsert one level
//!
//! Both validate their input before touching the book, so a rejected call
//! leaves the store exactly as it was.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use types::instrument::Instrument;
use types::numeric::decimal_from_json;
use types::side::Side;

use crate::error::{Result, StreamError};
use crate::events::ChannelKind;

/// One book instruction: `[PRICE, COUNT, AMOUNT]` on the wire.
///
/// `count == 0` deletes the level at `price`; any other count upserts it.
/// When `side` is `None` the side is inferred from the sign of `amount`
/// (positive = bid, negative = ask).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub price: Decimal,
    pub count: u32,
    pub amount: Decimal,
    pub side: Option<Side>,
}

impl UpdateRecord {
    /// Record with a signed amount.
    pub fn new(price: Decimal, count: u32, amount: Decimal) -> Self {
        Self {
            price,
            count,
            amount,
            side: None,
        }
    }

    /// Record with an explicit side.
    pub fn sided(side: Side, price: Decimal, count: u32, amount: Decimal) -> Self {
        Self {
            price,
            count,
            amount,
            side: Some(side),
        }
    }

    /// Decode one wire entry `[PRICE, COUNT, AMOUNT]`.
    pub fn decode(entry: &Value) -> Result<Self> {
        let fields = entry
            .as_array()
            .ok_or_else(|| malformed(format!("book entry is not an array: {entry}")))?;

        let price = decimal_field(fields, 0, "price")?;
        let amount = decimal_field(fields, 2, "amount")?;
        let count = fields
            .get(1)
            .and_then(Value::as_u64)
            .and_then(|c| u32::try_from(c).ok())
            .ok_or_else(|| malformed(format!("missing or invalid count in {entry}")))?;

        Ok(Self::new(price, count, amount))
    }

    /// Decode every entry of a snapshot, failing on the first bad one.
    pub fn decode_all(entries: &[Value]) -> Result<Vec<Self>> {
        entries.iter().map(Self::decode).collect()
    }

    /// Whether this record deletes its level.
    pub fn is_delete(&self) -> bool {
        self.count == 0
    }

    /// The side this record applies to.
    pub fn resolve_side(&self) -> Result<Side> {
        self.side
            .or_else(|| Side::from_signed_amount(self.amount))
            .ok_or_else(|| malformed(format!("cannot infer side of level {} from zero amount", self.price)))
    }
}

fn decimal_field(fields: &[Value], index: usize, name: &str) -> Result<Decimal> {
    let value = fields.get(index).unwrap_or(&Value::Null);
    decimal_from_json(value)
        .map_err(|e| malformed(format!("invalid {name}: {e}")))?
        .ok_or_else(|| malformed(format!("missing {name}")))
}

fn malformed(reason: impl Into<String>) -> StreamError {
    StreamError::malformed(ChannelKind::Book, reason)
}

/// A single aggregated price level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// The price of this level.
    pub price: Decimal,
    /// Aggregated amount at this level (always > 0 while stored).
    pub amount: Decimal,
    /// Number of orders at this level, when the feed reports it.
    pub order_count: Option<u32>,
}

/// A record that passed validation, ready to be applied.
#[derive(Debug, Clone, Copy)]
struct Instruction {
    /// `None` only for a delete whose side cannot be inferred.
    side: Option<Side>,
    price: Decimal,
    /// `None` removes the level.
    level: Option<(Decimal, u32)>,
}

impl Instruction {
    fn from_record(record: &UpdateRecord) -> Result<Self> {
        let side = if record.is_delete() {
            record.side.or_else(|| Side::from_signed_amount(record.amount))
        } else {
            Some(record.resolve_side()?)
        };
        let amount = record.amount.abs();
        // A zero amount never persists, whatever the count says.
        let level = if record.is_delete() || amount.is_zero() {
            None
        } else {
            Some((amount, record.count))
        };
        Ok(Self {
            side,
            price: record.price,
            level,
        })
    }
}

/// In-memory book for a single instrument.
///
/// Bids are stored ascending and read in reverse (best bid first).
/// Asks are stored ascending (best ask first).
#[derive(Debug, Clone)]
pub struct OrderBookState {
    instrument: Instrument,
    bids: BTreeMap<Decimal, PriceLevel>,
    asks: BTreeMap<Decimal, PriceLevel>,
    /// Number of snapshots applied; 0 until the first baseline.
    generation: u64,
    /// Updates applied since the last snapshot.
    updates_applied: u64,
}

impl OrderBookState {
    /// Create an empty book for the given instrument.
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            generation: 0,
            updates_applied: 0,
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<Decimal, PriceLevel> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    fn apply(&mut self, instruction: Instruction) {
        let Some(side) = instruction.side else {
            // A price rests on one side at most.
            self.bids.remove(&instruction.price);
            self.asks.remove(&instruction.price);
            return;
        };
        let levels = self.side_mut(side);
        match instruction.level {
            None => {
                levels.remove(&instruction.price);
            }
            Some((amount, count)) => {
                levels.insert(
                    instruction.price,
                    PriceLevel {
                        price: instruction.price,
                        amount,
                        order_count: Some(count),
                    },
                );
            }
        }
    }

    /// Bid levels, best (highest) price first.
    pub fn bids(&self) -> impl Iterator<Item = &PriceLevel> + '_ {
        self.bids.values().rev()
    }

    /// Ask levels, best (lowest) price first.
    pub fn asks(&self) -> impl Iterator<Item = &PriceLevel> + '_ {
        self.asks.values()
    }

    /// Look up the level at a price on one side.
    pub fn level(&self, side: Side, price: Decimal) -> Option<&PriceLevel> {
        match side {
            Side::Bid => self.bids.get(&price),
            Side::Ask => self.asks.get(&price),
        }
    }

    /// Number of bid price levels.
    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    /// Number of ask price levels.
    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.values().next_back()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.values().next()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn updates_applied(&self) -> u64 {
        self.updates_applied
    }
}

/// Per-instrument table of books, mutated only by the merger operations.
#[derive(Debug, Default)]
pub struct OrderBookStore {
    books: HashMap<Instrument, OrderBookState>,
}

impl OrderBookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the instrument's book with the levels in `records`.
    ///
    /// Every record is validated first; on error the previous book is kept.
    pub fn apply_snapshot(&mut self, instrument: &Instrument, records: &[UpdateRecord]) -> Result<()> {
        let instructions = records
            .iter()
            .map(Instruction::from_record)
            .collect::<Result<Vec<_>>>()?;

        let generation = self.books.get(instrument).map_or(0, |b| b.generation) + 1;
        let mut book = OrderBookState::new(instrument.clone());
        for instruction in instructions {
            book.apply(instruction);
        }
        book.generation = generation;

        self.books.insert(instrument.clone(), book);
        Ok(())
    }

    /// Apply a single level update.
    ///
    /// An instrument without a book is treated as empty. Deleting a price
    /// that is not present is a no-op.
    pub fn apply_update(&mut self, instrument: &Instrument, record: &UpdateRecord) -> Result<()> {
        let instruction = Instruction::from_record(record)?;

        let book = self
            .books
            .entry(instrument.clone())
            .or_insert_with(|| OrderBookState::new(instrument.clone()));
        book.apply(instruction);
        book.updates_applied += 1;
        Ok(())
    }

    /// Read-only access to an instrument's book.
    pub fn get(&self, instrument: &Instrument) -> Option<&OrderBookState> {
        self.books.get(instrument)
    }

    /// Drop an instrument's book. Returns whether one existed.
    pub fn discard(&mut self, instrument: &Instrument) -> bool {
        self.books.remove(instrument).is_some()
    }

    /// Number of instruments with a book.
    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}
