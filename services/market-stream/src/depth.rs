//! Depth materializer
//!
//! Renders an owned, depth-limited view of an instrument's book. Levels
//! beyond the requested depth stay in the store; they are only left out of
//! this view, so they come back into later views when better levels go away.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::instrument::Instrument;

use crate::order_book::{OrderBookState, OrderBookStore, PriceLevel};

/// A `(price, amount)` pair in a materialized view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub amount: Decimal,
}

impl From<&PriceLevel> for BookLevel {
    fn from(level: &PriceLevel) -> Self {
        Self {
            price: level.price,
            amount: level.amount,
        }
    }
}

/// Immutable public view of an order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    pub instrument: Instrument,
    /// Bids in descending price order (best first).
    pub bids: Vec<BookLevel>,
    /// Asks in ascending price order (best first).
    pub asks: Vec<BookLevel>,
    /// Snapshot generation the view derives from.
    pub generation: u64,
    /// Updates applied on top of that snapshot.
    pub updates_applied: u64,
}

impl OrderBook {
    /// An empty view for an instrument without a book.
    pub fn empty(instrument: Instrument) -> Self {
        Self {
            instrument,
            bids: Vec::new(),
            asks: Vec::new(),
            generation: 0,
            updates_applied: 0,
        }
    }

    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    /// Get the spread between best ask and best bid.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Get the mid-market price (average of best bid and best ask).
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::from(2)),
            _ => None,
        }
    }

    /// Whether both views show the same levels, ignoring counters.
    pub fn same_levels(&self, other: &OrderBook) -> bool {
        self.bids == other.bids && self.asks == other.asks
    }
}

/// Render the top `depth` levels of each side of a book.
pub fn materialize(book: &OrderBookState, depth: usize) -> OrderBook {
    OrderBook {
        instrument: book.instrument().clone(),
        bids: book.bids().take(depth).map(BookLevel::from).collect(),
        asks: book.asks().take(depth).map(BookLevel::from).collect(),
        generation: book.generation(),
        updates_applied: book.updates_applied(),
    }
}

impl OrderBookStore {
    /// Render an instrument's book; an absent book renders empty.
    pub fn materialize(&self, instrument: &Instrument, depth: usize) -> OrderBook {
        self.get(instrument)
            .map(|book| materialize(book, depth))
            .unwrap_or_else(|| OrderBook::empty(instrument.clone()))
    }
}
