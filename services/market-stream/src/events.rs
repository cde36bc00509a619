//! Channel and message definitions for the market-stream core
//!
//! Defines the channel kinds a consumer can subscribe to and the
//! `ChannelMessage` variants produced by the classifier. Messages borrow
//! their entries from the raw payload; nothing downstream of the
//! classifier inspects raw shape again.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Channels available for subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Order book depth (snapshot + per-level updates)
    Book,
    /// Latest ticker
    Ticker,
    /// Public trade executions
    Trades,
}

impl ChannelKind {
    /// Wire channel name used in subscribe requests.
    pub fn channel_name(&self) -> &'static str {
        match self {
            ChannelKind::Book => "book",
            ChannelKind::Ticker => "ticker",
            ChannelKind::Trades => "trades",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.channel_name())
    }
}

/// Type marker of a live trade event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeType {
    /// Executed trade (`te`)
    #[default]
    Execution,
    /// Execution preview/update (`tu`)
    Preview,
}

impl TradeType {
    /// Parse the wire marker of a live trade event.
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "te" => Some(TradeType::Execution),
            "tu" => Some(TradeType::Preview),
            _ => None,
        }
    }

    /// Wire marker for this trade type.
    pub fn marker(&self) -> &'static str {
        match self {
            TradeType::Execution => "te",
            TradeType::Preview => "tu",
        }
    }
}

/// A classified channel payload.
///
/// Entries are borrowed from the raw payload the classifier was given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelMessage<'a> {
    /// Full book replacement: one entry per level.
    BookSnapshot(&'a [Value]),
    /// Single level update.
    BookUpdate(&'a Value),
    /// Ticker field array.
    Ticker(&'a [Value]),
    /// Replay of recent trades.
    TradeSnapshot(&'a [Value]),
    /// One live trade event of the given type.
    TradeUpdate { kind: TradeType, trade: &'a Value },
    /// Keep-alive with no market content.
    Heartbeat,
}

impl ChannelMessage<'_> {
    /// Get the message type as a string label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            ChannelMessage::BookSnapshot(_) => "BookSnapshot",
            ChannelMessage::BookUpdate(_) => "BookUpdate",
            ChannelMessage::Ticker(_) => "Ticker",
            ChannelMessage::TradeSnapshot(_) => "TradeSnapshot",
            ChannelMessage::TradeUpdate { .. } => "TradeUpdate",
            ChannelMessage::Heartbeat => "Heartbeat",
        }
    }
}
