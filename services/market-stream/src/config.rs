//! Configuration for channel subscriptions and the streaming service
//!
//! `ChannelConfig` replaces positional per-call arguments with a typed
//! object validated when a consumer subscribes. `StreamConfig` holds the
//! service-wide knobs (queueing, pre-snapshot handling, symbol aliases).

use serde::{Deserialize, Serialize};

use crate::backpressure::DropPolicy;
use crate::error::{Result, StreamError};
use crate::events::TradeType;
use crate::symbol::AliasTable;

/// Default number of book levels per side.
pub const DEFAULT_BOOK_DEPTH: usize = 100;

/// Per-subscription channel parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Levels per side in materialized book views (≥ 1).
    pub depth: usize,
    /// Live trade events forwarded to the consumer.
    pub trade_type_filter: TradeType,
}

impl ChannelConfig {
    pub fn with_depth(depth: usize) -> Self {
        Self {
            depth,
            ..Self::default()
        }
    }

    pub fn with_trade_type(trade_type_filter: TradeType) -> Self {
        Self {
            trade_type_filter,
            ..Self::default()
        }
    }

    /// Reject parameters the feed cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.depth == 0 {
            return Err(StreamError::InvalidConfig(
                "depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_BOOK_DEPTH,
            trade_type_filter: TradeType::Execution,
        }
    }
}

/// What to do with book updates that arrive before the first snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingUpdatePolicy {
    /// Discard them; the snapshot is the complete baseline.
    Drop,
    /// Hold them and apply them, in arrival order, right after the snapshot.
    Buffer,
}

/// Service-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Maximum queued views per consumer.
    pub queue_capacity: usize,
    /// Policy when a consumer queue overflows.
    pub drop_policy: DropPolicy,
    /// Handling of book updates received before the first snapshot.
    pub pending_update_policy: PendingUpdatePolicy,
    /// Pre-snapshot updates tolerated before the book is declared desynced.
    pub pending_update_limit: usize,
    /// Currency aliases used by the symbol mapper.
    pub aliases: AliasTable,
}

impl StreamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(StreamError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.pending_update_limit == 0 {
            return Err(StreamError::InvalidConfig(
                "pending_update_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            drop_policy: DropPolicy::DropOldest,
            pending_update_policy: PendingUpdatePolicy::Drop,
            pending_update_limit: 1024,
            aliases: AliasTable::default(),
        }
    }
}
