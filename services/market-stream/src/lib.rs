//! Market Stream Service
//!
//! Reconstructs live market data from a push-based feed:
//! - Order books rebuilt from a full snapshot plus per-level updates
//! - Depth-limited book views materialized per consumer
//! - Tickers and public trades adapted to typed records
//! - Shared upstream subscriptions multicast to many consumers
//! - Bounded per-consumer queues with explicit drop policies
//!
//! # Architecture
//!
//! ```text
//!   StreamingTransport events
//!            │
//!      ┌─────▼─────┐
//!      │ Classify  │  ← single shape check per payload
//!      └─────┬─────┘
//!            │
//!   ┌────────┼─────────┐
//!   │        │         │
//! ┌─▼──┐ ┌───▼───┐ ┌───▼───┐
//! │Book│ │Ticker │ │Trades │   one task per (instrument, channel)
//! └─┬──┘ └───┬───┘ └───┬───┘
//!   │        │         │
//! ┌─▼─────┐  │         │
//! │Depth  │  │         │
//! └─┬─────┘  │         │
//!   │        │         │
//! ┌─▼────────▼─────────▼──┐
//! │  Per-consumer queues  │
//! └───────────────────────┘
//! ```

pub mod backpressure;
pub mod classifier;
pub mod config;
pub mod depth;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod metrics;
pub mod order_book;
pub mod service;
pub mod symbol;
pub mod ticker;
pub mod trades;
pub mod transport;

mod channel;
mod feed;

pub use backpressure::DropPolicy;
pub use config::{ChannelConfig, PendingUpdatePolicy, StreamConfig};
pub use depth::{BookLevel, OrderBook};
pub use error::{Result, StreamError};
pub use events::{ChannelKind, TradeType};
pub use service::{BookStream, StreamHandle, StreamingMarketDataService, TickerStream, TradeStream};
pub use ticker::Ticker;
pub use trades::Trade;
pub use transport::{ChannelRequest, StreamingTransport, TransportEvent, TransportSubscription};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
