//! Streaming transport boundary
//!
//! The service consumes a `StreamingTransport` that delivers decoded JSON
//! payloads per upstream channel. Connection management, reconnection and
//! wire framing belong to the transport implementation.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::events::ChannelKind;

/// Book precision requested upstream (raw price levels, no grouping).
pub const BOOK_PRECISION: &str = "P0";

/// Identifies one upstream subscription on a transport.
pub type SubscriptionHandle = u64;

/// Parameters of an upstream channel subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    pub channel: ChannelKind,
    /// Wire symbol, e.g. `tBTCUSD`.
    pub symbol: String,
    /// Book precision (`P0`); book channel only.
    pub precision: Option<String>,
    /// Levels per side requested upstream; book channel only.
    pub length: Option<usize>,
}

impl ChannelRequest {
    pub fn new(channel: ChannelKind, symbol: impl Into<String>) -> Self {
        Self {
            channel,
            symbol: symbol.into(),
            precision: None,
            length: None,
        }
    }

    pub fn book(symbol: impl Into<String>, length: usize) -> Self {
        Self {
            channel: ChannelKind::Book,
            symbol: symbol.into(),
            precision: Some(BOOK_PRECISION.to_string()),
            length: Some(length),
        }
    }

    /// Subscribe request as sent on the wire.
    pub fn to_subscribe_message(&self) -> Value {
        let mut message = json!({
            "event": "subscribe",
            "channel": self.channel.channel_name(),
            "symbol": self.symbol,
        });
        if let Some(precision) = &self.precision {
            message["prec"] = json!(precision);
        }
        if let Some(length) = self.length {
            message["len"] = json!(length.to_string());
        }
        message
    }
}

/// Events pushed by the transport for one subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Upstream confirmed the subscription.
    Subscribed,
    /// A raw channel frame `[channel_id, body, ...]`.
    Message(Value),
    /// The connection or subscription was lost.
    Disconnected { reason: String },
}

/// An active upstream subscription.
#[derive(Debug)]
pub struct TransportSubscription {
    pub handle: SubscriptionHandle,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Push-based source of channel payloads.
#[async_trait]
pub trait StreamingTransport: Send + Sync + 'static {
    /// Open an upstream subscription.
    async fn subscribe_channel(&self, request: ChannelRequest) -> Result<TransportSubscription>;

    /// Tear down an upstream subscription.
    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()>;
}
