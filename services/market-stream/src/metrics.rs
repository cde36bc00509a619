//! Observability counters for the streaming service
//!
//! One `StreamMetrics` instance is shared by every channel task. Counters
//! are relaxed atomics; `export` gives a stable, sorted view for
//! Prometheus-style exposition.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::StreamError;

/// Core metrics for the streaming service.
#[derive(Debug, Default)]
pub struct StreamMetrics {
    // Inbound
    pub messages_processed: AtomicU64,
    pub messages_malformed: AtomicU64,
    pub messages_unrecognized: AtomicU64,
    pub heartbeats: AtomicU64,

    // Pre-snapshot window
    pub pending_buffered: AtomicU64,
    pub pending_dropped: AtomicU64,

    // Delivery
    pub views_emitted: AtomicU64,
    pub backpressure_drops: AtomicU64,
    pub consumers_disconnected: AtomicU64,

    // Terminal failures
    pub desyncs: AtomicU64,
    pub transport_losses: AtomicU64,

    // Channels
    pub active_channels: AtomicU64,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a payload handled by a channel task.
    pub fn record_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an error, routed to the counter for its kind.
    pub fn record_error(&self, error: &StreamError) {
        let counter = match error {
            StreamError::MalformedMessage { .. } => &self.messages_malformed,
            StreamError::UnrecognizedShape { .. } => &self.messages_unrecognized,
            StreamError::DesyncDetected { .. } => &self.desyncs,
            StreamError::TransportLoss { .. } => &self.transport_losses,
            StreamError::ConsumerLagged { .. } => &self.consumers_disconnected,
            StreamError::InvalidConfig(_) => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pending_buffered(&self) {
        self.pending_buffered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pending_dropped(&self) {
        self.pending_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_view_emitted(&self) {
        self.views_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a view evicted by `DropOldest`.
    pub fn record_backpressure_drop(&self) {
        self.backpressure_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn channel_opened(&self) {
        self.active_channels.fetch_add(1, Ordering::Relaxed);
    }

    pub fn channel_closed(&self) {
        let _ = self
            .active_channels
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Export metrics as a BTreeMap for Prometheus-style exposition.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let counters = [
            ("messages_processed", &self.messages_processed),
            ("messages_malformed", &self.messages_malformed),
            ("messages_unrecognized", &self.messages_unrecognized),
            ("heartbeats", &self.heartbeats),
            ("pending_buffered", &self.pending_buffered),
            ("pending_dropped", &self.pending_dropped),
            ("views_emitted", &self.views_emitted),
            ("backpressure_drops", &self.backpressure_drops),
            ("consumers_disconnected", &self.consumers_disconnected),
            ("desyncs", &self.desyncs),
            ("transport_losses", &self.transport_losses),
            ("active_channels", &self.active_channels),
        ];
        counters
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.load(Ordering::Relaxed)))
            .collect()
    }
}
