//! Subscription lifecycle
//!
//! `Unsubscribed → Subscribing → AwaitingSnapshot → Live → Unsubscribed`
//!
//! A channel enters `Live` only once a baseline (snapshot, or the first
//! ticker) has been received. Book updates arriving earlier are held in
//! `PendingUpdates` and are never applied before that baseline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::PendingUpdatePolicy;
use crate::order_book::UpdateRecord;

/// State of one upstream channel subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Unsubscribed,
    /// Subscribe request sent, not yet confirmed.
    Subscribing,
    /// Confirmed, no baseline received yet.
    AwaitingSnapshot,
    Live,
}

/// Inputs driving the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Subscribe,
    /// Transport confirmed the subscription.
    Confirmed,
    /// A baseline was applied.
    Baseline,
    /// Connection lost, or the last consumer detached.
    Disconnected,
}

impl SubscriptionState {
    /// Next state after `event`; events that make no sense in the current
    /// state leave it unchanged.
    pub fn on(self, event: LifecycleEvent) -> SubscriptionState {
        use LifecycleEvent::*;
        use SubscriptionState::*;

        match (self, event) {
            (_, Disconnected) => Unsubscribed,
            (Unsubscribed, Subscribe) => Subscribing,
            (Subscribing, Confirmed) => AwaitingSnapshot,
            (Subscribing | AwaitingSnapshot | Live, Baseline) => Live,
            (state, _) => state,
        }
    }

    /// Whether updates may be merged into the book.
    pub fn has_baseline(&self) -> bool {
        matches!(self, SubscriptionState::Live)
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubscriptionState::Unsubscribed => "unsubscribed",
            SubscriptionState::Subscribing => "subscribing",
            SubscriptionState::AwaitingSnapshot => "awaiting_snapshot",
            SubscriptionState::Live => "live",
        };
        f.write_str(name)
    }
}

/// What happened to an update received before the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOutcome {
    Buffered,
    Dropped,
    /// The pre-snapshot window is exhausted.
    Overflow,
}

/// Pre-snapshot update window.
#[derive(Debug, Clone)]
pub struct PendingUpdates {
    policy: PendingUpdatePolicy,
    limit: usize,
    buffered: Vec<UpdateRecord>,
    received: usize,
}

impl PendingUpdates {
    pub fn new(policy: PendingUpdatePolicy, limit: usize) -> Self {
        Self {
            policy,
            limit,
            buffered: Vec::new(),
            received: 0,
        }
    }

    /// Admit one pre-snapshot update.
    pub fn admit(&mut self, record: UpdateRecord) -> PendingOutcome {
        self.received += 1;
        if self.received > self.limit {
            return PendingOutcome::Overflow;
        }
        match self.policy {
            PendingUpdatePolicy::Buffer => {
                self.buffered.push(record);
                PendingOutcome::Buffered
            }
            PendingUpdatePolicy::Drop => PendingOutcome::Dropped,
        }
    }

    /// Take the buffered updates in arrival order and reset the window.
    pub fn take(&mut self) -> Vec<UpdateRecord> {
        self.received = 0;
        std::mem::take(&mut self.buffered)
    }

    /// Updates seen since the window was last reset.
    pub fn received(&self) -> usize {
        self.received
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
