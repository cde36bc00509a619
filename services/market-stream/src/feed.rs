//! Channel feeds
//!
//! A `Feed` is the channel-specific half of a channel task: it absorbs
//! classified messages into its own state and renders per-consumer
//! deliveries from it. The generic half (transport events, lifecycle,
//! consumer fan-out) lives in `channel`.
//!
//! - `BookFeed`: owns the `OrderBookStore` and the pre-snapshot window;
//!   delivers a depth-limited view whenever a consumer's levels change.
//! - `TickerFeed`: keeps the latest ticker; delivers every ticker.
//! - `TradeFeed`: delivers each decoded trade, filtered per consumer.

use tracing::warn;
use types::instrument::Instrument;

use crate::config::{ChannelConfig, StreamConfig};
use crate::depth::OrderBook;
use crate::error::{Result, StreamError};
use crate::events::{ChannelKind, ChannelMessage, TradeType};
use crate::lifecycle::{PendingOutcome, PendingUpdates, SubscriptionState};
use crate::metrics::StreamMetrics;
use crate::order_book::{OrderBookStore, UpdateRecord};
use crate::ticker::{adapt_ticker, Ticker};
use crate::trades::{adapt_snapshot, decode_trade, passes_filter, Trade};
use crate::transport::ChannelRequest;

/// Effect of one applied message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Applied {
    /// The message established a baseline.
    pub baseline: bool,
    /// Consumers should be offered new deliveries.
    pub refresh: bool,
}

impl Applied {
    const NONE: Applied = Applied {
        baseline: false,
        refresh: false,
    };
    const BASELINE: Applied = Applied {
        baseline: true,
        refresh: true,
    };
    const REFRESH: Applied = Applied {
        baseline: false,
        refresh: true,
    };
}

pub(crate) trait Feed: Send + 'static {
    /// What consumers receive.
    type Item: Clone + Send + 'static;
    /// Per-consumer delivery state.
    type Cursor: Default + Send + 'static;

    const KIND: ChannelKind;

    fn instrument(&self) -> &Instrument;

    /// Upstream request for this feed, sized for its first consumer.
    fn request(&self, symbol: String, first: &ChannelConfig) -> ChannelRequest;

    /// Absorb a classified message (never a heartbeat).
    fn apply(&mut self, message: ChannelMessage<'_>, state: SubscriptionState, metrics: &StreamMetrics) -> Result<Applied>;

    /// Items owed to a consumer after a refresh.
    fn deliver(&self, options: &ChannelConfig, cursor: &mut Self::Cursor) -> Vec<Self::Item>;

    /// Items a consumer receives when it attaches to a running feed.
    fn replay(&self, options: &ChannelConfig, cursor: &mut Self::Cursor) -> Vec<Self::Item>;

    /// Discard all state after the upstream subscription ends.
    fn reset(&mut self);
}

fn unexpected(channel: ChannelKind, message: &ChannelMessage<'_>) -> StreamError {
    StreamError::unrecognized(channel, message.label())
}

/// Order book channel.
pub(crate) struct BookFeed {
    instrument: Instrument,
    store: OrderBookStore,
    pending: PendingUpdates,
    /// Set by a snapshot; forces delivery even when levels are unchanged.
    fresh_baseline: bool,
}

impl BookFeed {
    pub fn new(instrument: Instrument, config: &StreamConfig) -> Self {
        Self {
            instrument,
            store: OrderBookStore::new(),
            pending: PendingUpdates::new(config.pending_update_policy, config.pending_update_limit),
            fresh_baseline: false,
        }
    }

    fn view(&self, depth: usize) -> OrderBook {
        self.store.materialize(&self.instrument, depth)
    }

    fn apply_snapshot(&mut self, records: &[UpdateRecord], metrics: &StreamMetrics) -> Result<Applied> {
        self.store.apply_snapshot(&self.instrument, records)?;

        for record in self.pending.take() {
            if let Err(e) = self.store.apply_update(&self.instrument, &record) {
                warn!(instrument = %self.instrument, error = %e, "Skipping buffered update");
                metrics.record_error(&e);
            }
        }

        self.fresh_baseline = true;
        Ok(Applied::BASELINE)
    }

    fn apply_update(
        &mut self,
        record: UpdateRecord,
        state: SubscriptionState,
        metrics: &StreamMetrics,
    ) -> Result<Applied> {
        if state.has_baseline() {
            self.store.apply_update(&self.instrument, &record)?;
            self.fresh_baseline = false;
            return Ok(Applied::REFRESH);
        }

        match self.pending.admit(record) {
            PendingOutcome::Buffered => metrics.record_pending_buffered(),
            PendingOutcome::Dropped => metrics.record_pending_dropped(),
            PendingOutcome::Overflow => {
                return Err(StreamError::DesyncDetected {
                    instrument: self.instrument.clone(),
                    reason: format!(
                        "{} updates received without a snapshot (limit {})",
                        self.pending.received(),
                        self.pending.limit()
                    ),
                });
            }
        }
        Ok(Applied::NONE)
    }
}

impl Feed for BookFeed {
    type Item = OrderBook;
    /// Last view sent to the consumer.
    type Cursor = Option<OrderBook>;

    const KIND: ChannelKind = ChannelKind::Book;

    fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    fn request(&self, symbol: String, first: &ChannelConfig) -> ChannelRequest {
        ChannelRequest::book(symbol, first.depth)
    }

    fn apply(&mut self, message: ChannelMessage<'_>, state: SubscriptionState, metrics: &StreamMetrics) -> Result<Applied> {
        match message {
            ChannelMessage::BookSnapshot(entries) => {
                let records = UpdateRecord::decode_all(entries)?;
                self.apply_snapshot(&records, metrics)
            }
            ChannelMessage::BookUpdate(entry) => {
                let record = UpdateRecord::decode(entry)?;
                self.apply_update(record, state, metrics)
            }
            other => Err(unexpected(Self::KIND, &other)),
        }
    }

    fn deliver(&self, options: &ChannelConfig, cursor: &mut Self::Cursor) -> Vec<OrderBook> {
        let view = self.view(options.depth);
        let changed = cursor.as_ref().map_or(true, |last| !last.same_levels(&view));
        if !(self.fresh_baseline || changed) {
            return Vec::new();
        }
        *cursor = Some(view.clone());
        vec![view]
    }

    fn replay(&self, options: &ChannelConfig, cursor: &mut Self::Cursor) -> Vec<OrderBook> {
        if self.store.get(&self.instrument).is_none() {
            return Vec::new();
        }
        let view = self.view(options.depth);
        *cursor = Some(view.clone());
        vec![view]
    }

    fn reset(&mut self) {
        self.store.discard(&self.instrument);
        self.pending.take();
        self.fresh_baseline = false;
    }
}

/// Ticker channel.
pub(crate) struct TickerFeed {
    instrument: Instrument,
    last: Option<Ticker>,
}

impl TickerFeed {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            last: None,
        }
    }
}

impl Feed for TickerFeed {
    type Item = Ticker;
    type Cursor = ();

    const KIND: ChannelKind = ChannelKind::Ticker;

    fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    fn request(&self, symbol: String, _first: &ChannelConfig) -> ChannelRequest {
        ChannelRequest::new(Self::KIND, symbol)
    }

    fn apply(&mut self, message: ChannelMessage<'_>, _state: SubscriptionState, _metrics: &StreamMetrics) -> Result<Applied> {
        match message {
            ChannelMessage::Ticker(fields) => {
                self.last = Some(adapt_ticker(&self.instrument, fields)?);
                Ok(Applied::BASELINE)
            }
            other => Err(unexpected(Self::KIND, &other)),
        }
    }

    fn deliver(&self, _options: &ChannelConfig, _cursor: &mut ()) -> Vec<Ticker> {
        self.last.iter().cloned().collect()
    }

    fn replay(&self, options: &ChannelConfig, cursor: &mut ()) -> Vec<Ticker> {
        self.deliver(options, cursor)
    }

    fn reset(&mut self) {
        self.last = None;
    }
}

/// Trades channel.
pub(crate) struct TradeFeed {
    instrument: Instrument,
    /// Trades from the last applied message; `None` marks snapshot replay.
    batch: Vec<(Trade, Option<TradeType>)>,
}

impl TradeFeed {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            batch: Vec::new(),
        }
    }
}

impl Feed for TradeFeed {
    type Item = Trade;
    type Cursor = ();

    const KIND: ChannelKind = ChannelKind::Trades;

    fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    fn request(&self, symbol: String, _first: &ChannelConfig) -> ChannelRequest {
        ChannelRequest::new(Self::KIND, symbol)
    }

    fn apply(&mut self, message: ChannelMessage<'_>, _state: SubscriptionState, _metrics: &StreamMetrics) -> Result<Applied> {
        match message {
            ChannelMessage::TradeSnapshot(entries) => {
                let trades = adapt_snapshot(&self.instrument, entries)?;
                self.batch = trades.into_iter().map(|t| (t, None)).collect();
                Ok(Applied::BASELINE)
            }
            ChannelMessage::TradeUpdate { kind, trade } => {
                let trade = decode_trade(&self.instrument, trade)?;
                self.batch = vec![(trade, Some(kind))];
                Ok(Applied::REFRESH)
            }
            other => Err(unexpected(Self::KIND, &other)),
        }
    }

    fn deliver(&self, options: &ChannelConfig, _cursor: &mut ()) -> Vec<Trade> {
        self.batch
            .iter()
            .filter(|(_, kind)| kind.map_or(true, |k| passes_filter(options.trade_type_filter, k)))
            .map(|(trade, _)| trade.clone())
            .collect()
    }

    fn replay(&self, _options: &ChannelConfig, _cursor: &mut ()) -> Vec<Trade> {
        Vec::new()
    }

    fn reset(&mut self) {
        self.batch.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PendingUpdatePolicy;
    use crate::depth::BookLevel;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn btc_usd() -> Instrument {
        Instrument::from_codes("BTC", "USD").unwrap()
    }

    fn book_feed(policy: PendingUpdatePolicy, limit: usize) -> BookFeed {
        let config = StreamConfig {
            pending_update_policy: policy,
            pending_update_limit: limit,
            ..StreamConfig::default()
        };
        BookFeed::new(btc_usd(), &config)
    }

    fn level(price: i64, amount: i64) -> BookLevel {
        BookLevel {
            price: Decimal::from(price),
            amount: Decimal::from(amount),
        }
    }

    #[test]
    fn test_book_updates_before_snapshot_are_dropped() {
        let metrics = StreamMetrics::new();
        let mut feed = book_feed(PendingUpdatePolicy::Drop, 8);
        let update = json!([101, 1, 4]);
        let snapshot = json!([[100, 1, 2]]);

        let applied = feed
            .apply(ChannelMessage::BookUpdate(&update), SubscriptionState::AwaitingSnapshot, &metrics)
            .unwrap();
        assert_eq!(applied, Applied::NONE);

        let applied = feed
            .apply(
                ChannelMessage::BookSnapshot(snapshot.as_array().unwrap()),
                SubscriptionState::AwaitingSnapshot,
                &metrics,
            )
            .unwrap();
        assert!(applied.baseline);

        let view = feed.deliver(&ChannelConfig::default(), &mut None);
        assert_eq!(view[0].bids, vec![level(100, 2)]);
        assert_eq!(metrics.export()["pending_dropped"], 1);
    }

    #[test]
    fn test_book_buffered_updates_applied_after_snapshot() {
        let metrics = StreamMetrics::new();
        let mut feed = book_feed(PendingUpdatePolicy::Buffer, 8);
        let insert = json!([101, 1, 4]);
        let delete = json!([100, 0, 1]);
        let snapshot = json!([[100, 1, 2], [99, 1, 3]]);

        for entry in [&insert, &delete] {
            feed.apply(ChannelMessage::BookUpdate(entry), SubscriptionState::Subscribing, &metrics)
                .unwrap();
        }
        feed.apply(
            ChannelMessage::BookSnapshot(snapshot.as_array().unwrap()),
            SubscriptionState::AwaitingSnapshot,
            &metrics,
        )
        .unwrap();

        let view = feed.deliver(&ChannelConfig::default(), &mut None);
        assert_eq!(view[0].bids, vec![level(101, 4), level(99, 3)]);
        assert_eq!(view[0].updates_applied, 2);
        assert_eq!(metrics.export()["pending_buffered"], 2);
    }

    #[test]
    fn test_book_pending_overflow_is_desync() {
        let metrics = StreamMetrics::new();
        let mut feed = book_feed(PendingUpdatePolicy::Drop, 1);
        let update = json!([101, 1, 4]);

        feed.apply(ChannelMessage::BookUpdate(&update), SubscriptionState::AwaitingSnapshot, &metrics)
            .unwrap();
        let err = feed
            .apply(ChannelMessage::BookUpdate(&update), SubscriptionState::AwaitingSnapshot, &metrics)
            .unwrap_err();
        assert!(matches!(err, StreamError::DesyncDetected { .. }));
        assert!(err.is_terminal());
    }

    #[test]
    fn test_book_delivers_only_changed_levels() {
        let metrics = StreamMetrics::new();
        let mut feed = book_feed(PendingUpdatePolicy::Drop, 8);
        let snapshot = json!([[100, 1, 2], [99, 1, 3], [98, 1, 1]]);
        let deep_update = json!([98, 1, 7]);
        let top_update = json!([100, 1, 5]);
        let options = ChannelConfig::with_depth(2);
        let mut cursor = None;

        feed.apply(
            ChannelMessage::BookSnapshot(snapshot.as_array().unwrap()),
            SubscriptionState::AwaitingSnapshot,
            &metrics,
        )
        .unwrap();
        assert_eq!(feed.deliver(&options, &mut cursor).len(), 1);

        // Below this consumer's depth: nothing to send.
        feed.apply(ChannelMessage::BookUpdate(&deep_update), SubscriptionState::Live, &metrics)
            .unwrap();
        assert!(feed.deliver(&options, &mut cursor).is_empty());

        feed.apply(ChannelMessage::BookUpdate(&top_update), SubscriptionState::Live, &metrics)
            .unwrap();
        let views = feed.deliver(&options, &mut cursor);
        assert_eq!(views[0].bids, vec![level(100, 5), level(99, 3)]);
    }

    #[test]
    fn test_book_replay_requires_baseline() {
        let metrics = StreamMetrics::new();
        let mut feed = book_feed(PendingUpdatePolicy::Drop, 8);
        let mut cursor = None;
        assert!(feed.replay(&ChannelConfig::default(), &mut cursor).is_empty());

        let snapshot = json!([[100, 1, 2]]);
        feed.apply(
            ChannelMessage::BookSnapshot(snapshot.as_array().unwrap()),
            SubscriptionState::AwaitingSnapshot,
            &metrics,
        )
        .unwrap();
        assert_eq!(feed.replay(&ChannelConfig::default(), &mut cursor).len(), 1);
        assert!(cursor.is_some());

        feed.reset();
        assert!(feed.replay(&ChannelConfig::default(), &mut cursor).is_empty());
    }

    #[test]
    fn test_book_rejects_foreign_messages() {
        let metrics = StreamMetrics::new();
        let mut feed = book_feed(PendingUpdatePolicy::Drop, 8);
        let fields = json!([1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let err = feed
            .apply(ChannelMessage::Ticker(fields.as_array().unwrap()), SubscriptionState::Live, &metrics)
            .unwrap_err();
        assert!(matches!(err, StreamError::UnrecognizedShape { .. }));
    }

    #[test]
    fn test_trade_filter_per_consumer() {
        let metrics = StreamMetrics::new();
        let mut feed = TradeFeed::new(btc_usd());
        let trade = json!([5, 1574694475039i64, 0.5, 7000]);

        feed.apply(
            ChannelMessage::TradeUpdate {
                kind: TradeType::Preview,
                trade: &trade,
            },
            SubscriptionState::Live,
            &metrics,
        )
        .unwrap();

        let executions = ChannelConfig::with_trade_type(TradeType::Execution);
        let previews = ChannelConfig::with_trade_type(TradeType::Preview);
        assert!(feed.deliver(&executions, &mut ()).is_empty());
        assert_eq!(feed.deliver(&previews, &mut ()).len(), 1);
    }

    #[test]
    fn test_trade_snapshot_ignores_filter() {
        let metrics = StreamMetrics::new();
        let mut feed = TradeFeed::new(btc_usd());
        let entries = json!([[2, 1574694475040i64, -0.2, 7001], [1, 1574694475039i64, 0.3, 7000]]);

        let applied = feed
            .apply(
                ChannelMessage::TradeSnapshot(entries.as_array().unwrap()),
                SubscriptionState::AwaitingSnapshot,
                &metrics,
            )
            .unwrap();
        assert!(applied.baseline);

        let previews = ChannelConfig::with_trade_type(TradeType::Preview);
        assert_eq!(feed.deliver(&previews, &mut ()).len(), 2);
        assert!(feed.replay(&previews, &mut ()).is_empty());
    }

    #[test]
    fn test_ticker_replays_latest() {
        let metrics = StreamMetrics::new();
        let mut feed = TickerFeed::new(btc_usd());
        assert!(feed.replay(&ChannelConfig::default(), &mut ()).is_empty());

        let fields = json!([1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        feed.apply(ChannelMessage::Ticker(fields.as_array().unwrap()), SubscriptionState::AwaitingSnapshot, &metrics)
            .unwrap();
        let replayed = feed.replay(&ChannelConfig::default(), &mut ());
        assert_eq!(replayed[0].last, Decimal::from(7));
    }
}
