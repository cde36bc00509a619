//! Streaming market data service
//!
//! Public entry point. Each `get_*` call validates its configuration,
//! registers a consumer queue with the channel task for the instrument
//! (starting one if needed) and returns a `StreamHandle` the caller reads
//! from. Dropping or unsubscribing the handle detaches the consumer.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{self, Stream};
use tracing::info;
use types::instrument::Instrument;

use crate::backpressure::ConsumerQueue;
use crate::channel::{ChannelContext, Registry};
use crate::config::{ChannelConfig, StreamConfig};
use crate::depth::OrderBook;
use crate::error::Result;
use crate::events::ChannelKind;
use crate::feed::{BookFeed, Feed, TickerFeed, TradeFeed};
use crate::metrics::StreamMetrics;
use crate::symbol::SymbolMapper;
use crate::ticker::Ticker;
use crate::trades::Trade;
use crate::transport::StreamingTransport;

/// A consumer's view of one channel.
///
/// Yields items until the channel ends; a terminal error is yielded once as
/// the last item.
pub struct StreamHandle<T> {
    consumer: u64,
    instrument: Instrument,
    channel: ChannelKind,
    queue: Arc<ConsumerQueue<T>>,
    detach: Option<Box<dyn FnOnce() + Send>>,
}

/// Materialized order book views.
pub type BookStream = StreamHandle<OrderBook>;
pub type TickerStream = StreamHandle<Ticker>;
pub type TradeStream = StreamHandle<Trade>;

impl<T: Send + 'static> StreamHandle<T> {
    /// Next item, or `None` once the sequence has ended.
    pub async fn recv(&mut self) -> Option<Result<T>> {
        self.queue.recv().await
    }

    /// Adapt the handle into a `Stream`; dropping the stream detaches.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> + Send {
        stream::unfold(self, |mut handle| async move {
            let item = handle.recv().await?;
            Some((item, handle))
        })
    }

    /// Stop delivery to this consumer.
    pub fn unsubscribe(mut self) {
        self.detach_now();
    }

    pub fn consumer_id(&self) -> u64 {
        self.consumer
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn channel(&self) -> ChannelKind {
        self.channel
    }

    /// Items discarded for this consumer under `DropOldest`.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }
}

impl<T> StreamHandle<T> {
    fn detach_now(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl<T> Drop for StreamHandle<T> {
    fn drop(&mut self) {
        self.detach_now();
    }
}

/// Streaming market data over a push transport.
pub struct StreamingMarketDataService {
    context: Arc<ChannelContext>,
    books: Arc<Registry<BookFeed>>,
    tickers: Arc<Registry<TickerFeed>>,
    trades: Arc<Registry<TradeFeed>>,
    next_consumer: AtomicU64,
}

impl StreamingMarketDataService {
    pub fn new(transport: Arc<dyn StreamingTransport>, config: StreamConfig) -> Result<Self> {
        config.validate()?;

        let context = Arc::new(ChannelContext {
            transport,
            mapper: SymbolMapper::new(config.aliases.clone()),
            config,
            metrics: Arc::new(StreamMetrics::new()),
        });

        info!(
            queue_capacity = context.config.queue_capacity,
            drop_policy = ?context.config.drop_policy,
            pending_update_policy = ?context.config.pending_update_policy,
            "Streaming market data service created"
        );

        Ok(Self {
            books: Arc::new(Registry::new(Arc::clone(&context))),
            tickers: Arc::new(Registry::new(Arc::clone(&context))),
            trades: Arc::new(Registry::new(Arc::clone(&context))),
            context,
            next_consumer: AtomicU64::new(1),
        })
    }

    /// Stream materialized order book views of `instrument`.
    ///
    /// A consumer joining a live book first receives the current view.
    pub async fn get_order_book(&self, instrument: &Instrument, config: ChannelConfig) -> Result<BookStream> {
        config.validate()?;
        Ok(self.open(&self.books, instrument, config, || {
            BookFeed::new(instrument.clone(), &self.context.config)
        }))
    }

    /// Stream tickers of `instrument`.
    pub async fn get_ticker(&self, instrument: &Instrument) -> Result<TickerStream> {
        Ok(self.open(&self.tickers, instrument, ChannelConfig::default(), || {
            TickerFeed::new(instrument.clone())
        }))
    }

    /// Stream public trades of `instrument` matching the configured type.
    pub async fn get_trades(&self, instrument: &Instrument, config: ChannelConfig) -> Result<TradeStream> {
        config.validate()?;
        Ok(self.open(&self.trades, instrument, config, || {
            TradeFeed::new(instrument.clone())
        }))
    }

    fn open<F: Feed>(
        &self,
        registry: &Arc<Registry<F>>,
        instrument: &Instrument,
        options: ChannelConfig,
        make_feed: impl FnOnce() -> F,
    ) -> StreamHandle<F::Item> {
        let consumer = self.next_consumer.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(ConsumerQueue::new(
            consumer,
            self.context.config.queue_capacity,
            self.context.config.drop_policy,
        ));

        let generation = registry.attach(instrument, Arc::clone(&queue), options, make_feed);

        let detach_registry = Arc::clone(registry);
        let detach_instrument = instrument.clone();
        StreamHandle {
            consumer,
            instrument: instrument.clone(),
            channel: F::KIND,
            queue,
            detach: Some(Box::new(move || {
                detach_registry.detach(&detach_instrument, generation, consumer);
            })),
        }
    }

    /// Wire symbol used upstream for `instrument`.
    pub fn wire_symbol(&self, instrument: &Instrument) -> String {
        self.context.mapper.wire_symbol(instrument)
    }

    /// Channels with a running upstream subscription.
    pub fn active_channels(&self, kind: ChannelKind) -> usize {
        match kind {
            ChannelKind::Book => self.books.len(),
            ChannelKind::Ticker => self.tickers.len(),
            ChannelKind::Trades => self.trades.len(),
        }
    }

    /// Consumers attached to an instrument's channel.
    pub fn consumer_count(&self, instrument: &Instrument, kind: ChannelKind) -> usize {
        match kind {
            ChannelKind::Book => self.books.consumers(instrument),
            ChannelKind::Ticker => self.tickers.consumers(instrument),
            ChannelKind::Trades => self.trades.consumers(instrument),
        }
    }

    /// Export metrics as a BTreeMap for Prometheus-style exposition.
    pub fn metrics(&self) -> BTreeMap<String, u64> {
        self.context.metrics.export()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.context.config
    }
}
