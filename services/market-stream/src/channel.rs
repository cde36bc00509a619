//! Channel tasks and the subscription registry
//!
//! One tokio task runs per (instrument, channel kind). It owns the feed
//! state, holds the single upstream subscription and fans out deliveries to
//! every attached consumer queue. The registry maps instruments to running
//! tasks and counts their consumers; removing the last consumer shuts the
//! task down, which unsubscribes upstream.
//!
//! ```text
//!  transport events ──┐
//!                     ▼
//!               ┌───────────┐   classify → Feed::apply
//!  commands ──▶ │  channel  │──────────────────────────┐
//!  (attach,     │   task    │                          ▼
//!   detach,     └───────────┘            ┌─────────┬─────────┐
//!   shutdown)                            │ queue 1 │ queue 2 │ …
//!                                        └─────────┴─────────┘
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use types::instrument::Instrument;

use crate::backpressure::{ConsumerQueue, PushOutcome};
use crate::classifier::classify;
use crate::config::{ChannelConfig, StreamConfig};
use crate::error::{Result, StreamError};
use crate::events::{ChannelKind, ChannelMessage};
use crate::feed::Feed;
use crate::lifecycle::{LifecycleEvent, SubscriptionState};
use crate::metrics::StreamMetrics;
use crate::symbol::SymbolMapper;
use crate::transport::{
    ChannelRequest, StreamingTransport, SubscriptionHandle, TransportEvent, TransportSubscription,
};

/// Shared by every registry and channel task of one service.
pub(crate) struct ChannelContext {
    pub transport: Arc<dyn StreamingTransport>,
    pub config: StreamConfig,
    pub mapper: SymbolMapper,
    pub metrics: Arc<StreamMetrics>,
}

pub(crate) enum Command<F: Feed> {
    Attach {
        queue: Arc<ConsumerQueue<F::Item>>,
        options: ChannelConfig,
    },
    Detach {
        consumer: u64,
    },
    Shutdown,
}

struct Entry<F: Feed> {
    generation: u64,
    commands: mpsc::UnboundedSender<Command<F>>,
    consumers: HashSet<u64>,
}

/// Running channel tasks of one feed type, keyed by instrument.
pub(crate) struct Registry<F: Feed> {
    context: Arc<ChannelContext>,
    entries: Mutex<HashMap<Instrument, Entry<F>>>,
    next_generation: AtomicU64,
}

impl<F: Feed> Registry<F> {
    pub fn new(context: Arc<ChannelContext>) -> Self {
        Self {
            context,
            entries: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Instrument, Entry<F>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a consumer queue, starting the channel task if none runs.
    ///
    /// Returns the generation of the task the consumer joined. Must be
    /// called from within a Tokio runtime.
    pub fn attach(
        self: &Arc<Self>,
        instrument: &Instrument,
        queue: Arc<ConsumerQueue<F::Item>>,
        options: ChannelConfig,
        make_feed: impl FnOnce() -> F,
    ) -> u64 {
        let mut entries = self.lock();
        let consumer = queue.consumer();

        if let Some(entry) = entries.get_mut(instrument) {
            let command = Command::Attach {
                queue: Arc::clone(&queue),
                options,
            };
            if entry.commands.send(command).is_ok() {
                entry.consumers.insert(consumer);
                return entry.generation;
            }
            // The task is gone without deregistering itself.
            entries.remove(instrument);
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (commands, receiver) = mpsc::unbounded_channel();
        entries.insert(
            instrument.clone(),
            Entry {
                generation,
                commands,
                consumers: HashSet::from([consumer]),
            },
        );

        let feed = make_feed();
        let symbol = self.context.mapper.wire_symbol(instrument);
        let task = ChannelTask {
            request: feed.request(symbol, &options),
            generation,
            feed,
            state: SubscriptionState::Unsubscribed,
            subscribers: BTreeMap::new(),
            registry: Arc::clone(self),
            context: Arc::clone(&self.context),
        };
        tokio::spawn(task.run(receiver, queue, options));
        generation
    }

    /// Detach a consumer from the task of the given generation.
    ///
    /// Stale generations and unknown consumers are ignored. Removing the
    /// last consumer shuts the task down.
    pub fn detach(&self, instrument: &Instrument, generation: u64, consumer: u64) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(instrument) else {
            return;
        };
        if entry.generation != generation || !entry.consumers.remove(&consumer) {
            return;
        }

        let _ = entry.commands.send(Command::Detach { consumer });
        if entry.consumers.is_empty() {
            if let Some(entry) = entries.remove(instrument) {
                let _ = entry.commands.send(Command::Shutdown);
            }
        }
    }

    /// Remove an entry if it still belongs to `generation`.
    fn deregister(&self, instrument: &Instrument, generation: u64) {
        let mut entries = self.lock();
        if entries.get(instrument).is_some_and(|e| e.generation == generation) {
            entries.remove(instrument);
        }
    }

    /// Number of running channel tasks.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Consumers attached to an instrument's task.
    pub fn consumers(&self, instrument: &Instrument) -> usize {
        self.lock().get(instrument).map_or(0, |e| e.consumers.len())
    }
}

struct Subscriber<F: Feed> {
    options: ChannelConfig,
    cursor: F::Cursor,
    queue: Arc<ConsumerQueue<F::Item>>,
}

enum Exit {
    Shutdown,
    Failed(StreamError),
}

struct ChannelTask<F: Feed> {
    request: ChannelRequest,
    generation: u64,
    feed: F,
    state: SubscriptionState,
    subscribers: BTreeMap<u64, Subscriber<F>>,
    registry: Arc<Registry<F>>,
    context: Arc<ChannelContext>,
}

impl<F: Feed> ChannelTask<F> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command<F>>,
        first: Arc<ConsumerQueue<F::Item>>,
        options: ChannelConfig,
    ) {
        self.context.metrics.channel_opened();
        self.attach(first, options);
        self.transition(LifecycleEvent::Subscribe);

        let transport = Arc::clone(&self.context.transport);
        let subscribed = transport.subscribe_channel(self.request.clone()).await;
        let exit = match subscribed {
            Ok(subscription) => self.pump(subscription, &mut commands).await,
            Err(e) => Exit::Failed(self.transport_loss(e.to_string())),
        };

        match exit {
            Exit::Shutdown => {
                for (_, subscriber) in std::mem::take(&mut self.subscribers) {
                    subscriber.queue.close();
                }
            }
            Exit::Failed(error) => self.fail(error, &mut commands),
        }

        self.feed.reset();
        self.transition(LifecycleEvent::Disconnected);
        self.context.metrics.channel_closed();
    }

    async fn pump(
        &mut self,
        subscription: TransportSubscription,
        commands: &mut mpsc::UnboundedReceiver<Command<F>>,
    ) -> Exit {
        let TransportSubscription { handle, mut events } = subscription;

        let exit = loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Attach { queue, options }) => self.attach(queue, options),
                    Some(Command::Detach { consumer }) => self.detach(consumer),
                    Some(Command::Shutdown) | None => break Exit::Shutdown,
                },
                event = events.recv() => match event {
                    Some(TransportEvent::Subscribed) => self.transition(LifecycleEvent::Confirmed),
                    Some(TransportEvent::Message(payload)) => {
                        if let Err(e) = self.handle_payload(&payload) {
                            break Exit::Failed(e);
                        }
                    }
                    Some(TransportEvent::Disconnected { reason }) => {
                        break Exit::Failed(self.transport_loss(reason));
                    }
                    None => break Exit::Failed(self.transport_loss("event stream closed".to_string())),
                },
            }
        };

        if !matches!(exit, Exit::Failed(StreamError::TransportLoss { .. })) {
            let transport = Arc::clone(&self.context.transport);
            let instrument = self.feed.instrument().clone();
            unsubscribe(transport.as_ref(), &instrument, F::KIND, handle).await;
        }
        exit
    }

    fn handle_payload(&mut self, payload: &Value) -> Result<()> {
        let metrics = Arc::clone(&self.context.metrics);
        metrics.record_processed();

        let message = match classify(F::KIND, payload) {
            Ok(message) => message,
            Err(e) => {
                self.retain(e);
                return Ok(());
            }
        };
        if let ChannelMessage::Heartbeat = message {
            metrics.record_heartbeat();
            return Ok(());
        }

        debug!(
            instrument = %self.feed.instrument(),
            channel = %F::KIND,
            message = message.label(),
            state = %self.state,
            "Processing message"
        );

        match self.feed.apply(message, self.state, &metrics) {
            Ok(applied) => {
                if applied.baseline {
                    self.transition(LifecycleEvent::Baseline);
                }
                if applied.refresh {
                    self.fan_out();
                }
                Ok(())
            }
            Err(e) if e.is_terminal() => Err(e),
            Err(e) => {
                self.retain(e);
                Ok(())
            }
        }
    }

    /// Log and count an error that leaves state untouched.
    fn retain(&self, error: StreamError) {
        warn!(
            instrument = %self.feed.instrument(),
            channel = %F::KIND,
            error = %error,
            "Discarding message"
        );
        self.context.metrics.record_error(&error);
    }

    fn transition(&mut self, event: LifecycleEvent) {
        let next = self.state.on(event);
        if next != self.state {
            info!(
                instrument = %self.feed.instrument(),
                channel = %F::KIND,
                from = %self.state,
                to = %next,
                "Subscription state changed"
            );
            self.state = next;
        }
    }

    fn transport_loss(&self, reason: String) -> StreamError {
        StreamError::TransportLoss {
            channel: F::KIND,
            instrument: self.feed.instrument().clone(),
            reason,
        }
    }

    fn attach(&mut self, queue: Arc<ConsumerQueue<F::Item>>, options: ChannelConfig) {
        let consumer = queue.consumer();
        if let Some(length) = self.request.length {
            if options.depth > length {
                warn!(
                    instrument = %self.feed.instrument(),
                    consumer,
                    depth = options.depth,
                    upstream_length = length,
                    "Requested depth exceeds upstream book length"
                );
            }
        }

        let mut subscriber = Subscriber {
            options,
            cursor: F::Cursor::default(),
            queue,
        };
        let items = self.feed.replay(&subscriber.options, &mut subscriber.cursor);
        if !push_all(&self.context.metrics, &subscriber.queue, items) {
            self.release(consumer);
            return;
        }

        info!(
            instrument = %self.feed.instrument(),
            channel = %F::KIND,
            consumer,
            consumers = self.subscribers.len() + 1,
            "Consumer attached"
        );
        self.subscribers.insert(consumer, subscriber);
    }

    fn detach(&mut self, consumer: u64) {
        if let Some(subscriber) = self.subscribers.remove(&consumer) {
            subscriber.queue.close();
            info!(
                instrument = %self.feed.instrument(),
                channel = %F::KIND,
                consumer,
                "Consumer detached"
            );
        }
    }

    /// Offer fresh deliveries to every consumer; drop the ones that lagged.
    fn fan_out(&mut self) {
        let metrics = &self.context.metrics;
        let mut lagged = Vec::new();

        for (consumer, subscriber) in self.subscribers.iter_mut() {
            let items = self.feed.deliver(&subscriber.options, &mut subscriber.cursor);
            if !push_all(metrics, &subscriber.queue, items) {
                lagged.push(*consumer);
            }
        }

        for consumer in lagged {
            self.subscribers.remove(&consumer);
            self.release(consumer);
        }
    }

    /// Remove a consumer the task stopped serving from the registry,
    /// shutting the task down when none remain.
    fn release(&self, consumer: u64) {
        warn!(
            instrument = %self.feed.instrument(),
            channel = %F::KIND,
            consumer,
            "Consumer stopped receiving"
        );
        self.registry.detach(self.feed.instrument(), self.generation, consumer);
    }

    /// End every consumer sequence with `error`.
    fn fail(&mut self, error: StreamError, commands: &mut mpsc::UnboundedReceiver<Command<F>>) {
        error!(
            instrument = %self.feed.instrument(),
            channel = %F::KIND,
            consumers = self.subscribers.len(),
            error = %error,
            "Channel terminated"
        );
        self.context.metrics.record_error(&error);

        self.registry.deregister(self.feed.instrument(), self.generation);
        commands.close();
        while let Ok(command) = commands.try_recv() {
            if let Command::Attach { queue, .. } = command {
                queue.terminate(error.clone());
            }
        }

        for (_, subscriber) in std::mem::take(&mut self.subscribers) {
            subscriber.queue.terminate(error.clone());
        }
    }
}

async fn unsubscribe(
    transport: &dyn StreamingTransport,
    instrument: &Instrument,
    channel: ChannelKind,
    handle: SubscriptionHandle,
) {
    match transport.unsubscribe(handle).await {
        Ok(()) => debug!(%instrument, %channel, handle, "Upstream subscription closed"),
        Err(e) => warn!(%instrument, %channel, handle, error = %e, "Failed to unsubscribe upstream"),
    }
}

/// Push items onto a consumer queue. Returns `false` once the consumer is
/// gone.
fn push_all<T>(metrics: &StreamMetrics, queue: &ConsumerQueue<T>, items: Vec<T>) -> bool {
    for item in items {
        match queue.push(item) {
            PushOutcome::Queued => metrics.record_view_emitted(),
            PushOutcome::DroppedOldest => {
                metrics.record_view_emitted();
                metrics.record_backpressure_drop();
            }
            PushOutcome::Disconnected => {
                metrics.record_error(&StreamError::ConsumerLagged {
                    consumer: queue.consumer(),
                });
                return false;
            }
            PushOutcome::Closed => return false,
        }
    }
    true
}
