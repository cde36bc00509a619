//! Shared fixtures for the streaming integration tests
//!
//! `ScriptedTransport` records subscribe/unsubscribe calls and lets a test
//! push `TransportEvent`s into any open subscription.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use market_stream::transport::SubscriptionHandle;
use market_stream::{
    ChannelKind, ChannelRequest, Result, StreamError, StreamHandle, StreamingTransport, TransportEvent,
    TransportSubscription,
};
use serde_json::Value;
use tokio::sync::mpsc;
use types::instrument::Instrument;

pub const WAIT: Duration = Duration::from_secs(2);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn btc_usd() -> Instrument {
    Instrument::from_codes("BTC", "USD").unwrap()
}

#[derive(Default)]
struct Script {
    requests: Vec<(SubscriptionHandle, ChannelRequest)>,
    open: HashMap<SubscriptionHandle, mpsc::Sender<TransportEvent>>,
    unsubscribed: Vec<SubscriptionHandle>,
}

#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
    next_handle: AtomicU64,
    refuse: AtomicBool,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following subscribe call fail.
    pub fn refuse_subscriptions(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<ChannelRequest> {
        let script = self.script.lock().unwrap();
        script.requests.iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn unsubscribed(&self) -> Vec<SubscriptionHandle> {
        self.script.lock().unwrap().unsubscribed.clone()
    }

    /// Wait for the `nth` (0-based) subscription on `channel`.
    pub async fn subscription(&self, channel: ChannelKind, nth: usize) -> SubscriptionHandle {
        wait_until(|| {
            let script = self.script.lock().unwrap();
            script
                .requests
                .iter()
                .filter(|(_, r)| r.channel == channel)
                .nth(nth)
                .map(|(handle, _)| *handle)
        })
        .await
    }

    pub async fn wait_for_unsubscribe(&self, handle: SubscriptionHandle) {
        wait_until(|| self.unsubscribed().contains(&handle).then_some(())).await
    }

    pub async fn push(&self, handle: SubscriptionHandle, event: TransportEvent) {
        let sender = self.script.lock().unwrap().open.get(&handle).cloned();
        sender
            .expect("subscription is not open")
            .send(event)
            .await
            .expect("channel task stopped listening");
    }

    pub async fn message(&self, handle: SubscriptionHandle, payload: Value) {
        self.push(handle, TransportEvent::Message(payload)).await;
    }

    /// Drop the sending side, as a transport does after a disconnect.
    pub fn close(&self, handle: SubscriptionHandle) {
        self.script.lock().unwrap().open.remove(&handle);
    }
}

#[async_trait]
impl StreamingTransport for ScriptedTransport {
    async fn subscribe_channel(&self, request: ChannelRequest) -> Result<TransportSubscription> {
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        let mut script = self.script.lock().unwrap();
        script.requests.push((handle, request.clone()));

        if self.refuse.load(Ordering::SeqCst) {
            return Err(StreamError::InvalidConfig(format!("symbol {} refused", request.symbol)));
        }

        let (sender, events) = mpsc::channel(64);
        script.open.insert(handle, sender);
        Ok(TransportSubscription { handle, events })
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        let mut script = self.script.lock().unwrap();
        script.open.remove(&handle);
        script.unsubscribed.push(handle);
        Ok(())
    }
}

/// Poll `probe` until it yields a value.
pub async fn wait_until<T>(mut probe: impl FnMut() -> Option<T>) -> T {
    tokio::time::timeout(WAIT, async {
        loop {
            if let Some(value) = probe() {
                return value;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}

/// Next item of a consumer sequence, failing the test on timeout or end.
pub async fn next<T: Send + 'static>(stream: &mut StreamHandle<T>) -> Result<T> {
    within(stream.recv()).await.expect("sequence ended")
}

/// Assert that nothing arrives for a short while.
pub async fn assert_quiet<T: Send + std::fmt::Debug + 'static>(stream: &mut StreamHandle<T>) {
    let outcome = tokio::time::timeout(Duration::from_millis(50), stream.recv()).await;
    assert!(outcome.is_err(), "unexpected delivery: {:?}", outcome);
}

pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future).await.expect("timed out")
}
