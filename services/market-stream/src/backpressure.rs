//! Backpressure and flow control for consumer delivery
//!
//! Each consumer owns a bounded outbound queue shared with the channel task.
//! The channel task only ever pushes without waiting; when a consumer falls
//! behind, the queue's `DropPolicy` decides whether the oldest views are
//! discarded or the consumer is disconnected with `ConsumerLagged`.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::warn;

use crate::error::{Result, StreamError};

/// Drop policy when a consumer's queue overflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropPolicy {
    /// Disconnect the lagging consumer with `ConsumerLagged`.
    Disconnect,
    /// Drop oldest views to make room for newer ones.
    DropOldest,
}

/// Result of pushing one item onto a consumer queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting the oldest item.
    DroppedOldest,
    /// The queue overflowed under `Disconnect` and is now terminated.
    Disconnected,
    /// The queue was already closed; the item was discarded.
    Closed,
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    /// Error delivered once after the remaining items.
    terminal: Option<StreamError>,
    closed: bool,
    dropped: u64,
}

/// Per-consumer outbound queue with bounded capacity.
#[derive(Debug)]
pub struct ConsumerQueue<T> {
    consumer: u64,
    capacity: usize,
    drop_policy: DropPolicy,
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T> ConsumerQueue<T> {
    pub fn new(consumer: u64, capacity: usize, drop_policy: DropPolicy) -> Self {
        Self {
            consumer,
            capacity,
            drop_policy,
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(64)),
                terminal: None,
                closed: false,
                dropped: 0,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn consumer(&self) -> u64 {
        self.consumer
    }

    /// Enqueue an item without waiting.
    pub fn push(&self, item: T) -> PushOutcome {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return PushOutcome::Closed;
            }

            if state.items.len() >= self.capacity {
                match self.drop_policy {
                    DropPolicy::Disconnect => {
                        state.closed = true;
                        state.terminal = Some(StreamError::ConsumerLagged {
                            consumer: self.consumer,
                        });
                        warn!(
                            consumer = self.consumer,
                            capacity = self.capacity,
                            "Backpressure: disconnecting lagging consumer"
                        );
                        PushOutcome::Disconnected
                    }
                    DropPolicy::DropOldest => {
                        state.items.pop_front();
                        state.items.push_back(item);
                        state.dropped += 1;
                        PushOutcome::DroppedOldest
                    }
                }
            } else {
                state.items.push_back(item);
                PushOutcome::Queued
            }
        };

        self.notify.notify_one();
        outcome
    }

    /// End the queue with a terminal error, delivered after queued items.
    pub fn terminate(&self, error: StreamError) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.terminal = Some(error);
        }
        self.notify.notify_one();
    }

    /// End the queue without an error.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    /// Wait for the next item.
    ///
    /// Yields queued items, then the terminal error once, then `None`.
    pub async fn recv(&self) -> Option<Result<T>> {
        loop {
            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(Ok(item));
                }
                if let Some(error) = state.terminal.take() {
                    return Some(Err(error));
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Take an item if one is ready.
    pub fn try_recv(&self) -> Option<Result<T>> {
        let mut state = self.lock();
        match state.items.pop_front() {
            Some(item) => Some(Ok(item)),
            None => state.terminal.take().map(Err),
        }
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Total items dropped for this consumer.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_queue_basic() {
        let queue = ConsumerQueue::new(1, 10, DropPolicy::Disconnect);

        assert_eq!(queue.push(1), PushOutcome::Queued);
        assert_eq!(queue.push(2), PushOutcome::Queued);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_recv(), Some(Ok(1)));
        assert_eq!(queue.try_recv(), Some(Ok(2)));
        assert_eq!(queue.try_recv(), None);
    }

    #[test]
    fn test_overflow_disconnect() {
        let queue = ConsumerQueue::new(7, 2, DropPolicy::Disconnect);

        queue.push(1);
        queue.push(2);
        assert_eq!(queue.push(3), PushOutcome::Disconnected);
        assert!(queue.is_closed());
        assert_eq!(queue.push(4), PushOutcome::Closed);

        assert_eq!(queue.try_recv(), Some(Ok(1)));
        assert_eq!(queue.try_recv(), Some(Ok(2)));
        assert_eq!(
            queue.try_recv(),
            Some(Err(StreamError::ConsumerLagged { consumer: 7 }))
        );
        assert_eq!(queue.try_recv(), None);
    }

    #[test]
    fn test_overflow_drop_oldest() {
        let queue = ConsumerQueue::new(1, 2, DropPolicy::DropOldest);

        queue.push(1);
        queue.push(2);
        assert_eq!(queue.push(3), PushOutcome::DroppedOldest);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.try_recv(), Some(Ok(2)));
        assert_eq!(queue.try_recv(), Some(Ok(3)));
    }

    #[test]
    fn test_terminate_is_delivered_once() {
        let queue: ConsumerQueue<u32> = ConsumerQueue::new(1, 4, DropPolicy::DropOldest);
        queue.push(5);
        queue.terminate(StreamError::InvalidConfig("gone".to_string()));
        queue.terminate(StreamError::ConsumerLagged { consumer: 1 });

        assert_eq!(queue.try_recv(), Some(Ok(5)));
        assert_eq!(
            queue.try_recv(),
            Some(Err(StreamError::InvalidConfig("gone".to_string())))
        );
        assert_eq!(queue.try_recv(), None);
    }

    #[tokio::test]
    async fn test_recv_wakes_on_push() {
        let queue = Arc::new(ConsumerQueue::new(1, 4, DropPolicy::DropOldest));
        let producer = Arc::clone(&queue);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.push("view");
            producer.close();
        });

        assert_eq!(queue.recv().await, Some(Ok("view")));
        assert_eq!(queue.recv().await, None);
        handle.await.unwrap();
    }
}
