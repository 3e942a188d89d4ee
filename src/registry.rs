//! Fan-out of captured requests to live-stream subscribers.
//!
//! Delivery is at-most-once with no guarantee: every subscriber owns a bounded
//! channel and a broadcast that finds it full drops that subscriber's copy.
//! A stalled browser tab therefore never slows down capture. History lives in
//! the request store, which a client re-queries after reconnecting.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// A serialized captured request, shared between all subscribers.
pub type Message = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<Message>,
}

struct Inner {
    subscribers: DashMap<String, Vec<Subscriber>>,
    next_id: AtomicU64,
    capacity: usize,
}

/// Registry of open live streams keyed by webhook id. Cloning shares the
/// same registry.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<Inner>,
}

impl SubscriptionRegistry {
    /// `capacity` is the number of undelivered messages a subscriber may hold
    /// before further broadcasts to it are dropped.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn subscribe(&self, webhook_id: &str) -> Subscription {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        self.inner
            .subscribers
            .entry(webhook_id.to_string())
            .or_default()
            .push(Subscriber { id, tx });

        Subscription {
            registry: self.clone(),
            webhook_id: webhook_id.to_string(),
            id,
            rx,
        }
    }

    /// Remove exactly one subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, webhook_id: &str, id: SubscriberId) {
        if let Some(mut subs) = self.inner.subscribers.get_mut(webhook_id) {
            subs.retain(|s| s.id != id);
        }
        self.inner
            .subscribers
            .remove_if(webhook_id, |_, subs| subs.is_empty());
    }

    /// Offer `message` to every subscriber of `webhook_id` without waiting.
    /// Returns how many subscribers accepted it.
    pub fn broadcast(&self, webhook_id: &str, message: impl Into<Message>) -> usize {
        let message = message.into();
        let mut delivered = 0;
        let now_empty = {
            let Some(mut subs) = self.inner.subscribers.get_mut(webhook_id) else {
                return 0;
            };
            subs.retain(|s| match s.tx.try_send(message.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Closed(_)) => false,
            });
            subs.is_empty()
        };
        if now_empty {
            self.inner
                .subscribers
                .remove_if(webhook_id, |_, subs| subs.is_empty());
        }
        delivered
    }

    pub fn subscriber_count(&self, webhook_id: &str) -> usize {
        self.inner
            .subscribers
            .get(webhook_id)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Number of webhook ids with at least one subscriber.
    pub fn active_webhooks(&self) -> usize {
        self.inner.subscribers.len()
    }
}

/// Receiving end of one subscription. Dropping it unsubscribes.
pub struct Subscription {
    registry: SubscriptionRegistry,
    webhook_id: String,
    id: SubscriberId,
    rx: mpsc::Receiver<Message>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn webhook_id(&self) -> &str {
        &self.webhook_id
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unsubscribe(&self.webhook_id, self.id);
        debug!(webhook_id = %self.webhook_id, subscriber = self.id.0, "unsubscribed");
    }
}
