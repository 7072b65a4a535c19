//! In-process fan-out directory: key → live bounded delivery channels.
//!
//! A key may hold any number of channels (one per open connection). Publishing
//! never blocks: a channel that is full or whose reader has gone away simply
//! misses the item. The persisted row is the durable copy, the push is a hint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};

pub struct SubscriptionRegistry<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    channels: DashMap<String, HashMap<u64, mpsc::Sender<T>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl<T> Clone for SubscriptionRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for SubscriptionRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("keys", &self.inner.channels.len())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

impl<T> SubscriptionRegistry<T>
where
    T: Clone + Send + 'static,
{
    /// `capacity` is the per-channel buffer; values below 1 are raised to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                channels: DashMap::new(),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Register a fresh channel under `key`.
    ///
    /// The returned [`Unsubscribe`] removes exactly this channel, once, either
    /// when called or when dropped.
    pub fn subscribe(&self, key: &str) -> (mpsc::Receiver<T>, Unsubscribe) {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        self.inner
            .channels
            .entry(key.to_string())
            .or_default()
            .insert(id, tx);

        let registry: Weak<dyn Deregister> = Arc::downgrade(&self.inner) as Weak<dyn Deregister>;
        let unsubscribe = Unsubscribe {
            key: key.to_string(),
            id,
            registry,
            done: AtomicBool::new(false),
        };

        (rx, unsubscribe)
    }

    /// Hand `item` to every channel under `key` without waiting. Returns how
    /// many channels accepted it.
    pub fn publish(&self, key: &str, item: T) -> usize {
        let Some(entry) = self.inner.channels.get(key) else {
            return 0;
        };

        let mut delivered = 0;
        for (id, tx) in entry.iter() {
            match tx.try_send(item.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::trace!(key, subscription = *id, "channel full, dropping item");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::trace!(key, subscription = *id, "channel closed, dropping item");
                }
            }
        }

        delivered
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner
            .channels
            .get(key)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    /// Number of keys with at least one live channel.
    pub fn key_count(&self) -> usize {
        self.inner.channels.len()
    }
}

trait Deregister: Send + Sync {
    fn deregister(&self, key: &str, id: u64);
}

impl<T: Send + 'static> Deregister for Inner<T> {
    fn deregister(&self, key: &str, id: u64) {
        if let Some(mut entry) = self.channels.get_mut(key) {
            entry.remove(&id);
        }
        self.channels.remove_if(key, |_, channels| channels.is_empty());
    }
}

/// Cleanup handle for one subscription. Idempotent; also runs on drop.
pub struct Unsubscribe {
    key: String,
    id: u64,
    registry: Weak<dyn Deregister>,
    done: AtomicBool,
}

impl Unsubscribe {
    pub fn unsubscribe(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.deregister(&self.key, self.id);
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("done", &self.done.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fan_out_to_every_subscription() {
        let registry = SubscriptionRegistry::<String>::new(1);
        let (mut a, _ua) = registry.subscribe("42");
        let (mut b, _ub) = registry.subscribe("42");
        let (mut c, _uc) = registry.subscribe("42");

        assert_eq!(registry.publish("42", "graded".to_string()), 3);

        assert_eq!(a.recv().await.unwrap(), "graded");
        assert_eq!(b.recv().await.unwrap(), "graded");
        assert_eq!(c.recv().await.unwrap(), "graded");
    }

    #[tokio::test]
    async fn test_no_cross_talk() {
        let registry = SubscriptionRegistry::<String>::new(1);
        let (mut a, _ua) = registry.subscribe("42");
        let (mut b, _ub) = registry.subscribe("7");

        registry.publish("42", "for 42".to_string());

        assert_eq!(a.recv().await.unwrap(), "for 42");
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn test_publish_to_unknown_key() {
        let registry = SubscriptionRegistry::<u32>::new(1);
        assert_eq!(registry.publish("nobody", 1), 0);
        assert_eq!(registry.key_count(), 0);
    }

    #[test]
    fn test_unsubscribe_is_idempotent_and_scoped() {
        let registry = SubscriptionRegistry::<u32>::new(1);
        let (_a, ua) = registry.subscribe("42");
        let (mut b, _ub) = registry.subscribe("42");
        assert_eq!(registry.subscriber_count("42"), 2);

        ua.unsubscribe();
        ua.unsubscribe();
        assert_eq!(registry.subscriber_count("42"), 1);

        assert_eq!(registry.publish("42", 9), 1);
        assert_eq!(b.try_recv().unwrap(), 9);
    }

    #[test]
    fn test_drop_releases_and_prunes_key() {
        let registry = SubscriptionRegistry::<u32>::new(1);
        {
            let (_rx, _unsubscribe) = registry.subscribe("42");
            assert_eq!(registry.key_count(), 1);
        }
        assert_eq!(registry.subscriber_count("42"), 0);
        assert_eq!(registry.key_count(), 0);
    }

    #[test]
    fn test_full_channel_drops_instead_of_blocking() {
        let registry = SubscriptionRegistry::<u32>::new(1);
        let (mut rx, _u) = registry.subscribe("42");

        assert_eq!(registry.publish("42", 1), 1);
        assert_eq!(registry.publish("42", 2), 0);

        assert_eq!(rx.try_recv().unwrap(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_receiver_is_skipped() {
        let registry = SubscriptionRegistry::<u32>::new(1);
        let (rx, _u) = registry.subscribe("42");
        let (mut live, _u2) = registry.subscribe("42");
        drop(rx);

        assert_eq!(registry.publish("42", 5), 1);
        assert_eq!(live.try_recv().unwrap(), 5);
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let registry = SubscriptionRegistry::<u32>::new(1);
        let (_rx, unsubscribe) = registry.subscribe("42");
        drop(registry);
        unsubscribe.unsubscribe();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_subscribe_publish_unsubscribe() {
        let registry = SubscriptionRegistry::<u64>::new(4);
        let mut handles = Vec::new();

        for i in 0..32u64 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let key = format!("user-{}", i % 4);
                let (mut rx, unsubscribe) = registry.subscribe(&key);
                registry.publish(&key, i);
                let _ = rx.try_recv();
                tokio::task::yield_now().await;
                unsubscribe.unsubscribe();
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.key_count(), 0);
    }
}
