//! # Status Broadcaster
//!
//! Keyed publish/subscribe of [`SyncRun`] updates.
//!
//! Every subscription owns a bounded channel registered under one sync id.
//! Publishing never waits: a subscriber whose channel is full misses that
//! update, the others still get it. Dropping the broadcaster's sender is how
//! a subscription ends, so a receiver seeing `None` knows the stream is over.

use crate::{SyncId, SyncRun};
use core_runtime::config::DEFAULT_SUBSCRIBER_CAPACITY;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Identifies one subscription among those of the same sync
pub type SubscriptionId = u64;

/// Receiving end of a status subscription
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub sync_id: SyncId,
    pub receiver: mpsc::Receiver<SyncRun>,
}

type Registry = HashMap<SyncId, Vec<(SubscriptionId, mpsc::Sender<SyncRun>)>>;

/// Fan-out of run updates to the subscribers of each sync.
///
/// # Example
///
/// ```
/// use core_sync::{StatusBroadcaster, SyncId, SyncRun};
///
/// # #[tokio::main]
/// # async fn main() {
/// let broadcaster = StatusBroadcaster::new(10);
/// let sync_id = SyncId::new();
/// let mut subscription = broadcaster.subscribe(sync_id);
///
/// broadcaster.broadcast(&SyncRun::new(sync_id));
/// assert!(subscription.receiver.recv().await.is_some());
///
/// broadcaster.unsubscribe(&sync_id, subscription.id);
/// assert!(subscription.receiver.recv().await.is_none());
/// # }
/// ```
pub struct StatusBroadcaster {
    capacity: usize,
    next_id: AtomicU64,
    subscribers: Mutex<Registry>,
}

impl StatusBroadcaster {
    /// `capacity` bounds every subscription channel; zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    // A panic elsewhere while holding the lock leaves the map consistent
    // (every mutation is a single insert/retain/remove), so keep using it.
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self, sync_id: SyncId) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.registry()
            .entry(sync_id)
            .or_default()
            .push((id, sender));

        debug!(sync_id = %sync_id, subscription_id = id, "Status subscriber added");
        Subscription {
            id,
            sync_id,
            receiver,
        }
    }

    /// Removes a subscription and closes its channel. Unknown ids are
    /// ignored.
    pub fn unsubscribe(&self, sync_id: &SyncId, subscription_id: SubscriptionId) {
        let mut registry = self.registry();

        if let Some(senders) = registry.get_mut(sync_id) {
            senders.retain(|(id, _)| *id != subscription_id);
            if senders.is_empty() {
                registry.remove(sync_id);
            }
        }

        debug!(sync_id = %sync_id, subscription_id, "Status subscriber removed");
    }

    /// Offers `run` to every subscriber of `run.sync_id` without waiting.
    ///
    /// Returns the number of subscribers that accepted the update.
    pub fn broadcast(&self, run: &SyncRun) -> usize {
        let mut registry = self.registry();
        let Some(senders) = registry.get_mut(&run.sync_id) else {
            return 0;
        };

        let mut delivered = 0;
        senders.retain(|(id, sender)| match sender.try_send(run.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(
                    sync_id = %run.sync_id,
                    subscription_id = id,
                    status = %run.status,
                    "Skipping status update for slow subscriber"
                );
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(sync_id = %run.sync_id, subscription_id = id, "Pruning closed subscriber");
                false
            }
        });

        if senders.is_empty() {
            registry.remove(&run.sync_id);
        }

        delivered
    }

    /// Drops every subscription; each receiver then yields `None`.
    pub fn close_all(&self) {
        let mut registry = self.registry();
        let count: usize = registry.values().map(Vec::len).sum();
        registry.clear();
        debug!(count, "Closed all status subscriptions");
    }

    pub fn subscriber_count(&self, sync_id: &SyncId) -> usize {
        self.registry().get(sync_id).map_or(0, Vec::len)
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

impl fmt::Debug for StatusBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry();
        f.debug_struct("StatusBroadcaster")
            .field("capacity", &self.capacity)
            .field("syncs", &registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyncStatus;

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber_of_the_sync() {
        let broadcaster = StatusBroadcaster::new(4);
        let sync_id = SyncId::new();
        let other = SyncId::new();

        let mut first = broadcaster.subscribe(sync_id);
        let mut second = broadcaster.subscribe(sync_id);
        let mut unrelated = broadcaster.subscribe(other);

        let run = SyncRun::new(sync_id);
        assert_eq!(broadcaster.broadcast(&run), 2);

        assert_eq!(first.receiver.recv().await.unwrap().id, run.id);
        assert_eq!(second.receiver.recv().await.unwrap().id, run.id);
        assert!(unrelated.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_subscriber_does_not_block_others() {
        let broadcaster = StatusBroadcaster::new(1);
        let sync_id = SyncId::new();

        let mut slow = broadcaster.subscribe(sync_id);
        let mut fast = broadcaster.subscribe(sync_id);

        let pending = SyncRun::new(sync_id);
        let running = pending.clone().start().unwrap();

        assert_eq!(broadcaster.broadcast(&pending), 2);
        assert_eq!(fast.receiver.recv().await.unwrap().status, SyncStatus::Pending);

        // slow still holds the first update, so the second is dropped for it only
        assert_eq!(broadcaster.broadcast(&running), 1);
        assert_eq!(fast.receiver.recv().await.unwrap().status, SyncStatus::Running);

        assert_eq!(slow.receiver.recv().await.unwrap().status, SyncStatus::Pending);
        assert!(slow.receiver.try_recv().is_err());
        assert_eq!(broadcaster.subscriber_count(&sync_id), 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_channel_and_is_idempotent() {
        let broadcaster = StatusBroadcaster::new(2);
        let sync_id = SyncId::new();
        let mut subscription = broadcaster.subscribe(sync_id);

        broadcaster.unsubscribe(&sync_id, subscription.id);
        broadcaster.unsubscribe(&sync_id, subscription.id);

        assert_eq!(broadcaster.subscriber_count(&sync_id), 0);
        assert!(subscription.receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let broadcaster = StatusBroadcaster::new(2);
        let sync_id = SyncId::new();
        let subscription = broadcaster.subscribe(sync_id);
        drop(subscription);

        assert_eq!(broadcaster.broadcast(&SyncRun::new(sync_id)), 0);
        assert_eq!(broadcaster.subscriber_count(&sync_id), 0);
    }

    #[tokio::test]
    async fn test_close_all_ends_every_stream() {
        let broadcaster = StatusBroadcaster::default();
        let mut a = broadcaster.subscribe(SyncId::new());
        let mut b = broadcaster.subscribe(SyncId::new());

        broadcaster.close_all();

        assert!(a.receiver.recv().await.is_none());
        assert!(b.receiver.recv().await.is_none());
    }

    #[test]
    fn test_broadcast_without_subscribers() {
        let broadcaster = StatusBroadcaster::new(1);
        assert_eq!(broadcaster.broadcast(&SyncRun::new(SyncId::new())), 0);
    }
}
