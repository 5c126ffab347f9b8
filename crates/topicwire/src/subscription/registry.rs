/*
 * SPDX-FileCopyrightText: Copyright (c) 2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

// src/subscription/registry.rs
// SubscriptionRegistry is the single source of truth for which topics
// are subscribed.
//
// Each topic maps to one Subscription record holding its delivery
// channel, the cancellation token and completion handle of its worker,
// the broker-side handle, and a closed flag. All of it sits behind one
// RwLock that is only held for bookkeeping and non-blocking sends, never
// across network calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::Message;
use crate::config::{BackpressurePolicy, PubSubConfig};
use crate::stats::DeliveryStatsTracker;
use crate::subscription::worker::SubscriptionWorker;
use crate::transport::{Connection, SubscriptionHandle};

// DeliveryReceiver is the consuming end of a topic's delivery channel.
// It is shared, since any number of callers may be waiting on the same
// topic; each message goes to exactly one of them.
pub type DeliveryReceiver = Arc<Mutex<mpsc::Receiver<Message>>>;

// RegistryOptions are the parts of the client configuration that shape
// subscription behaviour.
#[derive(Clone, Copy, Debug)]
pub struct RegistryOptions {
    pub delivery_capacity: usize,
    pub backpressure: BackpressurePolicy,
    pub unsubscribe_timeout: Duration,
    pub worker_wait_timeout: Duration,
}

impl RegistryOptions {
    pub fn from_config(config: &PubSubConfig) -> Self {
        Self {
            delivery_capacity: config.delivery_capacity.max(1),
            backpressure: config.backpressure,
            unsubscribe_timeout: config.unsubscribe_timeout,
            worker_wait_timeout: config.worker_wait_timeout,
        }
    }
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self::from_config(&PubSubConfig::default())
    }
}

// Subscription is the registry's record for one topic.
pub(crate) struct Subscription {
    // id distinguishes this record from earlier or later records for
    // the same topic, so a worker only ever touches its own.
    id: u64,
    sender: mpsc::Sender<Message>,
    receiver: DeliveryReceiver,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
    handle: Option<Arc<dyn SubscriptionHandle>>,
    // closed is set once teardown starts. No message is sent on a
    // closed subscription's channel.
    closed: bool,
    // torn_down flips to true once the teardown that closed this entry
    // has finished.
    torn_down: watch::Sender<bool>,
}

// Pending is what a caller of unregister or drain has to wait on for
// one topic.
enum Pending {
    Teardown(Teardown),
    InFlight(watch::Receiver<bool>),
}

// Teardown is everything taken out of a Subscription to finish tearing
// it down outside the lock.
struct Teardown {
    topic: String,
    id: u64,
    cancel: CancellationToken,
    handle: Option<Arc<dyn SubscriptionHandle>>,
    worker: Option<JoinHandle<()>>,
    torn_down: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct SubscriptionRegistry {
    entries: Arc<RwLock<HashMap<String, Subscription>>>,
    next_id: Arc<AtomicU64>,
    options: RegistryOptions,
    stats: Arc<DeliveryStatsTracker>,
    // root is the parent of every worker's cancellation token.
    root: CancellationToken,
}

impl SubscriptionRegistry {
    pub fn new(options: RegistryOptions, stats: Arc<DeliveryStatsTracker>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            options,
            stats,
            root: CancellationToken::new(),
        }
    }

    // cancel_all cancels every current and future worker without waiting
    // for them. Used when the owning client goes away without close().
    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    pub fn options(&self) -> RegistryOptions {
        self.options
    }

    pub fn stats(&self) -> &DeliveryStatsTracker {
        &self.stats
    }

    // ensure returns the delivery receiver for a topic, registering the
    // topic and starting its worker if it is not registered yet. The
    // check and the spawn happen under the write lock, so there is never
    // more than one worker per topic.
    pub async fn ensure(&self, topic: &str, connection: Arc<dyn Connection>) -> DeliveryReceiver {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(topic) {
            return existing.receiver.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.options.delivery_capacity);
        let receiver: DeliveryReceiver = Arc::new(Mutex::new(receiver));
        let cancel = self.root.child_token();

        let worker =
            SubscriptionWorker::new(self.clone(), topic, id, cancel.clone(), connection);
        let worker = tokio::spawn(worker.run());

        entries.insert(
            topic.to_string(),
            Subscription {
                id,
                sender,
                receiver: receiver.clone(),
                cancel,
                worker: Some(worker),
                handle: None,
                closed: false,
                torn_down: watch::Sender::new(false),
            },
        );
        debug!(topic = %topic, id, "Registered subscription");
        receiver
    }

    // unregister tears a topic's subscription down. Returns false if the
    // topic was not subscribed. Never fails: broker errors and slow
    // workers are logged and waited out with bounded timeouts. If a
    // teardown of the topic is already in flight, waits for that one.
    pub async fn unregister(&self, topic: &str) -> bool {
        let pending = {
            let mut entries = self.entries.write().await;
            match entries.get_mut(topic) {
                Some(entry) if entry.closed => Pending::InFlight(entry.torn_down.subscribe()),
                Some(entry) => Pending::Teardown(Self::begin_teardown(topic, entry)),
                None => return false,
            }
        };

        self.settle(topic, pending).await;
        true
    }

    // drain tears down every subscription, waiting on all of them
    // concurrently, including teardowns that were already in flight.
    // Returns the topics that were torn down.
    pub async fn drain(&self) -> Vec<String> {
        let pending: Vec<(String, Pending)> = {
            let mut entries = self.entries.write().await;
            entries
                .iter_mut()
                .map(|(topic, entry)| {
                    let pending = if entry.closed {
                        Pending::InFlight(entry.torn_down.subscribe())
                    } else {
                        Pending::Teardown(Self::begin_teardown(topic, entry))
                    };
                    (topic.clone(), pending)
                })
                .collect()
        };

        let topics = pending.iter().map(|(topic, _)| topic.clone()).collect();
        join_all(
            pending
                .into_iter()
                .map(|(topic, pending)| async move { self.settle(&topic, pending).await }),
        )
        .await;
        topics
    }

    async fn settle(&self, topic: &str, pending: Pending) {
        match pending {
            Pending::Teardown(teardown) => self.finish_teardown(teardown).await,
            Pending::InFlight(mut torn_down) => {
                let bound = self.options.unsubscribe_timeout + self.options.worker_wait_timeout;
                // wait_for errors once every sender is gone, which means
                // the entry is gone too.
                let finished = timeout(bound, torn_down.wait_for(|done| *done))
                    .await
                    .is_ok();
                if !finished {
                    warn!(
                        topic = %topic,
                        timeout = ?bound,
                        "Timed out waiting for in-flight teardown"
                    );
                }
            }
        }
    }

    pub async fn contains(&self, topic: &str) -> bool {
        self.entries.read().await.contains_key(topic)
    }

    pub async fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.entries.read().await.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    // begin_teardown runs under the write lock: it marks the entry
    // closed and takes what the rest of the teardown needs.
    fn begin_teardown(topic: &str, entry: &mut Subscription) -> Teardown {
        entry.closed = true;
        Teardown {
            topic: topic.to_string(),
            id: entry.id,
            cancel: entry.cancel.clone(),
            handle: entry.handle.take(),
            worker: entry.worker.take(),
            torn_down: entry.torn_down.clone(),
        }
    }

    // finish_teardown runs outside the lock: unsubscribe on the broker,
    // cancel and wait for the worker, then drop the entry, which closes
    // the delivery channel.
    async fn finish_teardown(&self, teardown: Teardown) {
        let Teardown {
            topic,
            id,
            cancel,
            handle,
            worker,
            torn_down,
        } = teardown;

        if let Some(handle) = handle {
            match timeout(self.options.unsubscribe_timeout, handle.unsubscribe()).await {
                Ok(Ok(())) => debug!(topic = %topic, "Unsubscribed from broker"),
                Ok(Err(e)) => warn!(topic = %topic, error = %e, "Broker unsubscribe failed"),
                Err(_) => warn!(
                    topic = %topic,
                    timeout = ?self.options.unsubscribe_timeout,
                    "Timed out waiting for broker unsubscribe"
                ),
            }
        }

        cancel.cancel();

        if let Some(worker) = worker {
            match timeout(self.options.worker_wait_timeout, worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(topic = %topic, error = %e, "Subscription worker failed"),
                Err(_) => warn!(
                    topic = %topic,
                    timeout = ?self.options.worker_wait_timeout,
                    "Subscription worker did not stop in time, continuing teardown"
                ),
            }
        }

        {
            let mut entries = self.entries.write().await;
            if entries.get(&topic).is_some_and(|entry| entry.id == id) {
                entries.remove(&topic);
            }
        }
        torn_down.send_replace(true);
        debug!(topic = %topic, id, "Subscription removed");
    }

    // attach_handle stores the worker's broker handle in its entry.
    // Returns false if the entry is gone, closed, or belongs to another
    // generation, in which case the worker must release the handle
    // itself.
    pub(crate) async fn attach_handle(
        &self,
        topic: &str,
        id: u64,
        handle: Arc<dyn SubscriptionHandle>,
    ) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(topic) {
            Some(entry) if entry.id == id && !entry.closed => {
                entry.handle = Some(handle);
                true
            }
            _ => false,
        }
    }

    // deliver offers a message to the topic's delivery channel without
    // ever waiting for room. Messages for closed or replaced entries
    // are discarded.
    pub(crate) async fn deliver(&self, topic: &str, id: u64, message: Message) {
        self.stats.increment_received();
        let entries = self.entries.read().await;
        let Some(entry) = entries
            .get(topic)
            .filter(|entry| entry.id == id && !entry.closed)
        else {
            self.stats.increment_discarded();
            return;
        };

        let message = match entry.sender.try_send(message) {
            Ok(()) => {
                self.stats.increment_enqueued();
                return;
            }
            Err(TrySendError::Closed(_)) => {
                self.stats.increment_discarded();
                return;
            }
            Err(TrySendError::Full(message)) => message,
        };

        if self.options.backpressure == BackpressurePolicy::DropOldest
            && let Ok(mut receiver) = entry.receiver.try_lock()
            && let Ok(evicted) = receiver.try_recv()
        {
            self.stats.increment_dropped(evicted.payload.len());
            debug!(topic = %topic, "Delivery channel full, evicted oldest message");
            match entry.sender.try_send(message) {
                Ok(()) => self.stats.increment_enqueued(),
                Err(e) => {
                    let dropped = e.into_inner();
                    self.stats.increment_dropped(dropped.payload.len());
                }
            }
            return;
        }

        self.stats.increment_dropped(message.payload.len());
        debug!(
            topic = %topic,
            capacity = self.options.delivery_capacity,
            "Delivery channel full, dropping message"
        );
    }

    // release removes a worker's own entry when the worker stops on its
    // own (broker feed ended, or the subscription could not be made), so
    // the next subscribe starts over. Entries being torn down are left
    // to the teardown.
    pub(crate) async fn release(&self, topic: &str, id: u64) {
        let mut entries = self.entries.write().await;
        if entries
            .get(topic)
            .is_some_and(|entry| entry.id == id && !entry.closed)
        {
            entries.remove(topic);
            debug!(topic = %topic, id, "Released subscription after worker stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn registry_with(options: RegistryOptions) -> SubscriptionRegistry {
        SubscriptionRegistry::new(options, Arc::new(DeliveryStatsTracker::new()))
    }

    // insert_stuck registers a topic whose worker never looks at its
    // cancellation token.
    async fn insert_stuck(registry: &SubscriptionRegistry, topic: &str) -> DeliveryReceiver {
        let (sender, receiver) = mpsc::channel(registry.options.delivery_capacity);
        let receiver: DeliveryReceiver = Arc::new(Mutex::new(receiver));
        let worker = tokio::spawn(std::future::pending::<()>());
        registry.entries.write().await.insert(
            topic.to_string(),
            Subscription {
                id: registry.next_id.fetch_add(1, Ordering::Relaxed),
                sender,
                receiver: receiver.clone(),
                cancel: CancellationToken::new(),
                worker: Some(worker),
                handle: None,
                closed: false,
                torn_down: watch::Sender::new(false),
            },
        );
        receiver
    }

    #[tokio::test]
    async fn test_unregister_unknown_topic() {
        let registry = registry_with(RegistryOptions::default());
        assert!(!registry.unregister("pets/goldfish").await);
    }

    #[tokio::test]
    async fn test_teardown_is_bounded_when_worker_ignores_cancel() {
        let registry = registry_with(RegistryOptions {
            worker_wait_timeout: Duration::from_millis(100),
            ..RegistryOptions::default()
        });
        let receiver = insert_stuck(&registry, "pets/stubborn-cat").await;

        let started = Instant::now();
        assert!(registry.unregister("pets/stubborn-cat").await);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!registry.contains("pets/stubborn-cat").await);

        // The entry is gone, so its delivery channel is closed.
        assert!(receiver.lock().await.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_unregister_waits_for_teardown_in_flight() {
        let registry = registry_with(RegistryOptions {
            worker_wait_timeout: Duration::from_millis(500),
            ..RegistryOptions::default()
        });
        insert_stuck(&registry, "pets/stubborn-cat").await;

        let first = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.unregister("pets/stubborn-cat").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        assert!(registry.unregister("pets/stubborn-cat").await);
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(!registry.contains("pets/stubborn-cat").await);
        assert!(first.await.unwrap());
    }

    #[tokio::test]
    async fn test_drain_waits_for_teardown_in_flight() {
        let registry = registry_with(RegistryOptions {
            worker_wait_timeout: Duration::from_millis(500),
            ..RegistryOptions::default()
        });
        insert_stuck(&registry, "pets/stubborn-cat").await;

        let first = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.unregister("pets/stubborn-cat").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(registry.drain().await, vec!["pets/stubborn-cat"]);
        assert!(registry.is_empty().await);
        assert!(first.await.unwrap());
    }

    #[tokio::test]
    async fn test_drain_waits_on_workers_concurrently() {
        let registry = registry_with(RegistryOptions {
            worker_wait_timeout: Duration::from_millis(200),
            ..RegistryOptions::default()
        });
        for topic in ["pets/cat", "pets/dog", "pets/hamster", "pets/parrot"] {
            insert_stuck(&registry, topic).await;
        }

        let started = Instant::now();
        let mut drained = registry.drain().await;
        drained.sort();
        assert_eq!(drained, vec!["pets/cat", "pets/dog", "pets/hamster", "pets/parrot"]);
        assert!(started.elapsed() < Duration::from_millis(800));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_deliver_drops_newest_when_full() {
        let registry = registry_with(RegistryOptions {
            delivery_capacity: 2,
            ..RegistryOptions::default()
        });
        let receiver = insert_stuck(&registry, "pets/cat").await;
        let id = registry.entries.read().await["pets/cat"].id;

        for payload in ["one", "two", "three"] {
            registry
                .deliver("pets/cat", id, Message::new("pets/cat", payload))
                .await;
        }

        let stats = registry.stats().to_stats();
        assert_eq!(stats.total_enqueued, 2);
        assert_eq!(stats.total_dropped, 1);
        assert_eq!(stats.total_bytes_dropped, 5);

        let mut receiver = receiver.lock().await;
        assert_eq!(receiver.recv().await.unwrap().payload, b"one");
        assert_eq!(receiver.recv().await.unwrap().payload, b"two");
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deliver_drops_oldest_when_configured() {
        let registry = registry_with(RegistryOptions {
            delivery_capacity: 2,
            backpressure: BackpressurePolicy::DropOldest,
            ..RegistryOptions::default()
        });
        let receiver = insert_stuck(&registry, "pets/dog").await;
        let id = registry.entries.read().await["pets/dog"].id;

        for payload in ["one", "two", "three"] {
            registry
                .deliver("pets/dog", id, Message::new("pets/dog", payload))
                .await;
        }

        let stats = registry.stats().to_stats();
        assert_eq!(stats.total_enqueued, 3);
        assert_eq!(stats.total_dropped, 1);

        let mut receiver = receiver.lock().await;
        assert_eq!(receiver.recv().await.unwrap().payload, b"two");
        assert_eq!(receiver.recv().await.unwrap().payload, b"three");
    }

    #[tokio::test]
    async fn test_deliver_discards_for_stale_generation() {
        let registry = registry_with(RegistryOptions::default());
        let receiver = insert_stuck(&registry, "pets/cat").await;
        let id = registry.entries.read().await["pets/cat"].id;

        registry
            .deliver("pets/cat", id + 1, Message::new("pets/cat", "meow"))
            .await;

        assert_eq!(registry.stats().to_stats().total_discarded, 1);
        assert!(receiver.lock().await.try_recv().is_err());
    }
}
