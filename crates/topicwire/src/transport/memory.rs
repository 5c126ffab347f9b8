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

// src/transport/memory.rs
// In-process broker transport.
//
// `MemoryBroker` fans published messages out to every matching
// subscription, with no persistence: a message published while nobody is
// subscribed is gone. It is useful for embedding the client in a single
// process, and it exposes a few switches (availability, stalled
// unsubscribes, failing builds) to exercise the client's failure paths.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::config::PubSubConfig;
use crate::errors::PubSubClientError;
use crate::transport::topic_filter::TopicFilter;
use crate::transport::{
    BrokerMessage, BrokerSubscription, Connection, ConnectionRole, FEED_CAPACITY,
    SubscriptionHandle, TransportFactory,
};

pub const BACKEND_NAME: &str = "MEMORY";

struct MemoryRoute {
    filter: TopicFilter,
    sender: mpsc::Sender<BrokerMessage>,
}

#[derive(Default)]
struct BrokerState {
    routes: Mutex<HashMap<u64, MemoryRoute>>,
    next_route_id: AtomicU64,
    unavailable: AtomicBool,
    stall_unsubscribe: AtomicBool,
    stall_subscribe: AtomicBool,
    failing_builds: AtomicUsize,
    builds: AtomicUsize,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
    published: AtomicUsize,
}

// Shared in-process broker. Clones refer to the same broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    // A factory whose connections all talk to this broker.
    pub fn factory(&self) -> MemoryTransportFactory {
        MemoryTransportFactory {
            broker: self.clone(),
        }
    }

    // Publishes directly on the broker, as another client would.
    // Returns how many subscriptions the message was handed to.
    pub async fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> usize {
        let message = BrokerMessage {
            topic: topic.to_string(),
            payload: payload.into(),
        };
        self.state.published.fetch_add(1, Ordering::Relaxed);

        let mut routes = self.state.routes.lock().await;
        let mut delivered = 0;
        routes.retain(|_, route| {
            if !route.filter.matches(topic) {
                return true;
            }
            match route.sender.try_send(message.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(topic = %topic, "Memory broker feed full, dropping message");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
        delivered
    }

    // While unavailable, pings, publishes and subscribes fail.
    pub fn set_available(&self, available: bool) {
        self.state.unavailable.store(!available, Ordering::Release);
    }

    pub fn is_available(&self) -> bool {
        !self.state.unavailable.load(Ordering::Acquire)
    }

    // While stalled, broker-side unsubscribes never complete.
    pub fn set_unsubscribe_stalled(&self, stalled: bool) {
        self.state.stall_unsubscribe.store(stalled, Ordering::Release);
    }

    // While stalled, broker-side subscribes never complete.
    pub fn set_subscribe_stalled(&self, stalled: bool) {
        self.state.stall_subscribe.store(stalled, Ordering::Release);
    }

    // Makes the next `count` connection builds fail.
    pub fn fail_next_builds(&self, count: usize) {
        self.state.failing_builds.store(count, Ordering::Release);
    }

    // Ends every subscription feed, as if the broker dropped them.
    pub async fn disconnect_subscribers(&self) {
        self.state.routes.lock().await.clear();
    }

    pub async fn active_subscriptions(&self, topic: &str) -> usize {
        self.state
            .routes
            .lock()
            .await
            .values()
            .filter(|route| route.filter.as_str() == topic && !route.sender.is_closed())
            .count()
    }

    pub fn builds(&self) -> usize {
        self.state.builds.load(Ordering::Relaxed)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.state.subscribe_calls.load(Ordering::Relaxed)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.state.unsubscribe_calls.load(Ordering::Relaxed)
    }

    pub fn published(&self) -> usize {
        self.state.published.load(Ordering::Relaxed)
    }

    fn ensure_available(&self) -> Result<(), PubSubClientError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(PubSubClientError::transport_error("memory broker unavailable"))
        }
    }

    // take_failing_build consumes one pending build failure, if any.
    fn take_failing_build(&self) -> bool {
        self.state
            .failing_builds
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

#[derive(Clone)]
pub struct MemoryTransportFactory {
    broker: MemoryBroker,
}

impl MemoryTransportFactory {
    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }
}

#[async_trait]
impl TransportFactory for MemoryTransportFactory {
    fn backend(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn build(
        &self,
        _config: &PubSubConfig,
        role: ConnectionRole,
    ) -> Result<Arc<dyn Connection>, PubSubClientError> {
        self.broker.state.builds.fetch_add(1, Ordering::Relaxed);
        if self.broker.take_failing_build() {
            return Err(PubSubClientError::connection_failed(format!(
                "memory broker refused {role} connection"
            )));
        }
        Ok(Arc::new(MemoryConnection {
            role,
            broker: self.broker.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemoryConnection {
    role: ConnectionRole,
    broker: MemoryBroker,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn ensure_usable(&self) -> Result<(), PubSubClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PubSubClientError::AlreadyClosed);
        }
        self.broker.ensure_available()
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn role(&self) -> ConnectionRole {
        self.role
    }

    async fn ping(&self) -> Result<(), PubSubClientError> {
        self.ensure_usable()
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PubSubClientError> {
        self.ensure_usable()?;
        let delivered = self.broker.publish(topic, payload).await;
        debug!(topic = %topic, delivered, "Published to memory broker");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BrokerSubscription, PubSubClientError> {
        self.ensure_usable()?;
        let filter = TopicFilter::new(topic)?;
        let state = &self.broker.state;
        state.subscribe_calls.fetch_add(1, Ordering::Relaxed);
        if state.stall_subscribe.load(Ordering::Acquire) {
            std::future::pending::<()>().await;
        }

        let (sender, feed) = mpsc::channel(FEED_CAPACITY);
        let id = state.next_route_id.fetch_add(1, Ordering::Relaxed);
        state
            .routes
            .lock()
            .await
            .insert(id, MemoryRoute { filter, sender });

        Ok(BrokerSubscription {
            feed,
            handle: Arc::new(MemorySubscriptionHandle {
                id,
                broker: self.broker.clone(),
            }),
        })
    }

    async fn close(&self) -> Result<(), PubSubClientError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(PubSubClientError::AlreadyClosed);
        }
        Ok(())
    }
}

struct MemorySubscriptionHandle {
    id: u64,
    broker: MemoryBroker,
}

#[async_trait]
impl SubscriptionHandle for MemorySubscriptionHandle {
    async fn unsubscribe(&self) -> Result<(), PubSubClientError> {
        let state = &self.broker.state;
        state.unsubscribe_calls.fetch_add(1, Ordering::Relaxed);
        if state.stall_unsubscribe.load(Ordering::Acquire) {
            std::future::pending::<()>().await;
        }
        state.routes.lock().await.remove(&self.id);
        Ok(())
    }
}
