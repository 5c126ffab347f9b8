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

// src/client/core.rs
// PubSubClient is the facade applications use.
//
// It owns the three broker connections (swapped atomically on
// reconnect), the subscription registry, the reconnect coordinator and
// the query executor, and exposes publish/subscribe/unsubscribe/query
// plus health and shutdown. Clones share the same underlying client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::health::Health;
use crate::client::messages::Message;
use crate::config::PubSubConfig;
use crate::connection::ConnectionSet;
use crate::errors::PubSubClientError;
use crate::metrics::{
    Metrics, PUBLISH_DURATION_SECONDS, PUBLISH_SUCCESS_COUNT, PUBLISH_TOTAL_COUNT,
    SUBSCRIBE_SUCCESS_COUNT, SUBSCRIBE_TOTAL_COUNT,
};
use crate::query::QueryExecutor;
use crate::reconnect::ReconnectCoordinator;
use crate::stats::{DeliveryStats, DeliveryStatsTracker, PublishStats, PublishStatsTracker};
use crate::subscription::{RegistryOptions, SubscriptionRegistry};
use crate::transport::TransportFactory;

#[derive(Clone)]
pub struct PubSubClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: PubSubConfig,
    // address is the sanitized broker address, safe to log.
    address: String,
    factory: Arc<dyn TransportFactory>,
    metrics: Arc<dyn Metrics>,
    connections: Arc<ArcSwapOption<ConnectionSet>>,
    registry: SubscriptionRegistry,
    reconnect: Arc<ReconnectCoordinator>,
    query: QueryExecutor,
    publish_stats: Arc<PublishStatsTracker>,
    delivery_stats: Arc<DeliveryStatsTracker>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.registry.cancel_all();
    }
}

impl PubSubClient {
    // new validates the configuration and wires up the client. No
    // connection is made until connect().
    pub fn new(
        config: PubSubConfig,
        factory: Arc<dyn TransportFactory>,
        metrics: Arc<dyn Metrics>,
    ) -> Result<Self, PubSubClientError> {
        let config = config.validate()?;
        let address = config.sanitized_address();

        let delivery_stats = Arc::new(DeliveryStatsTracker::new());
        let registry = SubscriptionRegistry::new(
            RegistryOptions::from_config(&config),
            delivery_stats.clone(),
        );
        let connections = Arc::new(ArcSwapOption::empty());
        let shutdown = CancellationToken::new();
        let reconnect = Arc::new(ReconnectCoordinator::new(
            factory.clone(),
            config.clone(),
            connections.clone(),
            registry.clone(),
            shutdown.clone(),
        ));

        info!(
            address = %address,
            backend = factory.backend(),
            client_id = %config.client_id,
            "Created pub/sub client"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                query: QueryExecutor::new(&config),
                config,
                address,
                factory,
                metrics,
                connections,
                registry,
                reconnect,
                publish_stats: Arc::new(PublishStatsTracker::new()),
                delivery_stats,
                shutdown,
                closed: AtomicBool::new(false),
            }),
        })
    }

    // connect builds and probes the three connections. It never fails:
    // if the broker cannot be reached, recovery continues in the
    // background and operations report ClientNotConnected meanwhile.
    pub async fn connect(&self) {
        let inner = &self.inner;
        if self.is_closed() {
            warn!(address = %inner.address, "connect() called on a closed client");
            return;
        }

        match ConnectionSet::build(inner.factory.as_ref(), &inner.config).await {
            Ok(set) => {
                let probe = set.probe().await;
                inner.connections.store(Some(Arc::new(set)));
                match probe {
                    Ok(()) => info!(address = %inner.address, "Connected to broker"),
                    Err(e) => {
                        warn!(address = %inner.address, error = %e, "Broker liveness probe failed, reconnecting");
                        inner.reconnect.trigger();
                    }
                }
            }
            Err(e) => {
                warn!(address = %inner.address, error = %e, "Failed to connect to broker, reconnecting");
                inner.reconnect.trigger();
            }
        }
    }

    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(), PubSubClientError> {
        let inner = &self.inner;
        let labels = [("backend", inner.factory.backend())];
        inner.metrics.increment_counter(PUBLISH_TOTAL_COUNT, &labels);

        if topic.is_empty() {
            inner.publish_stats.increment_rejected();
            return Err(PubSubClientError::PublisherNotConfigured);
        }
        if self.is_closed() {
            inner.publish_stats.increment_rejected();
            return Err(PubSubClientError::ClientNotConnected);
        }
        let Some(publisher) = inner
            .connections
            .load_full()
            .and_then(|set| set.publisher())
        else {
            inner.publish_stats.increment_rejected();
            return Err(PubSubClientError::PublisherNotConfigured);
        };

        if let Err(e) = publisher.ping().await {
            warn!(topic = %topic, error = %e, "Publish connection is not live");
            inner.publish_stats.increment_failed();
            inner.reconnect.trigger();
            return Err(PubSubClientError::ClientNotConnected);
        }

        let payload = payload.into();
        let bytes = payload.len();
        let started = Instant::now();
        if let Err(e) = publisher.publish(topic, payload).await {
            warn!(topic = %topic, error = %e, "Publish failed");
            inner.publish_stats.increment_failed();
            if e.is_connection_error() {
                inner.reconnect.trigger();
            }
            return Err(e);
        }
        let elapsed = started.elapsed();

        inner.metrics.increment_counter(PUBLISH_SUCCESS_COUNT, &labels);
        inner
            .metrics
            .record_histogram(PUBLISH_DURATION_SECONDS, elapsed.as_secs_f64(), &labels);
        inner
            .publish_stats
            .increment_published(bytes, elapsed.as_micros() as u64);
        debug!(topic = %topic, bytes, "Published message");
        Ok(())
    }

    // subscribe waits for the next message on a topic, subscribing on
    // the broker first if needed. Returns Ok(None) when ctx is cancelled
    // or the subscription is torn down while waiting.
    pub async fn subscribe(
        &self,
        ctx: &CancellationToken,
        topic: &str,
    ) -> Result<Option<Message>, PubSubClientError> {
        let inner = &self.inner;
        if topic.is_empty() {
            return Err(PubSubClientError::EmptyTopicName);
        }
        let subscriber = inner
            .connections
            .load_full()
            .and_then(|set| set.subscriber());
        let Some(subscriber) = subscriber.filter(|_| !self.is_closed()) else {
            return Err(PubSubClientError::ClientNotConnected);
        };

        let labels = [("backend", inner.factory.backend())];
        inner.metrics.increment_counter(SUBSCRIBE_TOTAL_COUNT, &labels);

        if let Err(e) = subscriber.ping().await {
            warn!(topic = %topic, error = %e, "Subscribe connection is not live, reconnecting");
            inner.reconnect.trigger();
            tokio::select! {
                _ = ctx.cancelled() => {}
                _ = tokio::time::sleep(inner.config.retry_interval) => {}
            }
            return Err(PubSubClientError::ClientNotConnected);
        }

        let receiver = inner.registry.ensure(topic, subscriber).await;
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Ok(None),
            received = async { receiver.lock().await.recv().await } => match received {
                Some(message) => {
                    inner.delivery_stats.increment_consumed();
                    inner.metrics.increment_counter(SUBSCRIBE_SUCCESS_COUNT, &labels);
                    Ok(Some(message))
                }
                None => {
                    debug!(topic = %topic, "Delivery channel closed while waiting");
                    Ok(None)
                }
            },
        }
    }

    // unsubscribe tears down a topic's subscription. Unsubscribing from
    // a topic that is not subscribed succeeds.
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), PubSubClientError> {
        if topic.is_empty() {
            return Err(PubSubClientError::EmptyTopicName);
        }
        if self.inner.registry.unregister(topic).await {
            info!(topic = %topic, "Unsubscribed");
        } else {
            debug!(topic = %topic, "Unsubscribe for topic that is not subscribed");
        }
        Ok(())
    }

    pub async fn query(
        &self,
        ctx: &CancellationToken,
        topic: &str,
        timeout: Option<Duration>,
        limit: Option<usize>,
    ) -> Result<Vec<u8>, PubSubClientError> {
        let inner = &self.inner;
        if topic.is_empty() {
            return Err(PubSubClientError::EmptyTopicName);
        }
        if self.is_closed() {
            return Err(PubSubClientError::ClientNotConnected);
        }
        let connections = inner.connections.load_full();
        inner
            .query
            .execute(ctx, connections.as_deref(), topic, timeout, limit)
            .await
    }

    // health reports UP when the publish and subscribe connections both
    // answer a liveness probe. It never fails.
    pub async fn health(&self) -> Health {
        let inner = &self.inner;
        let backend = inner.factory.backend();
        if self.is_closed() {
            return Health::down(backend, &inner.address, "client is closed");
        }
        let Some(connections) = inner.connections.load_full() else {
            return Health::down(backend, &inner.address, "not connected");
        };
        match connections.probe().await {
            Ok(()) => Health::up(backend, &inner.address),
            Err(e) => Health::down(backend, &inner.address, e.to_string()),
        }
    }

    // close tears down every subscription and then closes the
    // connections. Calling it again is a no-op.
    pub async fn close(&self) -> Result<(), PubSubClientError> {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        inner.shutdown.cancel();

        let drained = inner.registry.drain().await;
        debug!(topics = ?drained, "Drained subscriptions on close");

        let result = match inner.connections.swap(None) {
            Some(set) => set.close().await,
            None => Ok(()),
        };
        info!(address = %inner.address, "Closed pub/sub client");
        result
    }

    // create_topic exists for API parity with brokers that need topics
    // declared. Pub/sub topics are implicit, so there is nothing to do.
    #[allow(clippy::unused_async)]
    pub async fn create_topic(&self, topic: &str) -> Result<(), PubSubClientError> {
        if topic.is_empty() {
            return Err(PubSubClientError::EmptyTopicName);
        }
        debug!(topic = %topic, "Topics are created implicitly, nothing to do");
        Ok(())
    }

    pub async fn delete_topic(&self, topic: &str) -> Result<(), PubSubClientError> {
        self.unsubscribe(topic).await
    }

    pub fn publish_stats(&self) -> PublishStats {
        self.inner.publish_stats.to_stats()
    }

    pub fn delivery_stats(&self) -> DeliveryStats {
        self.inner.delivery_stats.to_stats()
    }

    pub async fn subscribed_topics(&self) -> Vec<String> {
        self.inner.registry.topics().await
    }

    // is_connected is true when connections are in place and no
    // recovery is running. It does not probe the broker.
    pub fn is_connected(&self) -> bool {
        !self.is_closed()
            && !self.inner.reconnect.is_reconnecting()
            && self.inner.connections.load().is_some()
    }

    pub fn is_reconnecting(&self) -> bool {
        self.inner.reconnect.is_reconnecting()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &PubSubConfig {
        &self.inner.config
    }
}
