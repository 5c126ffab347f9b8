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

// src/subscription/worker.rs
// SubscriptionWorker owns the broker-side subscription for one topic.
//
// It subscribes on the subscribe connection, hands its broker handle to
// the registry, then forwards every message from the broker feed into
// the topic's delivery channel until it is cancelled or the feed ends.

use std::sync::Arc;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Message;
use crate::subscription::registry::SubscriptionRegistry;
use crate::transport::{BrokerSubscription, Connection};

pub struct SubscriptionWorker {
    registry: SubscriptionRegistry,
    topic: String,
    id: u64,
    cancel: CancellationToken,
    connection: Arc<dyn Connection>,
}

impl SubscriptionWorker {
    pub fn new(
        registry: SubscriptionRegistry,
        topic: &str,
        id: u64,
        cancel: CancellationToken,
        connection: Arc<dyn Connection>,
    ) -> Self {
        Self {
            registry,
            topic: topic.to_string(),
            id,
            cancel,
            connection,
        }
    }

    pub async fn run(self) {
        let subscribed = tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!(topic = %self.topic, "Subscription cancelled before broker subscribe completed");
                return;
            }
            subscribed = self.connection.subscribe(&self.topic) => subscribed,
        };

        let BrokerSubscription { mut feed, handle } = match subscribed {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(topic = %self.topic, error = %e, "Failed to subscribe on broker");
                self.registry.stats().increment_subscribe_failures();
                self.registry.release(&self.topic, self.id).await;
                return;
            }
        };

        if !self
            .registry
            .attach_handle(&self.topic, self.id, handle.clone())
            .await
        {
            // Torn down while the subscribe was in flight; nobody else
            // holds this handle.
            let unsubscribe_timeout = self.registry.options().unsubscribe_timeout;
            match timeout(unsubscribe_timeout, handle.unsubscribe()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(
                    topic = %self.topic,
                    error = %e,
                    "Unsubscribe after late subscribe failed"
                ),
                Err(_) => warn!(
                    topic = %self.topic,
                    timeout = ?unsubscribe_timeout,
                    "Timed out unsubscribing after late subscribe"
                ),
            }
            return;
        }
        info!(topic = %self.topic, "Subscribed on broker");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(topic = %self.topic, "Subscription worker cancelled");
                    return;
                }
                received = feed.recv() => match received {
                    Some(message) => {
                        self.registry
                            .deliver(&self.topic, self.id, Message::from(message))
                            .await;
                    }
                    None => {
                        warn!(topic = %self.topic, "Broker feed closed");
                        self.registry.stats().increment_feed_closures();
                        self.registry.release(&self.topic, self.id).await;
                        return;
                    }
                },
            }
        }
    }
}
