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

// src/transport/mod.rs
// Broker transport capabilities consumed by the client core.
//
// The core never speaks a wire protocol itself. It asks a
// `TransportFactory` for one `Connection` per `ConnectionRole`,
// and everything it does afterwards goes through those trait objects:
// liveness pings, publishes, and broker-side subscriptions that hand back
// a message feed plus a `SubscriptionHandle` used to cancel them.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::PubSubConfig;
use crate::errors::PubSubClientError;

pub mod memory;
pub mod mqtt;
pub mod tls;
pub mod topic_filter;

// Capacity of the feed between a transport and the worker consuming it.
pub const FEED_CAPACITY: usize = 1024;

// Which of the three client connections a transport connection serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionRole {
    Publish,
    Subscribe,
    Query,
}

impl ConnectionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Subscribe => "subscribe",
            Self::Query => "query",
        }
    }
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// A message as received from the broker.
#[derive(Clone, Debug, PartialEq)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

// A live broker-side subscription. The feed closes when the broker side
// goes away; the handle cancels the subscription.
pub struct BrokerSubscription {
    pub feed: mpsc::Receiver<BrokerMessage>,
    pub handle: Arc<dyn SubscriptionHandle>,
}

#[async_trait]
pub trait SubscriptionHandle: Send + Sync + 'static {
    async fn unsubscribe(&self) -> Result<(), PubSubClientError>;
}

// One physical connection to the broker.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    fn role(&self) -> ConnectionRole;

    // Succeeds if the connection is currently usable.
    async fn ping(&self) -> Result<(), PubSubClientError>;

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PubSubClientError>;

    async fn subscribe(&self, topic: &str) -> Result<BrokerSubscription, PubSubClientError>;

    // Closes the connection. Returns `PubSubClientError::AlreadyClosed`
    // if it was closed before.
    async fn close(&self) -> Result<(), PubSubClientError>;
}

// Builds connections from validated configuration.
#[async_trait]
pub trait TransportFactory: Send + Sync + 'static {
    // Short backend name reported by health checks, e.g. "MQTT".
    fn backend(&self) -> &'static str;

    async fn build(
        &self,
        config: &PubSubConfig,
        role: ConnectionRole,
    ) -> Result<Arc<dyn Connection>, PubSubClientError>;
}
