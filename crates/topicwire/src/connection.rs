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

// src/connection.rs
// ConnectionSet holds the client's three broker connections.
//
// Publish, subscribe and query traffic each get a physically separate
// connection built from the same options, so a blocked subscription on
// one never starves the others. Publish and subscribe are required; the
// query connection is best-effort and query traffic falls back to the
// subscribe connection without it.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::PubSubConfig;
use crate::errors::PubSubClientError;
use crate::transport::{Connection, ConnectionRole, TransportFactory};

pub struct ConnectionSet {
    publish: Option<Arc<dyn Connection>>,
    subscribe: Option<Arc<dyn Connection>>,
    query: Option<Arc<dyn Connection>>,
}

impl ConnectionSet {
    // build creates all three connections. A failure on publish or
    // subscribe fails the whole set (closing whatever was already built);
    // a failure on query is logged and leaves it empty.
    pub async fn build(
        factory: &dyn TransportFactory,
        config: &PubSubConfig,
    ) -> Result<Self, PubSubClientError> {
        let publish = factory.build(config, ConnectionRole::Publish).await?;
        let subscribe = match factory.build(config, ConnectionRole::Subscribe).await {
            Ok(subscribe) => subscribe,
            Err(e) => {
                close_quietly(publish.as_ref()).await;
                return Err(e);
            }
        };
        let query = match factory.build(config, ConnectionRole::Query).await {
            Ok(query) => Some(query),
            Err(e) => {
                warn!(error = %e, "Failed to build query connection, falling back to subscribe connection");
                None
            }
        };

        Ok(Self {
            publish: Some(publish),
            subscribe: Some(subscribe),
            query,
        })
    }

    // empty is a set with no connections, used before connect() has
    // succeeded.
    pub fn empty() -> Self {
        Self {
            publish: None,
            subscribe: None,
            query: None,
        }
    }

    pub fn from_parts(
        publish: Option<Arc<dyn Connection>>,
        subscribe: Option<Arc<dyn Connection>>,
        query: Option<Arc<dyn Connection>>,
    ) -> Self {
        Self {
            publish,
            subscribe,
            query,
        }
    }

    pub fn publisher(&self) -> Option<Arc<dyn Connection>> {
        self.publish.clone()
    }

    pub fn subscriber(&self) -> Option<Arc<dyn Connection>> {
        self.subscribe.clone()
    }

    // querier returns the query connection, or the subscribe connection
    // if there is no query connection.
    pub fn querier(&self) -> Option<Arc<dyn Connection>> {
        self.query.clone().or_else(|| self.subscribe.clone())
    }

    pub fn has_query_connection(&self) -> bool {
        self.query.is_some()
    }

    // probe pings the publish and subscribe connections, which must both
    // be present and live. The query connection is pinged too, but only
    // a warning comes of it failing.
    pub async fn probe(&self) -> Result<(), PubSubClientError> {
        let (Some(publish), Some(subscribe)) = (&self.publish, &self.subscribe) else {
            return Err(PubSubClientError::ClientNotConnected);
        };

        let (publish_ping, subscribe_ping) = tokio::join!(publish.ping(), subscribe.ping());
        publish_ping?;
        subscribe_ping?;

        if let Some(query) = &self.query
            && let Err(e) = query.ping().await
        {
            warn!(error = %e, "Query connection ping failed");
        }
        Ok(())
    }

    // recreate closes every connection in this set (logging any errors)
    // and builds a fresh set from the same factory and config.
    pub async fn recreate(
        &self,
        factory: &dyn TransportFactory,
        config: &PubSubConfig,
    ) -> Result<Self, PubSubClientError> {
        for connection in self.connections() {
            close_quietly(connection.as_ref()).await;
        }
        Self::build(factory, config).await
    }

    // close closes all three connections. "Already closed" is not an
    // error here; anything else is collected and returned together.
    pub async fn close(&self) -> Result<(), PubSubClientError> {
        let mut errors = Vec::new();
        for connection in self.connections() {
            match connection.close().await {
                Ok(()) => debug!(role = %connection.role(), "Closed connection"),
                Err(e) if e.is_already_closed() => {}
                Err(e) => {
                    warn!(role = %connection.role(), error = %e, "Failed to close connection");
                    errors.push(e);
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PubSubClientError::CloseFailed(errors))
        }
    }

    fn connections(&self) -> impl Iterator<Item = &Arc<dyn Connection>> {
        [&self.publish, &self.subscribe, &self.query]
            .into_iter()
            .flatten()
    }
}

async fn close_quietly(connection: &dyn Connection) {
    if let Err(e) = connection.close().await
        && !e.is_already_closed()
    {
        debug!(role = %connection.role(), error = %e, "Error closing connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryBroker;

    #[tokio::test]
    async fn test_build_and_probe() {
        let broker = MemoryBroker::new();
        let set = ConnectionSet::build(&broker.factory(), &PubSubConfig::default())
            .await
            .unwrap();

        assert!(set.has_query_connection());
        assert!(set.probe().await.is_ok());
        assert_eq!(broker.builds(), 3);
    }

    #[tokio::test]
    async fn test_query_falls_back_to_subscribe() {
        let broker = MemoryBroker::new();
        let factory = broker.factory();
        let config = PubSubConfig::default();
        let publish = factory.build(&config, ConnectionRole::Publish).await.unwrap();
        let subscribe = factory
            .build(&config, ConnectionRole::Subscribe)
            .await
            .unwrap();
        let set = ConnectionSet::from_parts(Some(publish), Some(subscribe), None);

        let querier = set.querier().unwrap();
        assert_eq!(querier.role(), ConnectionRole::Subscribe);
        assert!(set.probe().await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_set_is_not_connected() {
        let set = ConnectionSet::empty();
        assert!(matches!(
            set.probe().await,
            Err(PubSubClientError::ClientNotConnected)
        ));
        assert!(set.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_close_twice_is_not_an_error() {
        let broker = MemoryBroker::new();
        let set = ConnectionSet::build(&broker.factory(), &PubSubConfig::default())
            .await
            .unwrap();

        assert!(set.close().await.is_ok());
        assert!(set.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_recreate_builds_a_fresh_set() {
        let broker = MemoryBroker::new();
        let factory = broker.factory();
        let config = PubSubConfig::default();
        let set = ConnectionSet::build(&factory, &config).await.unwrap();

        let fresh = set.recreate(&factory, &config).await.unwrap();
        assert!(fresh.probe().await.is_ok());
        // The old set was closed by recreate.
        assert!(set.probe().await.is_err());
        assert_eq!(broker.builds(), 6);
    }
}
