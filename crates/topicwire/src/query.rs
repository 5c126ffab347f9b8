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

// src/query.rs
// QueryExecutor runs one-shot reads against a topic.
//
// A query opens its own broker subscription (on the query connection,
// or the subscribe connection when there is none), collects payloads
// until it has enough or runs out of time, and always cancels the
// subscription before returning. It never touches the subscription
// registry.

use std::time::Duration;

use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::PubSubConfig;
use crate::connection::ConnectionSet;
use crate::errors::PubSubClientError;
use crate::transport::BrokerSubscription;

#[derive(Clone, Copy, Debug)]
pub struct QueryExecutor {
    default_timeout: Duration,
    default_limit: usize,
    unsubscribe_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(config: &PubSubConfig) -> Self {
        Self {
            default_timeout: config.query_timeout,
            default_limit: config.query_limit,
            unsubscribe_timeout: config.unsubscribe_timeout,
        }
    }

    // resolve applies the defaults to unset or zero arguments.
    pub fn resolve(&self, timeout: Option<Duration>, limit: Option<usize>) -> (Duration, usize) {
        let timeout = timeout
            .filter(|t| !t.is_zero())
            .unwrap_or(self.default_timeout);
        let limit = limit.filter(|l| *l > 0).unwrap_or(self.default_limit.max(1));
        (timeout, limit)
    }

    // execute returns the collected payloads joined by newlines. Running
    // out of time, cancellation, and the feed closing all end the query
    // early with whatever was collected so far.
    pub async fn execute(
        &self,
        ctx: &CancellationToken,
        connections: Option<&ConnectionSet>,
        topic: &str,
        timeout_override: Option<Duration>,
        limit: Option<usize>,
    ) -> Result<Vec<u8>, PubSubClientError> {
        if topic.is_empty() {
            return Err(PubSubClientError::EmptyTopicName);
        }
        let connection = connections
            .and_then(ConnectionSet::querier)
            .ok_or(PubSubClientError::ClientNotConnected)?;
        let (query_timeout, limit) = self.resolve(timeout_override, limit);
        let deadline = Instant::now() + query_timeout;

        // The broker subscribe counts against the query's own deadline.
        let subscribed = tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                debug!(topic = %topic, "Query cancelled before subscribe completed");
                return Ok(Vec::new());
            }
            _ = sleep_until(deadline) => {
                debug!(topic = %topic, timeout = ?query_timeout, "Query subscribe timed out");
                return Ok(Vec::new());
            }
            subscribed = connection.subscribe(topic) => subscribed,
        };
        let BrokerSubscription { mut feed, handle } = subscribed.map_err(|e| {
            if e.is_validation_error() {
                e
            } else {
                PubSubClientError::channel_failed(format!("query on {topic}: {e}"))
            }
        })?;
        debug!(
            topic = %topic,
            role = %connection.role(),
            limit,
            timeout = ?query_timeout,
            "Query started"
        );

        let mut payloads: Vec<Vec<u8>> = Vec::with_capacity(limit);
        while payloads.len() < limit {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    debug!(topic = %topic, "Query cancelled");
                    break;
                }
                _ = sleep_until(deadline) => {
                    debug!(topic = %topic, collected = payloads.len(), "Query timed out");
                    break;
                }
                received = feed.recv() => match received {
                    Some(message) => payloads.push(message.payload),
                    None => {
                        debug!(topic = %topic, "Query feed closed");
                        break;
                    }
                },
            }
        }

        match timeout(self.unsubscribe_timeout, handle.unsubscribe()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(topic = %topic, error = %e, "Query unsubscribe failed"),
            Err(_) => warn!(topic = %topic, "Timed out waiting for query unsubscribe"),
        }

        Ok(payloads.join(&b'\n'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults() {
        let executor = QueryExecutor::new(&PubSubConfig::default());

        assert_eq!(executor.resolve(None, None), (Duration::from_secs(30), 10));
        assert_eq!(
            executor.resolve(Some(Duration::ZERO), Some(0)),
            (Duration::from_secs(30), 10)
        );
        assert_eq!(
            executor.resolve(Some(Duration::from_millis(250)), Some(3)),
            (Duration::from_millis(250), 3)
        );
    }

    #[tokio::test]
    async fn test_query_without_connections() {
        let executor = QueryExecutor::new(&PubSubConfig::default());
        let ctx = CancellationToken::new();

        let result = executor.execute(&ctx, None, "pets/cats", None, None).await;
        assert!(matches!(result, Err(PubSubClientError::ClientNotConnected)));

        let result = executor.execute(&ctx, None, "", None, None).await;
        assert!(matches!(result, Err(PubSubClientError::EmptyTopicName)));
    }
}
