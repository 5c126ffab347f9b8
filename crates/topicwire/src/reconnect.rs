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

// src/reconnect.rs
// ReconnectCoordinator rebuilds the client's connections after a
// connectivity failure.
//
// Recovery is one-shot and single-flight: triggering it while a recovery
// is already running does nothing. Once new connections pass their
// liveness probe they are swapped in and every subscription is torn
// down, since broker-side subscriptions do not survive the old
// connections. Subscriptions are not replayed; callers re-subscribe.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PubSubConfig;
use crate::connection::ConnectionSet;
use crate::subscription::SubscriptionRegistry;
use crate::transport::TransportFactory;

pub struct ReconnectCoordinator {
    factory: Arc<dyn TransportFactory>,
    config: PubSubConfig,
    connections: Arc<ArcSwapOption<ConnectionSet>>,
    registry: SubscriptionRegistry,
    shutdown: CancellationToken,
    in_flight: AtomicBool,
    attempts: AtomicU64,
    recoveries: AtomicU64,
}

impl ReconnectCoordinator {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        config: PubSubConfig,
        connections: Arc<ArcSwapOption<ConnectionSet>>,
        registry: SubscriptionRegistry,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            factory,
            config,
            connections,
            registry,
            shutdown,
            in_flight: AtomicBool::new(false),
            attempts: AtomicU64::new(0),
            recoveries: AtomicU64::new(0),
        }
    }

    // trigger starts a recovery task unless one is already running or
    // the client is shutting down. Returns true if a task was started.
    pub fn trigger(self: &Arc<Self>) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Reconnect already in progress");
            return false;
        }

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.recover().await;
            coordinator.in_flight.store(false, Ordering::Release);
        });
        true
    }

    pub fn is_reconnecting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    // attempts is the number of failed recovery attempts so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn recoveries(&self) -> u64 {
        self.recoveries.load(Ordering::Relaxed)
    }

    async fn recover(&self) {
        let address = self.config.sanitized_address();
        info!(address = %address, interval = ?self.config.retry_interval, "Starting reconnect");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Client closed, abandoning reconnect");
                    return;
                }
                _ = tokio::time::sleep(self.config.retry_interval) => {}
            }

            let rebuilt = match self.connections.load_full() {
                Some(current) => current.recreate(self.factory.as_ref(), &self.config).await,
                None => ConnectionSet::build(self.factory.as_ref(), &self.config).await,
            };
            let candidate = match rebuilt {
                Ok(candidate) => candidate,
                Err(e) => {
                    let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(address = %address, attempt, error = %e, "Reconnect attempt failed");
                    continue;
                }
            };
            if let Err(e) = candidate.probe().await {
                let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(address = %address, attempt, error = %e, "Reconnected but liveness probe failed");
                if let Err(e) = candidate.close().await {
                    debug!(error = %e, "Error closing rejected connections");
                }
                continue;
            }

            self.connections.store(Some(Arc::new(candidate)));

            // close() may have run while the candidate was being built.
            if self.shutdown.is_cancelled() {
                if let Some(set) = self.connections.swap(None)
                    && let Err(e) = set.close().await
                {
                    debug!(error = %e, "Error closing connections after shutdown");
                }
                return;
            }

            self.recoveries.fetch_add(1, Ordering::Relaxed);
            info!(address = %address, "Reconnected to broker");

            let cleared = self.registry.drain().await;
            if !cleared.is_empty() {
                warn!(
                    topics = ?cleared,
                    "Subscriptions cleared after reconnect, callers must subscribe again"
                );
            }
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::stats::DeliveryStatsTracker;
    use crate::subscription::RegistryOptions;
    use crate::transport::memory::MemoryBroker;

    fn coordinator(broker: &MemoryBroker, shutdown: CancellationToken) -> Arc<ReconnectCoordinator> {
        let config =
            PubSubConfig::default().with_retry_interval(Duration::from_millis(20));
        Arc::new(ReconnectCoordinator::new(
            Arc::new(broker.factory()),
            config,
            Arc::new(ArcSwapOption::empty()),
            SubscriptionRegistry::new(
                RegistryOptions::default(),
                Arc::new(DeliveryStatsTracker::new()),
            ),
            shutdown,
        ))
    }

    async fn wait_idle(coordinator: &ReconnectCoordinator) {
        for _ in 0..200 {
            if !coordinator.is_reconnecting() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("reconnect did not finish");
    }

    #[tokio::test]
    async fn test_trigger_is_single_flight() {
        let broker = MemoryBroker::new();
        let coordinator = coordinator(&broker, CancellationToken::new());

        assert!(coordinator.trigger());
        assert!(!coordinator.trigger());
        wait_idle(&coordinator).await;

        assert_eq!(coordinator.recoveries(), 1);
        assert!(coordinator.connections.load().is_some());
        // One set of three connections.
        assert_eq!(broker.builds(), 3);
    }

    #[tokio::test]
    async fn test_retries_until_broker_returns() {
        let broker = MemoryBroker::new();
        broker.fail_next_builds(2);
        let coordinator = coordinator(&broker, CancellationToken::new());

        assert!(coordinator.trigger());
        wait_idle(&coordinator).await;

        assert_eq!(coordinator.attempts(), 2);
        assert_eq!(coordinator.recoveries(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_recovery() {
        let broker = MemoryBroker::new();
        broker.set_available(false);
        let shutdown = CancellationToken::new();
        let coordinator = coordinator(&broker, shutdown.clone());

        assert!(coordinator.trigger());
        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown.cancel();
        wait_idle(&coordinator).await;

        assert_eq!(coordinator.recoveries(), 0);
        assert!(coordinator.connections.load().is_none());
        assert!(!coordinator.trigger());
    }
}
