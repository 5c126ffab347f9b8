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

// src/lib.rs
// Main exports for the topicwire pub/sub client library.

pub mod client;
pub mod config;
pub mod connection;
pub mod errors;
pub mod metrics;
pub mod query;
pub mod reconnect;
pub mod stats;
pub mod subscription;
pub mod transport;

// Export some things for convenience.
pub use client::{Committer, Health, HealthStatus, Message, PubSubClient};
pub use config::{BackpressurePolicy, PubSubConfig, TlsOptions};
pub use errors::PubSubClientError;
pub use metrics::{Metrics, NoopMetrics, RecorderMetrics};
pub use stats::{DeliveryStats, PublishStats};
pub use tokio_util::sync::CancellationToken;
pub use transport::memory::{MemoryBroker, MemoryTransportFactory};
pub use transport::mqtt::MqttTransportFactory;
pub use transport::{ConnectionRole, TransportFactory};
