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

// src/errors.rs
// Error types for the topicwire client.
//
// Validation errors (empty topics, missing connections) are returned to
// the caller immediately. Transport errors are passed through from the
// underlying broker client. Teardown paths never surface errors; they
// log and move on.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PubSubClientError {
    // ClientNotConnected is returned when there is no usable
    // connection, or the liveness probe is currently failing.
    #[error("client is not connected to the broker")]
    ClientNotConnected,

    #[error("topic name must not be empty")]
    EmptyTopicName,

    // PublisherNotConfigured is returned by publish when there is no
    // publish connection, and also when the topic is empty.
    #[error("publisher is not configured")]
    PublisherNotConfigured,

    // PubSubConnectionFailed and PubSubChannelFailed cover failures
    // setting up a broker-side subscription.
    #[error("pub/sub connection failed: {0}")]
    PubSubConnectionFailed(String),

    #[error("pub/sub channel failed: {0}")]
    PubSubChannelFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load configuration: {0}")]
    ConfigLoadError(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MQTT client error: {0}")]
    MqttClientError(#[from] rumqttc::ClientError),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("connection is already closed")]
    AlreadyClosed,

    #[error("failed to close connections: {}", join_errors(.0))]
    CloseFailed(Vec<PubSubClientError>),
}

fn join_errors(errors: &[PubSubClientError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<figment::Error> for PubSubClientError {
    fn from(error: figment::Error) -> Self {
        Self::ConfigLoadError(error.to_string())
    }
}

impl From<toml::de::Error> for PubSubClientError {
    fn from(error: toml::de::Error) -> Self {
        Self::ConfigLoadError(error.to_string())
    }
}

impl PubSubClientError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::PubSubConnectionFailed(msg.into())
    }

    pub fn channel_failed(msg: impl Into<String>) -> Self {
        Self::PubSubChannelFailed(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn tls_error(msg: impl Into<String>) -> Self {
        Self::TlsError(msg.into())
    }

    pub fn transport_error(msg: impl Into<String>) -> Self {
        Self::TransportError(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    // is_connection_error is true for anything that means the broker
    // could not be reached or stopped answering. These are the errors
    // that kick off a reconnect.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ClientNotConnected
                | Self::PubSubConnectionFailed(_)
                | Self::MqttClientError(_)
                | Self::TransportError(_)
                | Self::Timeout(_)
        )
    }

    // is_validation_error is true for caller mistakes that are never
    // retried internally.
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Self::EmptyTopicName | Self::PublisherNotConfigured)
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_) | Self::ConfigLoadError(_) | Self::TlsError(_)
        )
    }

    pub fn is_already_closed(&self) -> bool {
        matches!(self, Self::AlreadyClosed)
    }
}
