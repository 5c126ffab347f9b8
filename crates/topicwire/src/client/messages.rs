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

// src/client/messages.rs
// Message envelope handed to subscribe callers.
//
// Message carries the topic and raw payload from the broker, plus a
// Committer. Brokers without delivery acknowledgement get the
// NoopCommitter, where commit is advisory and only logged.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::transport::BrokerMessage;

// Committer acknowledges a delivered message back to the broker.
pub trait Committer: Send + Sync {
    fn commit(&self, topic: &str);
}

// NoopCommitter is used for brokers with no acknowledgement concept.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCommitter;

impl Committer for NoopCommitter {
    fn commit(&self, topic: &str) {
        debug!(topic = %topic, "Commit requested, broker has no acknowledgement");
    }
}

#[derive(Clone)]
pub struct Message {
    // topic is the concrete topic the message was published on, which
    // differs from the subscribed topic for wildcard subscriptions.
    pub topic: String,
    pub payload: Vec<u8>,
    committer: Arc<dyn Committer>,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            committer: Arc::new(NoopCommitter),
        }
    }

    pub fn with_committer(mut self, committer: Arc<dyn Committer>) -> Self {
        self.committer = committer;
        self
    }

    pub fn commit(&self) {
        self.committer.commit(&self.topic);
    }

    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

impl From<BrokerMessage> for Message {
    fn from(message: BrokerMessage) -> Self {
        Self::new(message.topic, message.payload)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("topic", &self.topic)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.topic == other.topic && self.payload == other.payload
    }
}
