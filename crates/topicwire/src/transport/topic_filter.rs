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

// src/transport/topic_filter.rs
// Topic filter matching for routing broker messages to subscriptions.
//
// Filters use MQTT-style wildcards: '+' matches exactly one level and '#'
// matches any number of trailing levels (including none). A filter with
// no wildcards only matches the identical topic.

use std::fmt;

use crate::errors::PubSubClientError;

const LEVEL_SEPARATOR: char = '/';
const SINGLE_LEVEL: &str = "+";
const MULTI_LEVEL: &str = "#";

// TopicFilter is a parsed, validated subscription filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    filter: String,
}

impl TopicFilter {
    // new validates the filter: it must be non-empty, and '#' may only
    // appear as the entire last level.
    pub fn new(filter: impl Into<String>) -> Result<Self, PubSubClientError> {
        let filter = filter.into();
        if filter.is_empty() {
            return Err(PubSubClientError::EmptyTopicName);
        }

        let levels: Vec<&str> = filter.split(LEVEL_SEPARATOR).collect();
        for (index, level) in levels.iter().enumerate() {
            let is_last = index == levels.len() - 1;
            if level.contains('#') && (!is_last || *level != MULTI_LEVEL) {
                return Err(PubSubClientError::channel_failed(format!(
                    "invalid filter '{filter}': '#' must be the whole last level"
                )));
            }
            if level.contains('+') && *level != SINGLE_LEVEL {
                return Err(PubSubClientError::channel_failed(format!(
                    "invalid filter '{filter}': '+' must be a whole level"
                )));
            }
        }

        Ok(Self { filter })
    }

    pub fn as_str(&self) -> &str {
        &self.filter
    }

    pub fn is_wildcard(&self) -> bool {
        self.filter.contains(['+', '#'])
    }

    // matches checks a concrete topic against this filter.
    pub fn matches(&self, topic: &str) -> bool {
        if !self.is_wildcard() {
            return self.filter == topic;
        }

        let mut filter_levels = self.filter.split(LEVEL_SEPARATOR);
        let mut topic_levels = topic.split(LEVEL_SEPARATOR);
        loop {
            match (filter_levels.next(), topic_levels.next()) {
                (Some(MULTI_LEVEL), _) => return true,
                (Some(SINGLE_LEVEL), Some(_)) => continue,
                (Some(expected), Some(actual)) if expected == actual => continue,
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.filter)
    }
}
