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

// src/client/health.rs
// Health report returned by PubSubClient::health.

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Health {
    pub status: HealthStatus,
    // details always carries "backend" and the sanitized "address", plus
    // a "message" when the client is down.
    pub details: BTreeMap<String, String>,
}

impl Health {
    pub fn up(backend: &str, address: &str) -> Self {
        Self {
            status: HealthStatus::Up,
            details: base_details(backend, address),
        }
    }

    pub fn down(backend: &str, address: &str, message: impl Into<String>) -> Self {
        let mut details = base_details(backend, address);
        details.insert("message".to_string(), message.into());
        Self {
            status: HealthStatus::Down,
            details,
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == HealthStatus::Up
    }

    pub fn message(&self) -> Option<&str> {
        self.details.get("message").map(String::as_str)
    }
}

fn base_details(backend: &str, address: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("backend".to_string(), backend.to_string()),
        ("address".to_string(), address.to_string()),
    ])
}
