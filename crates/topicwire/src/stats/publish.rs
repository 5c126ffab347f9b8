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

// src/stats/publish.rs
// Publish statistics for messages sent through the publish connection.
//
// Counters are plain atomics so recording never contends with the
// publish path itself.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

// PublishStats is a snapshot of publish counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishStats {
    // total_published is the count of messages the transport accepted.
    pub total_published: usize,
    // total_failed is the count of messages the transport rejected
    // or timed out on.
    pub total_failed: usize,
    // total_rejected is the count of publish calls turned away before
    // reaching the transport (client not connected).
    pub total_rejected: usize,
    pub total_bytes_published: usize,
    // last_publish_micros is how long the most recent successful
    // publish took.
    pub last_publish_micros: u64,
}

#[derive(Debug, Default)]
pub struct PublishStatsTracker {
    published_count: AtomicUsize,
    failed_count: AtomicUsize,
    rejected_count: AtomicUsize,
    published_bytes: AtomicUsize,
    last_publish_micros: AtomicU64,
}

impl PublishStatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // increment_published records a publish the transport accepted,
    // along with how long it took.
    pub fn increment_published(&self, bytes: usize, micros: u64) {
        self.published_count.fetch_add(1, Ordering::Relaxed);
        self.published_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.last_publish_micros.store(micros, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.failed_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rejected(&self) {
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset_counters(&self) {
        self.published_count.store(0, Ordering::Relaxed);
        self.failed_count.store(0, Ordering::Relaxed);
        self.rejected_count.store(0, Ordering::Relaxed);
        self.published_bytes.store(0, Ordering::Relaxed);
        self.last_publish_micros.store(0, Ordering::Relaxed);
    }

    pub fn to_stats(&self) -> PublishStats {
        PublishStats {
            total_published: self.published_count.load(Ordering::Relaxed),
            total_failed: self.failed_count.load(Ordering::Relaxed),
            total_rejected: self.rejected_count.load(Ordering::Relaxed),
            total_bytes_published: self.published_bytes.load(Ordering::Relaxed),
            last_publish_micros: self.last_publish_micros.load(Ordering::Relaxed),
        }
    }
}
