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

// src/stats/delivery.rs
// Delivery statistics for messages flowing from subscription workers
// into per-topic delivery channels, and out to subscribe callers.
//
// Drops are the interesting number here: every message discarded by the
// backpressure policy is counted, so a consumer that falls behind shows
// up in total_dropped rather than as a stalled worker.

use std::sync::atomic::{AtomicUsize, Ordering};

// DeliveryStats is a snapshot of delivery counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryStats {
    // total_received is the count of messages workers received from
    // the broker, whether or not they were enqueued.
    pub total_received: usize,
    // total_enqueued is the count of messages placed into a delivery
    // channel.
    pub total_enqueued: usize,
    // total_consumed is the count of messages handed to subscribe
    // callers.
    pub total_consumed: usize,
    // total_dropped is the count of messages discarded because the
    // delivery channel was full.
    pub total_dropped: usize,
    pub total_bytes_dropped: usize,
    // total_discarded is the count of messages that arrived for a
    // subscription that was already closing.
    pub total_discarded: usize,
    // total_feed_closures is the number of times a broker feed ended
    // underneath a running worker.
    pub total_feed_closures: usize,
    // total_subscribe_failures is the number of times a worker could
    // not establish its broker subscription.
    pub total_subscribe_failures: usize,
}

#[derive(Debug, Default)]
pub struct DeliveryStatsTracker {
    received_count: AtomicUsize,
    enqueued_count: AtomicUsize,
    consumed_count: AtomicUsize,
    dropped_count: AtomicUsize,
    dropped_bytes: AtomicUsize,
    discarded_count: AtomicUsize,
    feed_closures: AtomicUsize,
    subscribe_failures: AtomicUsize,
}

impl DeliveryStatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_received(&self) {
        self.received_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_enqueued(&self) {
        self.enqueued_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_consumed(&self) {
        self.consumed_count.fetch_add(1, Ordering::Relaxed);
    }

    // increment_dropped records a message lost to backpressure. Under
    // DropOldest the evicted message is the one counted.
    pub fn increment_dropped(&self, bytes: usize) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
        self.dropped_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn increment_discarded(&self) {
        self.discarded_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_feed_closures(&self) {
        self.feed_closures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_subscribe_failures(&self) {
        self.subscribe_failures.fetch_add(1, Ordering::Relaxed);
    }

    // pending is an estimate of messages sitting in delivery channels.
    // Channels dropped with queued messages still count here.
    pub fn pending(&self) -> usize {
        self.enqueued_count
            .load(Ordering::Relaxed)
            .saturating_sub(self.consumed_count.load(Ordering::Relaxed))
    }

    pub fn reset_counters(&self) {
        self.received_count.store(0, Ordering::Relaxed);
        self.enqueued_count.store(0, Ordering::Relaxed);
        self.consumed_count.store(0, Ordering::Relaxed);
        self.dropped_count.store(0, Ordering::Relaxed);
        self.dropped_bytes.store(0, Ordering::Relaxed);
        self.discarded_count.store(0, Ordering::Relaxed);
        self.feed_closures.store(0, Ordering::Relaxed);
        self.subscribe_failures.store(0, Ordering::Relaxed);
    }

    pub fn to_stats(&self) -> DeliveryStats {
        DeliveryStats {
            total_received: self.received_count.load(Ordering::Relaxed),
            total_enqueued: self.enqueued_count.load(Ordering::Relaxed),
            total_consumed: self.consumed_count.load(Ordering::Relaxed),
            total_dropped: self.dropped_count.load(Ordering::Relaxed),
            total_bytes_dropped: self.dropped_bytes.load(Ordering::Relaxed),
            total_discarded: self.discarded_count.load(Ordering::Relaxed),
            total_feed_closures: self.feed_closures.load(Ordering::Relaxed),
            total_subscribe_failures: self.subscribe_failures.load(Ordering::Relaxed),
        }
    }
}
