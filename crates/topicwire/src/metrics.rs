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

// src/metrics.rs
// Metrics hooks handed to the client at construction.
//
// The client only ever calls `Metrics::increment_counter` and
// `Metrics::record_histogram`; how those are exported is up to the
// implementation. `RecorderMetrics` forwards to whatever recorder is
// installed for the `metrics` crate.

use metrics::Label;

pub const PUBLISH_TOTAL_COUNT: &str = "app_pubsub_publish_total_count";
pub const PUBLISH_SUCCESS_COUNT: &str = "app_pubsub_publish_success_count";
pub const SUBSCRIBE_TOTAL_COUNT: &str = "app_pubsub_subscribe_total_count";
pub const SUBSCRIBE_SUCCESS_COUNT: &str = "app_pubsub_subscribe_success_count";
pub const PUBLISH_DURATION_SECONDS: &str = "app_pubsub_publish_duration_seconds";

// Capability used by the client to report counters and timings.
pub trait Metrics: Send + Sync + 'static {
    fn increment_counter(&self, name: &str, labels: &[(&str, &str)]);

    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]);
}

// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn increment_counter(&self, _name: &str, _labels: &[(&str, &str)]) {}

    fn record_histogram(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
}

// Forwards to the global `metrics` recorder.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecorderMetrics;

impl Metrics for RecorderMetrics {
    fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        metrics::counter!(name.to_string(), to_labels(labels)).increment(1);
    }

    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        metrics::histogram!(name.to_string(), to_labels(labels)).record(value);
    }
}

fn to_labels(labels: &[(&str, &str)]) -> Vec<Label> {
    labels
        .iter()
        .map(|(key, value)| Label::new(key.to_string(), value.to_string()))
        .collect()
}
