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

// tests/query.rs
// Tests for one-shot queries.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use topicwire::{CancellationToken, MemoryBroker, NoopMetrics, PubSubClient, PubSubConfig};

async fn connected_client(broker: &MemoryBroker) -> PubSubClient {
    let config = PubSubConfig::default().with_retry_interval(Duration::from_millis(50));
    let client =
        PubSubClient::new(config, Arc::new(broker.factory()), Arc::new(NoopMetrics)).unwrap();
    client.connect().await;
    client
}

fn spawn_query(
    client: &PubSubClient,
    topic: &str,
    timeout: Option<Duration>,
    limit: Option<usize>,
) -> tokio::task::JoinHandle<Result<Vec<u8>, topicwire::PubSubClientError>> {
    let client = client.clone();
    let topic = topic.to_string();
    tokio::spawn(async move {
        client
            .query(&CancellationToken::new(), &topic, timeout, limit)
            .await
    })
}

async fn wait_for_subscriptions(broker: &MemoryBroker, topic: &str, expected: usize) {
    for _ in 0..300 {
        if broker.active_subscriptions(topic).await == expected {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {expected} broker subscriptions on {topic}");
}

#[tokio::test]
async fn test_query_collects_up_to_limit() {
    let broker = MemoryBroker::new();
    let client = connected_client(&broker).await;

    let query = spawn_query(&client, "pets/feed", Some(Duration::from_secs(5)), Some(2));
    wait_for_subscriptions(&broker, "pets/feed", 1).await;
    client.publish("pets/feed", "m1").await.unwrap();
    client.publish("pets/feed", "m2").await.unwrap();
    client.publish("pets/feed", "m3").await.unwrap();

    let payload = query.await.unwrap().unwrap();
    assert_eq!(payload, b"m1\nm2");
    // The temporary subscription is always cancelled.
    assert_eq!(broker.active_subscriptions("pets/feed").await, 0);
    assert_eq!(broker.unsubscribe_calls(), 1);
}

#[tokio::test]
async fn test_query_returns_partial_results_on_timeout() {
    let broker = MemoryBroker::new();
    let client = connected_client(&broker).await;

    let started = Instant::now();
    let query = spawn_query(&client, "pets/feed", Some(Duration::from_millis(300)), Some(5));
    wait_for_subscriptions(&broker, "pets/feed", 1).await;
    client.publish("pets/feed", "only-one").await.unwrap();

    let payload = query.await.unwrap().unwrap();
    assert_eq!(payload, b"only-one");
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn test_query_with_no_messages_is_empty() {
    let broker = MemoryBroker::new();
    let client = connected_client(&broker).await;

    let payload = client
        .query(
            &CancellationToken::new(),
            "pets/empty",
            Some(Duration::from_millis(100)),
            None,
        )
        .await
        .unwrap();
    assert!(payload.is_empty());
}

#[tokio::test]
async fn test_query_stops_on_cancellation() {
    let broker = MemoryBroker::new();
    let client = connected_client(&broker).await;
    let ctx = CancellationToken::new();

    let query = {
        let client = client.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { client.query(&ctx, "pets/feed", None, None).await })
    };
    wait_for_subscriptions(&broker, "pets/feed", 1).await;
    client.publish("pets/feed", "m1").await.unwrap();
    sleep(Duration::from_millis(50)).await;
    ctx.cancel();

    let payload = tokio::time::timeout(Duration::from_secs(2), query)
        .await
        .expect("cancelled query should return")
        .unwrap()
        .unwrap();
    assert_eq!(payload, b"m1");
}

#[tokio::test]
async fn test_query_does_not_register_subscriptions() {
    let broker = MemoryBroker::new();
    let client = connected_client(&broker).await;

    client
        .query(
            &CancellationToken::new(),
            "pets/feed",
            Some(Duration::from_millis(50)),
            Some(1),
        )
        .await
        .unwrap();
    assert!(client.subscribed_topics().await.is_empty());
}

#[tokio::test]
async fn test_query_without_connection() {
    let broker = MemoryBroker::new();
    let client = PubSubClient::new(
        PubSubConfig::default(),
        Arc::new(broker.factory()),
        Arc::new(NoopMetrics),
    )
    .unwrap();

    let result = client
        .query(&CancellationToken::new(), "pets/feed", None, None)
        .await;
    assert!(result.unwrap_err().is_connection_error());
}

#[tokio::test]
async fn test_query_deadline_covers_broker_subscribe() {
    let broker = MemoryBroker::new();
    let client = connected_client(&broker).await;
    broker.set_subscribe_stalled(true);

    let started = Instant::now();
    let payload = client
        .query(
            &CancellationToken::new(),
            "pets/feed",
            Some(Duration::from_millis(200)),
            None,
        )
        .await
        .unwrap();
    assert!(payload.is_empty());
    assert!(started.elapsed() < Duration::from_secs(1));
}
