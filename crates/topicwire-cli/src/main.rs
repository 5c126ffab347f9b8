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
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;
use topicwire::{
    CancellationToken, Message, MqttTransportFactory, PubSubClient, PubSubClientError,
    PubSubConfig, RecorderMetrics,
};
use tracing::metadata::LevelFilter;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<(), eyre::Report> {
    let options = Options::parse();

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy()
        .add_directive("rumqttc=warn".parse()?)
        .add_directive("rustls=warn".parse()?);
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .try_init()?;

    let mut config = PubSubConfig::load(options.config_file.as_deref())
        .wrap_err("Failed to load configuration")?;
    if let Some(address) = options.address {
        config.address = address;
    }

    let client = PubSubClient::new(
        config,
        Arc::new(MqttTransportFactory::default()),
        Arc::new(RecorderMetrics),
    )
    .wrap_err("Invalid configuration")?;
    client.connect().await;

    let ctx = CancellationToken::new();
    tokio::spawn({
        let ctx = ctx.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctx.cancel();
            }
        }
    });

    let result = run(&client, &ctx, options.command).await;
    if let Err(e) = client.close().await {
        tracing::warn!(error = %e, "Error closing client");
    }
    result
}

async fn run(
    client: &PubSubClient,
    ctx: &CancellationToken,
    command: Command,
) -> Result<(), eyre::Report> {
    match command {
        Command::Publish(publish) => {
            client
                .publish(&publish.topic, publish.payload.into_bytes())
                .await
                .wrap_err_with(|| format!("Failed to publish to {}", publish.topic))?;
        }
        Command::Subscribe(subscribe) => {
            follow(client, ctx, &subscribe.topic, subscribe.count, |message| {
                println!(
                    "{}\t{}",
                    message.topic,
                    String::from_utf8_lossy(&message.payload)
                );
            })
            .await
            .wrap_err("Subscribe failed")?;
        }
        Command::Query(query) => {
            let payload = client
                .query(ctx, &query.topic, query.timeout, query.limit)
                .await
                .wrap_err_with(|| format!("Failed to query {}", query.topic))?;
            println!("{}", String::from_utf8_lossy(&payload));
        }
        Command::Health => {
            let health = client.health().await;
            println!("{}", serde_json::to_string_pretty(&health)?);
            if !health.is_up() {
                eyre::bail!("broker is down");
            }
        }
    }
    Ok(())
}

// follow receives messages from a topic until ctx is cancelled or
// `count` messages have arrived. A subscription that ends under it (the
// broker dropped the feed, or a reconnect cleared it) is made again on
// the next call to subscribe. Returns how many messages were received.
async fn follow(
    client: &PubSubClient,
    ctx: &CancellationToken,
    topic: &str,
    count: Option<usize>,
    mut on_message: impl FnMut(&Message),
) -> Result<usize, PubSubClientError> {
    let mut received = 0;
    while count.is_none_or(|count| received < count) {
        match client.subscribe(ctx, topic).await {
            Ok(Some(message)) => {
                received += 1;
                on_message(&message);
                message.commit();
            }
            Ok(None) if ctx.is_cancelled() => break,
            Ok(None) => tracing::info!(topic = %topic, "Subscription ended, subscribing again"),
            Err(e) if e.is_connection_error() => {
                tracing::warn!(error = %e, "Not connected, retrying");
                tokio::select! {
                    _ = ctx.cancelled() => break,
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
    Ok(received)
}

const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[clap(name = "topicwire", about = "Pub/sub client for MQTT brokers")]
pub struct Options {
    #[clap(
        long,
        short = 'f',
        env = "TOPICWIRE_CONFIG",
        help = "Path to TOML configuration file"
    )]
    config_file: Option<PathBuf>,

    #[clap(long, short = 'a', help = "Broker address, overrides the configuration file")]
    address: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Parser)]
pub enum Command {
    #[clap(about = "Publish one message")]
    Publish(PublishCommand),
    #[clap(about = "Print messages from a topic until interrupted")]
    Subscribe(SubscribeCommand),
    #[clap(about = "Collect messages from a topic and print them")]
    Query(QueryCommand),
    #[clap(about = "Check broker health")]
    Health,
}

#[derive(Parser)]
pub struct PublishCommand {
    topic: String,
    payload: String,
}

#[derive(Parser)]
pub struct SubscribeCommand {
    topic: String,

    #[clap(long, short = 'n', help = "Exit after this many messages")]
    count: Option<usize>,
}

#[derive(Parser)]
pub struct QueryCommand {
    topic: String,

    #[clap(long, value_parser = humantime::parse_duration, help = "How long to collect, e.g. 5s")]
    timeout: Option<Duration>,

    #[clap(long, short = 'n', help = "Maximum number of messages")]
    limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use topicwire::{MemoryBroker, NoopMetrics};

    use super::*;

    async fn wait_for_subscriptions(broker: &MemoryBroker, topic: &str, expected: usize) {
        for _ in 0..300 {
            if broker.active_subscriptions(topic).await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {expected} broker subscriptions on {topic}");
    }

    #[tokio::test]
    async fn test_follow_survives_dropped_subscription() {
        let broker = MemoryBroker::new();
        let client = PubSubClient::new(
            PubSubConfig::default(),
            Arc::new(broker.factory()),
            Arc::new(NoopMetrics),
        )
        .unwrap();
        client.connect().await;
        let ctx = CancellationToken::new();

        let follower = {
            let client = client.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let mut payloads = Vec::new();
                let received = follow(&client, &ctx, "pets/cats", Some(2), |message| {
                    payloads.push(message.payload.clone());
                })
                .await;
                (received, payloads)
            })
        };

        wait_for_subscriptions(&broker, "pets/cats", 1).await;
        broker.publish("pets/cats", "meow").await;
        broker.disconnect_subscribers().await;

        wait_for_subscriptions(&broker, "pets/cats", 1).await;
        broker.publish("pets/cats", "purr").await;

        let (received, payloads) = tokio::time::timeout(Duration::from_secs(5), follower)
            .await
            .expect("follow should resubscribe and finish")
            .unwrap();
        assert_eq!(received.unwrap(), 2);
        assert_eq!(payloads, vec![b"meow".to_vec(), b"purr".to_vec()]);
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_follow_stops_on_cancellation() {
        let broker = MemoryBroker::new();
        let client = PubSubClient::new(
            PubSubConfig::default(),
            Arc::new(broker.factory()),
            Arc::new(NoopMetrics),
        )
        .unwrap();
        client.connect().await;
        let ctx = CancellationToken::new();
        ctx.cancel();

        let received = tokio::time::timeout(
            Duration::from_secs(2),
            follow(&client, &ctx, "pets/cats", None, |_| {}),
        )
        .await
        .expect("follow should stop once cancelled")
        .unwrap();
        assert_eq!(received, 0);
    }
}
