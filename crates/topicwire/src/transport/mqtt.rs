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

// src/transport/mqtt.rs
// MQTT transport built on rumqttc.
//
// Each connection owns its own AsyncClient and event loop task, so a
// stalled subscribe connection never holds up publish or query traffic.
// The event loop task tracks connection state (for ping) and routes
// incoming publishes to the feeds of matching subscriptions. When the
// connection drops, every feed is closed so the workers reading them
// exit and their topics get re-established on the next subscribe.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{PubSubConfig, sanitize_address};
use crate::errors::PubSubClientError;
use crate::transport::tls::load_tls;
use crate::transport::topic_filter::TopicFilter;
use crate::transport::{
    BrokerMessage, BrokerSubscription, Connection, ConnectionRole, FEED_CAPACITY,
    SubscriptionHandle, TransportFactory,
};

pub const BACKEND_NAME: &str = "MQTT";
pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_MQTTS_PORT: u16 = 8883;
// DEFAULT_KEEP_ALIVE is used when no idle_timeout is configured.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);
// EVENT_LOOP_ERROR_DELAY throttles the event loop after a connection
// error, since rumqttc reconnects on the very next poll.
const EVENT_LOOP_ERROR_DELAY: Duration = Duration::from_secs(1);

// MqttTransportFactory builds rumqttc-backed connections.
#[derive(Clone, Debug)]
pub struct MqttTransportFactory {
    qos: QoS,
    retain: bool,
}

impl Default for MqttTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MqttTransportFactory {
    // new uses QoS 0 (at most once) without retain, matching a broker
    // without delivery acknowledgement.
    pub fn new() -> Self {
        Self {
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    fn mqtt_options(
        &self,
        config: &PubSubConfig,
        role: ConnectionRole,
    ) -> Result<MqttOptions, PubSubClientError> {
        let endpoint = BrokerEndpoint::parse(&config.address)?;
        let client_id = format!("{}-{}", config.client_id, role);

        let mut options = MqttOptions::new(client_id, endpoint.host.clone(), endpoint.port);
        let keep_alive = config
            .idle_timeout
            .unwrap_or(DEFAULT_KEEP_ALIVE)
            .max(MIN_KEEP_ALIVE);
        options.set_keep_alive(keep_alive);
        options.set_clean_session(true);

        let username = config.username.clone().or(endpoint.username);
        let password = config.password.clone().or(endpoint.password);
        if username.is_some() || password.is_some() {
            options.set_credentials(username.unwrap_or_default(), password.unwrap_or_default());
        }

        match &config.tls {
            Some(tls) => {
                let tls_config = load_tls(tls)?;
                options.set_transport(Transport::tls_with_config(tls_config.into()));
            }
            None if endpoint.secure => {
                return Err(PubSubClientError::invalid_config(format!(
                    "address {} requires a tls block",
                    sanitize_address(&config.address)
                )));
            }
            None => {}
        }

        Ok(options)
    }
}

#[async_trait]
impl TransportFactory for MqttTransportFactory {
    fn backend(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn build(
        &self,
        config: &PubSubConfig,
        role: ConnectionRole,
    ) -> Result<Arc<dyn Connection>, PubSubClientError> {
        let options = self.mqtt_options(config, role)?;
        let (client, event_loop) = AsyncClient::new(options, config.pool_capacity());
        debug!(
            role = %role,
            address = %sanitize_address(&config.address),
            "Built MQTT connection"
        );
        Ok(Arc::new(MqttConnection::start(
            role,
            client,
            event_loop,
            self.qos,
            self.retain,
            config,
        )))
    }
}

// BrokerEndpoint is the parsed form of the configured address.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl BrokerEndpoint {
    // parse accepts host, host:port, or mqtt(s)://[user[:pass]@]host[:port].
    pub fn parse(address: &str) -> Result<Self, PubSubClientError> {
        let with_scheme = if address.contains("://") {
            address.to_string()
        } else {
            format!("mqtt://{address}")
        };
        let url = Url::parse(&with_scheme).map_err(|e| {
            PubSubClientError::invalid_config(format!(
                "invalid address {}: {e}",
                sanitize_address(address)
            ))
        })?;

        let secure = match url.scheme() {
            "mqtt" | "tcp" => false,
            "mqtts" | "ssl" | "tls" => true,
            other => {
                return Err(PubSubClientError::invalid_config(format!(
                    "unsupported address scheme '{other}'"
                )));
            }
        };
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| {
                PubSubClientError::invalid_config(format!(
                    "address {} has no host",
                    sanitize_address(address)
                ))
            })?
            .to_string();
        let port = url.port().unwrap_or(if secure {
            DEFAULT_MQTTS_PORT
        } else {
            DEFAULT_MQTT_PORT
        });
        let username = Some(url.username().to_string()).filter(|u| !u.is_empty());
        let password = url.password().map(str::to_string);

        Ok(Self {
            host,
            port,
            secure,
            username,
            password,
        })
    }
}

// Route connects one broker subscription to the feed of its consumer.
struct Route {
    id: u64,
    filter: TopicFilter,
    sender: mpsc::Sender<BrokerMessage>,
}

type Routes = Arc<Mutex<Vec<Route>>>;

pub struct MqttConnection {
    role: ConnectionRole,
    client: AsyncClient,
    qos: QoS,
    retain: bool,
    connected: watch::Receiver<bool>,
    routes: Routes,
    next_route_id: AtomicU64,
    shutdown: CancellationToken,
    closed: AtomicBool,
    dial_timeout: Duration,
    write_timeout: Duration,
}

impl MqttConnection {
    fn start(
        role: ConnectionRole,
        client: AsyncClient,
        event_loop: EventLoop,
        qos: QoS,
        retain: bool,
        config: &PubSubConfig,
    ) -> Self {
        let (connected_tx, connected) = watch::channel(false);
        let routes: Routes = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        tokio::spawn(drive_event_loop(
            role,
            event_loop,
            connected_tx,
            routes.clone(),
            shutdown.clone(),
        ));

        Self {
            role,
            client,
            qos,
            retain,
            connected,
            routes,
            next_route_id: AtomicU64::new(0),
            shutdown,
            closed: AtomicBool::new(false),
            dial_timeout: config.dial_timeout,
            write_timeout: config.write_timeout,
        }
    }

    fn ensure_open(&self) -> Result<(), PubSubClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PubSubClientError::AlreadyClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MqttConnection {
    fn role(&self) -> ConnectionRole {
        self.role
    }

    // ping reports the state tracked by the event loop, giving a fresh
    // connection up to dial_timeout to receive its CONNACK.
    async fn ping(&self) -> Result<(), PubSubClientError> {
        self.ensure_open()?;
        if *self.connected.borrow() {
            return Ok(());
        }
        let mut connected = self.connected.clone();
        match timeout(self.dial_timeout, connected.wait_for(|up| *up)).await {
            Ok(Ok(_)) => Ok(()),
            _ => Err(PubSubClientError::ClientNotConnected),
        }
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PubSubClientError> {
        self.ensure_open()?;
        timeout(
            self.write_timeout,
            self.client.publish(topic, self.qos, self.retain, payload),
        )
        .await
        .map_err(|_| PubSubClientError::timeout(format!("publish to '{topic}'")))??;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BrokerSubscription, PubSubClientError> {
        self.ensure_open()?;
        let filter = TopicFilter::new(topic)?;
        let (sender, feed) = mpsc::channel(FEED_CAPACITY);
        let id = self.next_route_id.fetch_add(1, Ordering::Relaxed);
        self.routes.lock().await.push(Route {
            id,
            filter: filter.clone(),
            sender,
        });

        let requested = timeout(self.write_timeout, self.client.subscribe(topic, self.qos)).await;
        let failure = match requested {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(PubSubClientError::channel_failed(format!(
                "subscribe to '{topic}': {e}"
            ))),
            Err(_) => Some(PubSubClientError::connection_failed(format!(
                "subscribe to '{topic}' timed out"
            ))),
        };
        if let Some(error) = failure {
            self.routes.lock().await.retain(|route| route.id != id);
            return Err(error);
        }

        Ok(BrokerSubscription {
            feed,
            handle: Arc::new(MqttSubscriptionHandle {
                id,
                filter,
                client: self.client.clone(),
                routes: self.routes.clone(),
                write_timeout: self.write_timeout,
            }),
        })
    }

    async fn close(&self) -> Result<(), PubSubClientError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(PubSubClientError::AlreadyClosed);
        }
        let result = match timeout(self.write_timeout, self.client.disconnect()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(PubSubClientError::from(e)),
            Err(_) => Err(PubSubClientError::timeout("disconnect")),
        };
        self.shutdown.cancel();
        debug!(role = %self.role, "Closed MQTT connection");
        result
    }
}

impl Drop for MqttConnection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct MqttSubscriptionHandle {
    id: u64,
    filter: TopicFilter,
    client: AsyncClient,
    routes: Routes,
    write_timeout: Duration,
}

#[async_trait]
impl SubscriptionHandle for MqttSubscriptionHandle {
    // unsubscribe drops this route, and only tells the broker once no
    // other route on the connection uses the same filter.
    async fn unsubscribe(&self) -> Result<(), PubSubClientError> {
        let still_used = {
            let mut routes = self.routes.lock().await;
            routes.retain(|route| route.id != self.id);
            routes.iter().any(|route| route.filter == self.filter)
        };
        if still_used {
            return Ok(());
        }
        timeout(
            self.write_timeout,
            self.client.unsubscribe(self.filter.as_str()),
        )
        .await
        .map_err(|_| PubSubClientError::timeout(format!("unsubscribe from {}", self.filter)))??;
        Ok(())
    }
}

// drive_event_loop polls the rumqttc event loop until the connection is
// closed, tracking connection state and routing incoming publishes.
async fn drive_event_loop(
    role: ConnectionRole,
    mut event_loop: EventLoop,
    connected: watch::Sender<bool>,
    routes: Routes,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = event_loop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected.send_replace(true);
                info!(role = %role, "MQTT connection established");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = BrokerMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                };
                route_message(&routes, message).await;
            }
            Ok(_) => {}
            Err(e) => {
                if connected.send_replace(false) {
                    warn!(role = %role, error = %e, "MQTT connection lost");
                } else {
                    debug!(role = %role, error = %e, "MQTT connection attempt failed");
                }
                close_routes(&routes).await;
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(EVENT_LOOP_ERROR_DELAY) => {}
                }
            }
        }
    }

    connected.send_replace(false);
    close_routes(&routes).await;
    debug!(role = %role, "MQTT event loop stopped");
}

// route_message hands a message to every matching route without
// blocking. Routes whose consumer has gone away are pruned.
async fn route_message(routes: &Routes, message: BrokerMessage) {
    let mut routes = routes.lock().await;
    let mut matched = false;
    routes.retain(|route| {
        if !route.filter.matches(&message.topic) {
            return true;
        }
        matched = true;
        match route.sender.try_send(message.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    topic = %message.topic,
                    "Subscription feed full, dropping message"
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    });
    if !matched {
        debug!(topic = %message.topic, "No subscription for incoming message");
    }
}

// close_routes drops every feed sender, ending the feeds.
async fn close_routes(routes: &Routes) {
    routes.lock().await.clear();
}
