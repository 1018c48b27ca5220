// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::value::RawValue;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::PublishError;
use crate::http_utils::build_client;

const KAFKA_JSON_CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";
const MAX_MESSAGES_PER_REQUEST: usize = 128;

/// Capability to hand a message to the broker without waiting for delivery.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, message: String);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: String,
}

/// Cheap to clone. Every clone feeds the same [`BrokerService`], so messages published through
/// any handle are delivered in the order they were published.
#[derive(Clone)]
pub struct BrokerHandle {
    tx: mpsc::UnboundedSender<BrokerMessage>,
}

impl Publisher for BrokerHandle {
    fn publish(&self, topic: &str, message: String) {
        let message = BrokerMessage {
            topic: topic.to_string(),
            payload: message,
        };
        if self.tx.send(message).is_err() {
            error!("{}", PublishError::ChannelClosed);
        }
    }
}

/// Delivers a run of messages for one topic to the broker.
#[async_trait]
pub trait BrokerTransport {
    async fn send(&self, topic: &str, messages: &[String]) -> Result<(), PublishError>;
}

#[derive(Serialize)]
struct ProduceRecord<'a> {
    value: &'a RawValue,
}

#[derive(Serialize)]
struct ProduceRequest<'a> {
    records: Vec<ProduceRecord<'a>>,
}

/// Produces to Kafka through the REST proxy v2 JSON embedded format.
pub struct RestProxyTransport {
    endpoint: String,
    client: reqwest::Client,
}

impl RestProxyTransport {
    pub fn new(config: &Config) -> Self {
        let client = build_client(config.proxy_url.as_deref(), config.broker_request_timeout())
            .unwrap_or_else(|e| {
                error!(
                    "Unable to parse proxy configuration: {}, no proxy will be used",
                    e
                );
                reqwest::Client::new()
            });
        RestProxyTransport {
            endpoint: config.broker_endpoint.as_str().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn topic_url(&self, topic: &str) -> String {
        format!("{}/topics/{topic}", self.endpoint)
    }
}

#[async_trait]
impl BrokerTransport for RestProxyTransport {
    async fn send(&self, topic: &str, messages: &[String]) -> Result<(), PublishError> {
        let mut records = Vec::with_capacity(messages.len());
        for message in messages {
            let value: &RawValue = serde_json::from_str(message)
                .map_err(|e| PublishError::Payload(format!("message is not valid JSON: {e}")))?;
            records.push(ProduceRecord { value });
        }
        let body = serde_json::to_vec(&ProduceRequest { records })
            .map_err(|e| PublishError::Payload(e.to_string()))?;

        let response = self
            .client
            .post(self.topic_url(topic))
            .header(reqwest::header::CONTENT_TYPE, KAFKA_JSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| PublishError::Destination(e.status(), e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(PublishError::Destination(Some(status), body))
        }
    }
}

/// Single consumer of everything published through [`BrokerHandle`]s. Runs until every handle
/// has been dropped and the queue is drained.
pub struct BrokerService<T> {
    transport: T,
    rx: mpsc::UnboundedReceiver<BrokerMessage>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl<T: BrokerTransport> BrokerService<T> {
    pub fn new(transport: T, config: &Config) -> (Self, BrokerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = BrokerService {
            transport,
            rx,
            max_retries: config.broker_max_retries,
            retry_backoff: Duration::from_millis(config.broker_retry_backoff_ms),
        };
        (service, BrokerHandle { tx })
    }

    pub async fn run(mut self) {
        debug!("Broker service started");
        let mut buffer = Vec::with_capacity(MAX_MESSAGES_PER_REQUEST);

        while self.rx.recv_many(&mut buffer, MAX_MESSAGES_PER_REQUEST).await > 0 {
            for (topic, payloads) in group_by_topic(buffer.drain(..)) {
                self.deliver(&topic, &payloads).await;
            }
        }

        debug!("Broker service stopped: all publishers dropped");
    }

    async fn deliver(&self, topic: &str, payloads: &[String]) {
        let mut attempts = 0;

        loop {
            attempts += 1;
            let time = Instant::now();
            match self.transport.send(topic, payloads).await {
                Ok(()) => {
                    debug!(
                        "Broker | Published {} messages to {topic} in {} ms",
                        payloads.len(),
                        time.elapsed().as_millis()
                    );
                    return;
                }
                Err(e) if e.is_permanent() => {
                    error!(
                        "Broker | Dropping {} messages for {topic}: {e}",
                        payloads.len()
                    );
                    return;
                }
                Err(e) => {
                    if attempts > self.max_retries {
                        error!(
                            "Broker | Failed to publish {} messages to {topic} after {attempts} attempts: {e}",
                            payloads.len()
                        );
                        return;
                    }
                    warn!("Broker | Publish attempt {attempts} to {topic} failed: {e}");
                }
            }
            tokio::time::sleep(self.retry_backoff).await;
        }
    }
}

/// Splits a queue into runs of consecutive messages sharing a topic, keeping queue order.
fn group_by_topic(messages: impl Iterator<Item = BrokerMessage>) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for message in messages {
        match groups.last_mut() {
            Some((topic, payloads)) if *topic == message.topic => payloads.push(message.payload),
            _ => groups.push((message.topic, vec![message.payload])),
        }
    }
    groups
}
