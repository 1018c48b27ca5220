// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use reqwest::Url;

const DEFAULT_RELAY_PORT: u16 = 8080;
const DEFAULT_TOPIC_NAME: &str = "logging";
const DEFAULT_TRIGGER_EVENT_TYPE: &str = "gameEnd";
const INDICATOR_ENDPOINT_PATH: &str = "/internal/hints/data";
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub max_request_content_length: usize,
    /// Kafka REST proxy base url
    pub broker_endpoint: Url,
    /// topic every log entry is republished on
    pub topic_name: String,
    /// full url the aggregate payload is posted to
    pub indicator_url: Url,
    /// `eventType` value that selects entries for the aggregate payload
    pub trigger_event_type: String,
    /// timeout for each broker request, in milliseconds
    pub broker_request_timeout_ms: u64,
    /// retries after the first failed broker request
    pub broker_max_retries: u32,
    /// linear backoff between broker attempts, in milliseconds
    pub broker_retry_backoff_ms: u64,
    /// timeout for each indicator request, in seconds
    pub indicator_request_timeout_secs: u64,
    pub proxy_url: Option<String>,
    pub log_level: String,
}

impl Config {
    pub fn new() -> Result<Config, Box<dyn std::error::Error>> {
        let broker_endpoint = env::var("RELAY_BROKER_ENDPOINT")
            .map_err(|_| anyhow::anyhow!("RELAY_BROKER_ENDPOINT environment variable is not set"))?;
        let broker_endpoint = parse_http_url("RELAY_BROKER_ENDPOINT", &broker_endpoint)?;

        let indicator_base = env::var("RELAY_INDICATOR_URL")
            .map_err(|_| anyhow::anyhow!("RELAY_INDICATOR_URL environment variable is not set"))?;
        let indicator_url = parse_http_url(
            "RELAY_INDICATOR_URL",
            &format!(
                "{}{INDICATOR_ENDPOINT_PATH}",
                indicator_base.trim_end_matches('/')
            ),
        )?;

        let host = match env::var("RELAY_HOST") {
            Ok(host) => host
                .parse::<IpAddr>()
                .map_err(|e| anyhow::anyhow!("Invalid RELAY_HOST '{host}': {e}"))?,
            Err(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };
        let port: u16 = env::var("RELAY_PORT")
            .ok()
            .and_then(|port| port.parse::<u16>().ok())
            .unwrap_or(DEFAULT_RELAY_PORT);

        let config = Config {
            host,
            port,
            max_request_content_length: 10 * 1024 * 1024, // 10MB in Bytes
            broker_endpoint,
            topic_name: env::var("RELAY_TOPIC_NAME")
                .unwrap_or_else(|_| DEFAULT_TOPIC_NAME.to_string()),
            indicator_url,
            trigger_event_type: env::var("RELAY_TRIGGER_EVENT_TYPE")
                .unwrap_or_else(|_| DEFAULT_TRIGGER_EVENT_TYPE.to_string()),
            broker_request_timeout_ms: 2000,
            broker_max_retries: 3,
            broker_retry_backoff_ms: 1000,
            indicator_request_timeout_secs: 10,
            proxy_url: env::var("RELAY_PROXY_HTTPS")
                .or_else(|_| env::var("HTTPS_PROXY"))
                .ok(),
            log_level: env::var("RELAY_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or_else(|_| "info".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.topic_name.trim().is_empty() {
            anyhow::bail!("RELAY_TOPIC_NAME cannot be empty");
        }
        if self.trigger_event_type.trim().is_empty() {
            anyhow::bail!("RELAY_TRIGGER_EVENT_TYPE cannot be empty");
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            );
        }
        Ok(())
    }

    pub fn broker_request_timeout(&self) -> Duration {
        Duration::from_millis(self.broker_request_timeout_ms)
    }

    pub fn indicator_request_timeout(&self) -> Duration {
        Duration::from_secs(self.indicator_request_timeout_secs)
    }
}

fn parse_http_url(name: &str, value: &str) -> anyhow::Result<Url> {
    let url = Url::parse(value).map_err(|e| anyhow::anyhow!("Invalid {name} '{value}': {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => anyhow::bail!("Invalid {name} '{value}': unsupported scheme '{scheme}'"),
    }
}
