// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::NotifyError;
use crate::http_utils::build_client;

/// Capability to forward an aggregate payload to the indicator service.
///
/// The returned handle is the only way to observe completion; the relay drops it.
pub trait IndicatorNotifier: Send + Sync {
    fn send_indicate(&self, payload: String) -> JoinHandle<()>;
}

#[derive(Clone)]
pub struct IndicatorClient {
    url: Arc<str>,
    client: reqwest::Client,
}

impl IndicatorClient {
    pub fn new(config: &Config) -> Self {
        let client = build_client(
            config.proxy_url.as_deref(),
            config.indicator_request_timeout(),
        )
        .unwrap_or_else(|e| {
            error!(
                "Unable to parse proxy configuration: {}, no proxy will be used",
                e
            );
            reqwest::Client::new()
        });
        IndicatorClient {
            url: config.indicator_url.as_str().into(),
            client,
        }
    }

    /// Posts one aggregate payload and reports the outcome.
    pub async fn post(&self, payload: String) -> Result<(), NotifyError> {
        let time = Instant::now();
        let response = self
            .client
            .post(self.url.as_ref())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status));
        }
        debug!(
            "Indicator | Successfully sent aggregate in {} ms to {}",
            time.elapsed().as_millis(),
            self.url
        );
        Ok(())
    }
}

impl IndicatorNotifier for IndicatorClient {
    fn send_indicate(&self, payload: String) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(e) = client.post(payload).await {
                error!("Indicator | Failed to send aggregate: {e}");
            }
        })
    }
}
