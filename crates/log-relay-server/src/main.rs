// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, future::Future, io, sync::Arc};
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use log_relay::{
    broker::{BrokerService, RestProxyTransport},
    config,
    indicator::IndicatorClient,
    relay::LogRelay,
    relay_server::RelayServer,
};

const BROKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
pub async fn main() {
    let log_level = env::var("RELAY_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match config::Config::new() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Error creating config on log relay startup: {e}");
            return;
        }
    };

    let (broker_service, broker_handle) =
        BrokerService::new(RestProxyTransport::new(&config), &config);
    let mut broker_task = tokio::spawn(broker_service.run());

    let relay = Arc::new(LogRelay::new(
        Arc::new(broker_handle),
        Arc::new(IndicatorClient::new(&config)),
        config.topic_name.clone(),
        config.trigger_event_type.clone(),
    ));

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), cancel.clone()));

    let server = RelayServer {
        config: Arc::clone(&config),
        relay,
    };

    if let Err(e) = server.start_relay_server(&mut broker_task, cancel).await {
        error!("Error when running log relay: {e:?}");
    }
    if broker_task.is_finished() {
        return;
    }

    // dropping the server drops the last publisher handle, which lets the broker service drain
    drop(server);
    match timeout(BROKER_DRAIN_TIMEOUT, broker_task).await {
        Ok(Ok(())) => debug!("Broker service drained"),
        Ok(Err(e)) => error!("Broker service failed: {e}"),
        Err(_) => error!(
            "Broker service did not drain within {} s",
            BROKER_DRAIN_TIMEOUT.as_secs()
        ),
    }
}

/// Cancels `cancel` once `signal` fires. If the signal cannot be listened for, the relay keeps
/// running and can only be stopped externally.
async fn cancel_on_signal<F>(signal: F, cancel: CancellationToken)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Received shutdown signal");
            cancel.cancel();
        }
        Err(e) => error!("Unable to listen for shutdown signal: {e}"),
    }
}
