// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use hyper::body::{Body, Bytes};
use hyper::service::service_fn;
use hyper::{http, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::RelayError;
use crate::event::LogBatch;
use crate::http_utils::{
    check_declared_length, log_and_respond, log_and_respond_empty, read_body,
    rejection_response, HttpResponse,
};
use crate::relay::LogRelay;

pub const LOG_ENDPOINT_PATH: &str = "/api/log";
pub const INFO_ENDPOINT_PATH: &str = "/info";

pub struct RelayServer {
    pub config: Arc<Config>,
    pub relay: Arc<LogRelay>,
}

impl RelayServer {
    /// Binds the configured address and serves until `cancel` fires or the broker service dies.
    pub async fn start_relay_server(
        &self,
        broker_task: &mut JoinHandle<()>,
        cancel: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let now = Instant::now();
        let addr = SocketAddr::new(self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!("Log relay started: listening on {}", listener.local_addr()?);
        debug!(
            "Time taken to start the log relay: {} ms",
            now.elapsed().as_millis()
        );

        self.serve(listener, broker_task, cancel).await
    }

    /// Accepts connections on `listener`, one task per connection. Cancellation wins over any
    /// other pending event.
    pub async fn serve(
        &self,
        listener: tokio::net::TcpListener,
        broker_task: &mut JoinHandle<()>,
        cancel: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let relay = self.relay.clone();
        let config = self.config.clone();
        let service = service_fn(move |req| {
            RelayServer::endpoint_handler(config.clone(), req, relay.clone())
        });

        let http1 = hyper::server::conn::http1::Builder::new();
        let mut connections = tokio::task::JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Log relay shutting down");
                    return Ok(());
                }
                result = &mut *broker_task => {
                    error!("Broker service died: {:?}", result);
                    return Err("Broker service terminated unexpectedly".into());
                }
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            error!("Connection handler panicked: {:?}", e);
                        }
                    }
                }
                accepted = listener.accept() => {
                    let stream = match accepted {
                        Ok((stream, _)) => stream,
                        Err(e) if is_transient_accept_error(&e) => {
                            debug!("Connection dropped before it was accepted: {e}");
                            continue;
                        }
                        Err(e) => {
                            error!("Server error: {e}");
                            return Err(e.into());
                        }
                    };
                    let connection = http1.serve_connection(TokioIo::new(stream), service.clone());
                    connections.spawn(async move {
                        if let Err(e) = connection.await {
                            error!("Connection error: {e}");
                        }
                    });
                }
            }
        }
    }

    pub async fn endpoint_handler<B>(
        config: Arc<Config>,
        req: Request<B>,
        relay: Arc<LogRelay>,
    ) -> http::Result<HttpResponse>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        match (req.method(), req.uri().path()) {
            (&Method::POST, LOG_ENDPOINT_PATH) => Self::log_handler(config, req, relay).await,
            (&Method::GET, INFO_ENDPOINT_PATH) => Self::info_handler(&config, &relay),
            _ => {
                let mut not_found = Response::default();
                *not_found.status_mut() = StatusCode::NOT_FOUND;
                Ok(not_found)
            }
        }
    }

    async fn log_handler<B>(
        config: Arc<Config>,
        req: Request<B>,
        relay: Arc<LogRelay>,
    ) -> http::Result<HttpResponse>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let limit = config.max_request_content_length;
        let (parts, body) = req.into_parts();
        let read = async {
            check_declared_length(&parts.headers, limit)?;
            read_body(body, limit).await
        };
        let body_bytes = match read.await {
            Ok(bytes) => bytes,
            Err(rejection) => return rejection_response("Error processing log batch", &rejection),
        };

        let batch: LogBatch = match serde_json::from_slice(&body_bytes) {
            Ok(batch) => batch,
            Err(e) => {
                return log_and_respond(
                    &format!("Error deserializing log batch: {e}"),
                    StatusCode::BAD_REQUEST,
                );
            }
        };

        relay_response(relay.relay(&batch), batch.data.len())
    }

    fn info_handler(config: &Config, relay: &LogRelay) -> http::Result<HttpResponse> {
        let response_json = json!(
            {
                "endpoints": [
                    LOG_ENDPOINT_PATH,
                    INFO_ENDPOINT_PATH
                ],
                "config": {
                    "port": config.port,
                    "topic": relay.topic(),
                    "trigger_event_type": relay.trigger_event_type(),
                    "max_request_content_length": config.max_request_content_length
                }
            }
        );
        Response::builder()
            .status(200)
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .body(http_body_util::Full::new(Bytes::from(
                response_json.to_string(),
            )))
    }
}

/// Maps the outcome of relaying a batch of `entries` entries to the answer for its sender.
fn relay_response(outcome: Result<(), RelayError>, entries: usize) -> http::Result<HttpResponse> {
    match outcome {
        Ok(()) => log_and_respond_empty(
            &format!("Accepted log batch of {entries} entries"),
            StatusCode::OK,
        ),
        Err(e) => log_and_respond(
            &format!("Error relaying log batch: {e}"),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    }
}

/// Accept failures caused by the peer going away; the listener itself is still healthy.
fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
    )
}
