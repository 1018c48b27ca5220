// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Send an HTTP request over TCP and return the response
pub async fn send_tcp_request(
    addr: SocketAddr,
    uri: &str,
    method: &str,
    body: Option<Vec<u8>>,
) -> Result<Response<hyper::body::Incoming>, Box<dyn std::error::Error>> {
    let stream = timeout(Duration::from_secs(2), tokio::net::TcpStream::connect(addr)).await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let request_builder = Request::builder()
        .uri(uri)
        .method(method)
        .header("Host", addr.to_string())
        .header("Content-Type", "application/json");

    let request = match body {
        Some(body_data) => request_builder
            .header("Content-Length", body_data.len().to_string())
            .body(Full::new(Bytes::from(body_data)).boxed())?,
        None => request_builder.body(Empty::<Bytes>::new().boxed())?,
    };

    Ok(timeout(Duration::from_secs(2), sender.send_request(request)).await??)
}

/// Reads a response body to a string
pub async fn response_body(response: Response<hyper::body::Incoming>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("Response body is not UTF-8")
}

/// Polls `condition` until it holds or `limit` elapses
pub async fn wait_for(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let poll = async {
        while !condition() {
            sleep(Duration::from_millis(20)).await;
        }
    };
    timeout(limit, poll).await.is_ok()
}
