// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use core::time::Duration;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::{
    body::Body,
    header,
    http::{self, HeaderMap},
    Response, StatusCode,
};
use serde_json::json;
use std::error::Error;
use tracing::{debug, error};

use crate::error::BodyRejection;

pub type HttpResponse = Response<Full<Bytes>>;

/// Logs `message` (debug for 2xx, error otherwise) and answers `{"message": message}` as JSON.
pub fn log_and_respond(message: &str, status: StatusCode) -> http::Result<HttpResponse> {
    if status.is_success() {
        debug!("{message}");
    } else {
        error!("{message}");
    }
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(
            json!({ "message": message }).to_string(),
        )))
}

/// Same as [`log_and_respond`] but with an empty body. Accepted log batches get no body.
pub fn log_and_respond_empty(message: &str, status: StatusCode) -> http::Result<HttpResponse> {
    debug!("{message}");
    Response::builder().status(status).body(Full::new(Bytes::new()))
}

pub fn rejection_response(context: &str, rejection: &BodyRejection) -> http::Result<HttpResponse> {
    log_and_respond(&format!("{context}: {rejection}"), rejection.status())
}

/// Checks the framing headers of a request against `limit`.
///
/// A declared Content-Length must parse and fit. Without one the body has to be sent with
/// Transfer-Encoding, in which case the size is enforced by [`read_body`] instead.
pub fn check_declared_length(headers: &HeaderMap, limit: usize) -> Result<(), BodyRejection> {
    let Some(value) = headers.get(header::CONTENT_LENGTH) else {
        return match headers.get(header::TRANSFER_ENCODING) {
            Some(encoding) => {
                debug!("Reading body sent with Transfer-Encoding {:?}", encoding);
                Ok(())
            }
            None => Err(BodyRejection::LengthRequired),
        };
    };

    let declared = value
        .to_str()
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .ok_or(BodyRejection::InvalidLength)?;
    if declared > limit {
        return Err(BodyRejection::TooLarge);
    }
    Ok(())
}

/// Buffers a request body, stopping as soon as more than `limit` bytes have arrived.
pub async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, BodyRejection>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(BodyRejection::TooLarge),
        Err(e) => Err(BodyRejection::Unreadable(e.to_string())),
    }
}

/// Builds a reqwest client with optional proxy configuration and timeout, using rustls.
pub fn build_client(
    proxy_url: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(timeout);
    if let Some(proxy) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    Ok(builder.build()?)
}
