// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// A log entry could not be converted to or from its canonical JSON text.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Failed to encode log entry: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode serialized log entry: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Errors that terminate processing of a single batch.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Error serializing entry {index} of batch: {source}")]
    Serialization {
        index: usize,
        #[source]
        source: SerializationError,
    },

    #[error("Error building aggregate payload: {0}")]
    Aggregate(#[source] SerializationError),
}

/// Errors raised while delivering messages to the broker. These stay inside the broker service.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Broker service is no longer accepting messages")]
    ChannelClosed,

    #[error("Failed to prepare broker payload: {0}")]
    Payload(String),

    #[error("Error shipping to broker: {0:?} {1}")]
    Destination(Option<StatusCode>, String),
}

impl PublishError {
    /// 4xx answers from the broker will not get better by retrying.
    pub fn is_permanent(&self) -> bool {
        match self {
            PublishError::ChannelClosed | PublishError::Payload(_) => true,
            PublishError::Destination(status, _) => status.is_some_and(|s| s.is_client_error()),
        }
    }
}

/// A request body refused before or while it was read.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum BodyRejection {
    #[error("Missing Content-Length and Transfer-Encoding header")]
    LengthRequired,

    #[error("Invalid Content-Length header")]
    InvalidLength,

    #[error("Payload too large")]
    TooLarge,

    #[error("Unable to read body: {0}")]
    Unreadable(String),
}

impl BodyRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            BodyRejection::LengthRequired => StatusCode::LENGTH_REQUIRED,
            BodyRejection::InvalidLength | BodyRejection::Unreadable(_) => StatusCode::BAD_REQUEST,
            BodyRejection::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

/// Errors raised while forwarding an aggregate to the indicator service.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Indicator request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Indicator responded with status {0}")]
    Status(StatusCode),
}
