// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Canonical JSON encoding of log entries.
//!
//! Everything here is a free function over borrowed data, so batches processed on different
//! tasks never share serializer state.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::error::SerializationError;

pub const EVENT_TYPE_KEY: &str = "eventType";

/// One inbound request worth of log entries. Entries default to raw JSON values; numbers keep
/// their original text and objects their original key order.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogBatch<T = Value> {
    pub server_info: String,
    pub data: Vec<T>,
    pub send_time: String,
}

/// Canonical JSON text of a single log entry.
///
/// Held as a raw fragment so it is embedded verbatim in the aggregate payload instead of being
/// encoded a second time as a string.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct SerializedEntry(Box<RawValue>);

impl SerializedEntry {
    pub fn as_str(&self) -> &str {
        self.0.get()
    }
}

impl PartialEq for SerializedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

#[derive(Serialize)]
struct AggregatePayload<'a> {
    data: &'a [SerializedEntry],
}

/// Encodes a record to its canonical JSON text.
///
/// `serde_json::Value` objects keep their insertion order and numbers their parsed text, so the
/// same record always yields the same text.
pub fn serialize<T: Serialize + ?Sized>(record: &T) -> Result<SerializedEntry, SerializationError> {
    serde_json::value::to_raw_value(record)
        .map(SerializedEntry)
        .map_err(SerializationError::Encode)
}

/// Returns the string bound to `eventType`, or `None` if it is missing, not a string, or the
/// record is not an object.
pub fn extract_event_type(serialized: &str) -> Result<Option<String>, SerializationError> {
    let record: Value = serde_json::from_str(serialized).map_err(SerializationError::Decode)?;
    Ok(record
        .get(EVENT_TYPE_KEY)
        .and_then(Value::as_str)
        .map(str::to_owned))
}

/// Builds `{"data":[...]}` from already serialized entries, preserving their order.
pub fn aggregate_payload(matched: &[SerializedEntry]) -> Result<String, SerializationError> {
    serde_json::to_string(&AggregatePayload { data: matched }).map_err(SerializationError::Encode)
}
