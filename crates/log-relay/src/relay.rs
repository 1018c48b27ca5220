// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::broker::Publisher;
use crate::error::RelayError;
use crate::event::{self, LogBatch};
use crate::indicator::IndicatorNotifier;

/// Republishes every entry of a batch to the broker and forwards the entries whose `eventType`
/// matches the trigger to the indicator service as one aggregate.
pub struct LogRelay {
    publisher: Arc<dyn Publisher>,
    notifier: Arc<dyn IndicatorNotifier>,
    topic: String,
    trigger_event_type: String,
}

impl LogRelay {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        notifier: Arc<dyn IndicatorNotifier>,
        topic: impl Into<String>,
        trigger_event_type: impl Into<String>,
    ) -> Self {
        LogRelay {
            publisher,
            notifier,
            topic: topic.into(),
            trigger_event_type: trigger_event_type.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn trigger_event_type(&self) -> &str {
        &self.trigger_event_type
    }

    /// Runs one pass over the batch. Neither dispatch is awaited.
    ///
    /// A serialization failure stops the batch at the failing entry; entries before it have
    /// already been handed to the broker.
    pub fn relay<T: Serialize>(&self, batch: &LogBatch<T>) -> Result<(), RelayError> {
        let mut matched = Vec::new();

        for (index, entry) in batch.data.iter().enumerate() {
            let serialized = event::serialize(entry)
                .map_err(|source| RelayError::Serialization { index, source })?;

            self.publisher
                .publish(&self.topic, serialized.as_str().to_owned());

            let event_type = event::extract_event_type(serialized.as_str())
                .map_err(|source| RelayError::Serialization { index, source })?;
            if event_type.as_deref() == Some(self.trigger_event_type.as_str()) {
                matched.push(serialized);
            }
        }

        debug!(
            server_info = %batch.server_info,
            send_time = %batch.send_time,
            entries = batch.data.len(),
            matched = matched.len(),
            "Relayed log batch"
        );

        if matched.is_empty() {
            return Ok(());
        }

        let payload = event::aggregate_payload(&matched).map_err(RelayError::Aggregate)?;
        // detached: delivery is the notifier's concern
        drop(self.notifier.send_indicate(payload));
        Ok(())
    }
}
