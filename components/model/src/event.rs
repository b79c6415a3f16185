use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EncodeError;

/// Records are newline-delimited on disk, independent of the platform the writer runs on.
pub const EVENT_DELIMITER: &[u8] = b"\n";

/// A record delivered by the event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct EventData {
    pub body: Bytes,

    /// Opaque stream position token, the value a checkpoint records.
    pub offset: String,

    pub sequence_number: i64,

    pub enqueued_time: DateTime<Utc>,

    pub partition_key: Option<String>,

    pub properties: BTreeMap<String, String>,
}

impl EventData {
    pub fn new(body: impl Into<Bytes>, offset: impl Into<String>, sequence_number: i64) -> Self {
        Self {
            body: body.into(),
            offset: offset.into(),
            sequence_number,
            enqueued_time: Utc::now(),
            partition_key: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// True if the body is not valid UTF-8 and [`Self::encode`] has to embed it lossily.
    pub fn is_malformed(&self) -> bool {
        std::str::from_utf8(&self.body).is_err()
    }

    pub fn with_partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    /// Serialize into the on-disk line format, delimiter included.
    ///
    /// A body that parses as JSON is embedded as a JSON value; any other text is embedded as a
    /// JSON string. Invalid UTF-8 sequences are replaced with U+FFFD, so every body is written.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let text = String::from_utf8_lossy(&self.body);
        let payload = serde_json::from_str::<Value>(&text)
            .unwrap_or_else(|_| Value::String(text.into_owned()));
        let event = ColdStorageEvent {
            properties: self.properties.clone(),
            offset: self.offset.clone(),
            payload,
        };
        let mut buf = serde_json::to_vec(&event)?;
        buf.extend_from_slice(EVENT_DELIMITER);
        Ok(buf)
    }
}

/// One line of a cold storage blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColdStorageEvent {
    #[serde(rename = "Properties")]
    pub properties: BTreeMap<String, String>,

    #[serde(rename = "Offset")]
    pub offset: String,

    #[serde(rename = "Payload")]
    pub payload: Value,
}

impl ColdStorageEvent {
    /// Parse every delimited line of a blob.
    pub fn parse_lines(data: &[u8]) -> Result<Vec<ColdStorageEvent>, serde_json::Error> {
        data.split(|b| *b == EVENT_DELIMITER[0])
            .filter(|line| !line.is_empty())
            .map(serde_json::from_slice)
            .collect()
    }
}
