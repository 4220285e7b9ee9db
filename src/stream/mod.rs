pub mod sse;

pub use sse::{record_stream, FrameDecoder};

use crate::error::DecodeError;

/// One decoded logical record from the raw stream: an optional event name
/// plus the JSON payload of its `data:` line.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub event: Option<String>,
    pub data: serde_json::Value,
}

/// Outcome of decoding one data line. A failure covers that line only.
pub type DecodedRecord = Result<Record, DecodeError>;

impl Record {
    #[must_use]
    pub fn new(event: Option<String>, data: serde_json::Value) -> Self {
        Self { event, data }
    }

    /// The payload's `type` discriminator, when it is a string.
    #[must_use]
    pub fn data_type(&self) -> Option<&str> {
        self.data.get("type").and_then(serde_json::Value::as_str)
    }

    #[must_use]
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(serde_json::Value::as_str)
    }
}

/// OpenAI-style end sentinel; carries no payload and is never surfaced.
#[must_use]
pub fn is_done_payload(payload: &str) -> bool {
    payload.trim() == "[DONE]"
}
