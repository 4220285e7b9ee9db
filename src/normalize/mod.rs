//! Response Normalizer: provider response shapes to [`ModelOutput`] and
//! request-side chat messages to [`NormalizedMessage`].
//!
//! Content is gated by [`NormalizeOptions::capture_content`]: when capture is
//! off the text is omitted (`None`), the message itself is kept.

pub mod chat;
pub mod responses;

pub use chat::{normalize_chat_completion, normalize_chat_messages};
pub use responses::normalize_responses;

use serde_json::Value;

use crate::config::TelemetryConfig;
use crate::error::CanonicalError;
use crate::protocol::canonical::ModelOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub capture_content: bool,
    pub convert_developer_to_system: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            capture_content: false,
            convert_developer_to_system: true,
        }
    }
}

impl From<&TelemetryConfig> for NormalizeOptions {
    fn from(config: &TelemetryConfig) -> Self {
        Self {
            capture_content: config.capture_content,
            convert_developer_to_system: config.convert_developer_to_system,
        }
    }
}

impl NormalizeOptions {
    pub(crate) fn gate(&self, content: String) -> Option<String> {
        self.capture_content.then_some(content)
    }
}

/// A finished provider response, tagged with its wire shape.
#[derive(Debug, Clone, Copy)]
pub enum ProviderResponse<'a> {
    /// Responses API object (`object: "response"`, `output: [...]`).
    Responses(&'a Value),
    /// Chat Completion object (`object: "chat.completion"`, `choices: [...]`).
    ChatCompletion(&'a Value),
}

impl<'a> ProviderResponse<'a> {
    /// Pick the wire shape from `object`, falling back to `output`/`choices`.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError::Translation`] when neither shape matches.
    pub fn detect(value: &'a Value) -> Result<Self, CanonicalError> {
        match value.get("object").and_then(Value::as_str) {
            Some("response") => return Ok(ProviderResponse::Responses(value)),
            Some("chat.completion") => return Ok(ProviderResponse::ChatCompletion(value)),
            _ => {}
        }
        if value.get("output").is_some_and(Value::is_array) {
            return Ok(ProviderResponse::Responses(value));
        }
        if value.get("choices").is_some_and(Value::is_array) {
            return Ok(ProviderResponse::ChatCompletion(value));
        }
        Err(CanonicalError::Translation(
            "unrecognized provider response shape".to_string(),
        ))
    }
}

/// One [`ModelOutput`] per provider output item, in provider order.
#[must_use]
pub fn normalize(response: ProviderResponse<'_>, options: &NormalizeOptions) -> Vec<ModelOutput> {
    match response {
        ProviderResponse::Responses(value) => normalize_responses(value, options),
        ProviderResponse::ChatCompletion(value) => normalize_chat_completion(value, options),
    }
}
