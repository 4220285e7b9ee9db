//! Telemetry Event Extractor.
//!
//! [`extract_messages`] and [`extract_outputs`] are pure: the same normalized
//! input always yields an equal event sequence. Emission goes through a
//! [`TelemetrySink`] and never feeds back into stream state.

pub mod sink;

pub use sink::{MemorySink, TelemetrySink, TracingSink};

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::config::TelemetryConfig;
use crate::normalize::{normalize, normalize_chat_messages, NormalizeOptions, ProviderResponse};
use crate::protocol::canonical::{CanonicalRole, ModelOutput, NormalizedMessage, NormalizedToolCall};

/// Event name for every response output event.
pub const CHOICE_EVENT: &str = "gen_ai.choice";

/// Ambient fields stamped on every extracted event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractContext {
    /// Provider label, e.g. `openai`.
    pub system: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessagePayload {
    pub content: String,
    /// Tool call id answered by a tool-result message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCallsPayload {
    pub tool_calls: Vec<NormalizedToolCall>,
}

/// Message body of a choice event. `content` serializes as `null` when it
/// was not captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoicePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolChoiceMessage {
    pub tool_calls: Vec<NormalizedToolCall>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolChoicePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    pub message: ToolChoiceMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TelemetryPayload {
    Message(MessagePayload),
    ToolCalls(ToolCallsPayload),
    Choice(ChoicePayload),
    ToolChoice(ToolChoicePayload),
}

impl TelemetryPayload {
    /// `index` of a multi-output choice event.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match self {
            TelemetryPayload::Choice(p) => p.index,
            TelemetryPayload::ToolChoice(p) => p.index,
            TelemetryPayload::Message(_) | TelemetryPayload::ToolCalls(_) => None,
        }
    }

    #[must_use]
    pub fn finish_reason(&self) -> Option<&str> {
        match self {
            TelemetryPayload::Choice(p) => p.finish_reason.as_deref(),
            TelemetryPayload::ToolChoice(p) => p.finish_reason.as_deref(),
            TelemetryPayload::Message(_) | TelemetryPayload::ToolCalls(_) => None,
        }
    }
}

/// One derived instrumentation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryEvent {
    pub name: String,
    pub role: CanonicalRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub payload: TelemetryPayload,
}

fn message_event_name(role: CanonicalRole) -> String {
    format!("gen_ai.{}.message", role.as_str())
}

/// Events for request-side messages, named `gen_ai.<role>.message`.
#[must_use]
pub fn extract_messages(messages: &[NormalizedMessage], context: &ExtractContext) -> Vec<TelemetryEvent> {
    let mut events = Vec::new();
    for message in messages {
        let name = message_event_name(message.role);
        push_message_events(&mut events, &name, message, context);
    }
    events
}

/// Events for response outputs, named `gen_ai.choice`.
///
/// Every output message yields a choice event whether or not its content was
/// captured. `index` and `finish_reason` are attached only when there is more
/// than one output.
#[must_use]
pub fn extract_outputs(outputs: &[ModelOutput], context: &ExtractContext) -> Vec<TelemetryEvent> {
    let multi = outputs.len() > 1;
    let mut events = Vec::new();
    for output in outputs {
        let (index, finish_reason) = if multi {
            (Some(output.index), output.finish_reason.clone())
        } else {
            (None, None)
        };
        for message in &output.messages {
            let event = |payload| TelemetryEvent {
                name: CHOICE_EVENT.to_owned(),
                role: message.role,
                system: context.system.clone(),
                payload,
            };
            if message.tool_calls.is_empty() || message.non_empty_content().is_some() {
                events.push(event(TelemetryPayload::Choice(ChoicePayload {
                    index,
                    finish_reason: finish_reason.clone(),
                    message: ChoiceMessage {
                        content: message.non_empty_content().map(str::to_owned),
                    },
                })));
            }
            if !message.tool_calls.is_empty() {
                events.push(event(TelemetryPayload::ToolChoice(ToolChoicePayload {
                    index,
                    finish_reason: finish_reason.clone(),
                    message: ToolChoiceMessage {
                        tool_calls: message.tool_calls.to_vec(),
                    },
                })));
            }
        }
    }
    events
}

fn push_message_events(
    events: &mut Vec<TelemetryEvent>,
    name: &str,
    message: &NormalizedMessage,
    context: &ExtractContext,
) {
    if let Some(content) = message.non_empty_content() {
        let id = match message.role {
            CanonicalRole::Tool => message.tool_calls.first().map(|call| call.id.clone()),
            _ => None,
        };
        events.push(TelemetryEvent {
            name: name.to_owned(),
            role: message.role,
            system: context.system.clone(),
            payload: TelemetryPayload::Message(MessagePayload {
                content: content.to_owned(),
                id,
            }),
        });
    }

    if !message.tool_calls.is_empty() {
        events.push(TelemetryEvent {
            name: name.to_owned(),
            role: message.role,
            system: context.system.clone(),
            payload: TelemetryPayload::ToolCalls(ToolCallsPayload {
                tool_calls: message.tool_calls.to_vec(),
            }),
        });
    }
}

// ---------------------------------------------------------------------------
// Emission
// ---------------------------------------------------------------------------

/// Normalizes provider data and hands the extracted events to a sink.
#[derive(Clone)]
pub struct TelemetryEmitter {
    sink: Arc<dyn TelemetrySink>,
    options: NormalizeOptions,
    context: ExtractContext,
    enabled: bool,
}

impl TelemetryEmitter {
    #[must_use]
    pub fn new(sink: Arc<dyn TelemetrySink>, options: NormalizeOptions, context: ExtractContext) -> Self {
        Self {
            sink,
            options,
            context,
            enabled: true,
        }
    }

    #[must_use]
    pub fn from_config(config: &TelemetryConfig, sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            sink,
            options: NormalizeOptions::from(config),
            context: ExtractContext {
                system: config.system.clone(),
            },
            enabled: config.enabled,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Events for a finished provider response, without emitting them.
    ///
    /// An unrecognized response shape yields no events.
    #[must_use]
    pub fn response_events(&self, response: &Value) -> Vec<TelemetryEvent> {
        match ProviderResponse::detect(response) {
            Ok(response) => extract_outputs(&normalize(response, &self.options), &self.context),
            Err(err) => {
                tracing::debug!("no telemetry for response: {err}");
                Vec::new()
            }
        }
    }

    /// Emit events for a finished provider response. Returns the number emitted.
    pub fn emit_response(&self, response: &Value) -> usize {
        if !self.enabled {
            return 0;
        }
        let events = self.response_events(response);
        self.emit_all(&events)
    }

    /// Emit events for request-side chat messages. Returns the number emitted.
    pub fn emit_messages(&self, messages: &[Value]) -> usize {
        if !self.enabled {
            return 0;
        }
        let normalized = normalize_chat_messages(messages, &self.options);
        let events = extract_messages(&normalized, &self.context);
        self.emit_all(&events)
    }

    fn emit_all(&self, events: &[TelemetryEvent]) -> usize {
        for event in events {
            self.sink.emit(event);
        }
        events.len()
    }
}

impl std::fmt::Debug for TelemetryEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryEmitter")
            .field("options", &self.options)
            .field("context", &self.context)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
