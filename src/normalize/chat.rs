use serde::Deserialize;
use serde_json::Value;
use smallvec::{smallvec, SmallVec};

use super::NormalizeOptions;
use crate::protocol::canonical::{CanonicalRole, ModelOutput, NormalizedMessage, NormalizedToolCall};
use crate::protocol::mapping::{chat_role_to_canonical, usage_to_canonical};
use crate::protocol::openai_chat::{OpenAiChatResponse, OpenAiChoice, OpenAiMessage, OpenAiToolCall};

/// Normalize a Chat Completion object, one output per choice.
#[must_use]
pub fn normalize_chat_completion(response: &Value, options: &NormalizeOptions) -> Vec<ModelOutput> {
    let parsed = match OpenAiChatResponse::deserialize(response) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::warn!("chat completion could not be normalized: {err}");
            return Vec::new();
        }
    };
    let usage = parsed.usage.as_ref().and_then(usage_to_canonical);

    parsed
        .choices
        .iter()
        .enumerate()
        .map(|(index, raw)| match OpenAiChoice::deserialize(raw) {
            Ok(choice) => ModelOutput {
                messages: vec![choice_message(&choice.message, options)],
                finish_reason: choice.finish_reason,
                usage,
                index,
            },
            Err(err) => {
                tracing::warn!(index, "choice degraded to empty output: {err}");
                ModelOutput::empty(index)
            }
        })
        .collect()
}

fn choice_message(message: &OpenAiMessage, options: &NormalizeOptions) -> NormalizedMessage {
    let role = chat_role_to_canonical(&message.role, options.convert_developer_to_system)
        .unwrap_or(CanonicalRole::Assistant);
    match message.tool_calls.as_deref() {
        Some(calls) if !calls.is_empty() => {
            NormalizedMessage::with_tool_calls(role, tool_calls(calls, options))
        }
        _ => NormalizedMessage::text(role, message_text(message, options)),
    }
}

/// Normalize request-side chat messages.
///
/// Messages that fail to parse, and roles with no canonical mapping
/// (including `developer` when conversion is off), are dropped.
#[must_use]
pub fn normalize_chat_messages(messages: &[Value], options: &NormalizeOptions) -> Vec<NormalizedMessage> {
    let mut out = Vec::with_capacity(messages.len());
    for (index, raw) in messages.iter().enumerate() {
        let message = match OpenAiMessage::deserialize(raw) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(index, "request message skipped: {err}");
                continue;
            }
        };
        let Some(role) = chat_role_to_canonical(&message.role, options.convert_developer_to_system)
        else {
            tracing::debug!(index, role = %message.role, "request message role not mapped");
            continue;
        };
        out.push(request_message(role, &message, options));
    }
    out
}

fn request_message(
    role: CanonicalRole,
    message: &OpenAiMessage,
    options: &NormalizeOptions,
) -> NormalizedMessage {
    match role {
        CanonicalRole::Assistant => choice_message(message, options),
        CanonicalRole::Tool => NormalizedMessage {
            role,
            content: message_text(message, options),
            tool_calls: smallvec![NormalizedToolCall {
                id: message.tool_call_id.clone().unwrap_or_default(),
                name: message.name.clone().unwrap_or_default(),
                arguments: None,
            }],
        },
        CanonicalRole::System | CanonicalRole::User => {
            NormalizedMessage::text(role, message_text(message, options))
        }
    }
}

fn message_text(message: &OpenAiMessage, options: &NormalizeOptions) -> Option<String> {
    let text = message.content.as_ref()?.joined_text();
    options.gate(text)
}

fn tool_calls(
    calls: &[OpenAiToolCall],
    options: &NormalizeOptions,
) -> SmallVec<[NormalizedToolCall; 1]> {
    calls
        .iter()
        .map(|call| NormalizedToolCall {
            id: call.id.clone(),
            name: call.function.name.clone(),
            arguments: call.function.arguments.clone().and_then(|a| options.gate(a)),
        })
        .collect()
}
