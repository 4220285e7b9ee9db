use serde::Deserialize;
use serde_json::Value;
use smallvec::smallvec;

use super::NormalizeOptions;
use crate::protocol::canonical::{CanonicalRole, ModelOutput, NormalizedMessage, NormalizedToolCall};
use crate::protocol::mapping::{responses_finish_reason, usage_to_canonical};
use crate::protocol::openai_responses::{ResponsesContentPart, ResponsesOutput, ResponsesOutputItem};

/// Normalize a Responses API object. Each output item is parsed on its own;
/// an item that fails to parse becomes an empty output at its index.
#[must_use]
pub fn normalize_responses(response: &Value, options: &NormalizeOptions) -> Vec<ModelOutput> {
    let parsed = match ResponsesOutput::deserialize(response) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::warn!("responses object could not be normalized: {err}");
            return Vec::new();
        }
    };

    let usage = parsed.usage.as_ref().and_then(usage_to_canonical);
    let status = parsed.status.as_deref();
    let incomplete_reason = parsed
        .incomplete_details
        .as_ref()
        .and_then(|details| details.reason.as_deref());

    parsed
        .output
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let item = match ResponsesOutputItem::deserialize(raw) {
                Ok(item) => item,
                Err(err) => {
                    tracing::warn!(index, "output item degraded to empty output: {err}");
                    return ModelOutput::empty(index);
                }
            };
            let Some(message) = item_message(&item, options) else {
                return ModelOutput::empty(index);
            };
            ModelOutput {
                messages: vec![message],
                finish_reason: responses_finish_reason(status, incomplete_reason, item.is_tool_call()),
                usage,
                index,
            }
        })
        .collect()
}

fn item_message(item: &ResponsesOutputItem, options: &NormalizeOptions) -> Option<NormalizedMessage> {
    let call = match item {
        ResponsesOutputItem::Message { content, .. } => {
            let text = join_text_parts(content);
            return Some(NormalizedMessage::text(
                CanonicalRole::Assistant,
                options.gate(text),
            ));
        }
        ResponsesOutputItem::FunctionCall {
            id,
            call_id,
            name,
            arguments,
        } => NormalizedToolCall {
            id: call_id.clone().or_else(|| id.clone()).unwrap_or_default(),
            name: name.clone(),
            arguments: arguments.clone().and_then(|a| options.gate(a)),
        },
        ResponsesOutputItem::CustomToolCall {
            id,
            call_id,
            name,
            input,
        } => NormalizedToolCall {
            id: call_id.clone().or_else(|| id.clone()).unwrap_or_default(),
            name: name.clone(),
            arguments: input.clone().and_then(|a| options.gate(a)),
        },
        ResponsesOutputItem::McpCall {
            id,
            name,
            arguments,
            ..
        } => NormalizedToolCall {
            id: id.clone(),
            name: name.clone(),
            arguments: arguments.clone().and_then(|a| options.gate(a)),
        },
        ResponsesOutputItem::Other => return None,
    };
    Some(NormalizedMessage::with_tool_calls(
        CanonicalRole::Assistant,
        smallvec![call],
    ))
}

fn join_text_parts(parts: &[ResponsesContentPart]) -> String {
    let mut out = String::new();
    for part in parts {
        let text = match part {
            ResponsesContentPart::OutputText { text } => text,
            ResponsesContentPart::Refusal { refusal } => refusal,
            ResponsesContentPart::Other => continue,
        };
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(text);
    }
    out
}
