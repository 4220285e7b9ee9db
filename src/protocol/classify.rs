//! Event Classifier: decides the semantic kind of a decoded record.
//!
//! Precedence, first match wins:
//! 1. explicit error (event name, error-shaped payload, or `type == "error"`)
//! 2. `response.completed`
//! 3. `response.output_text.delta`
//! 4. `response.output_text.done`
//! 5. tool lifecycle `response.<identifier>.<phase>` and agentic-search iterations
//! 6. anything else is unrecognized and passed through

use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::Value;

use super::canonical::CanonicalUsage;
use super::event_types::{
    AGENTIC_SEARCH_ITERATION, ERROR, OUTPUT_TEXT_DELTA, OUTPUT_TEXT_DONE, PHASE_COMPLETED,
    PHASE_EXECUTING, PHASE_IN_PROGRESS, RESPONSE_COMPLETED, TOOL_AGENTIC_SEARCH,
};
use super::mapping::usage_to_canonical;
use crate::aggregator::router::{ToolDescriptor, ToolEventRouter};
use crate::aggregator::state::{AgenticSearchLogEntry, StreamFailure};
use crate::stream::Record;

const DEFAULT_ERROR_CODE: &str = "stream_error";
const DEFAULT_ERROR_MESSAGE: &str = "Unknown error";

static TOOL_EVENT_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^response\.([A-Za-z0-9_-]+)\.(in_progress|executing|completed)$").ok()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolPhase {
    /// `in_progress` or `executing`.
    Start,
    /// `completed`.
    Complete,
}

impl ToolPhase {
    #[must_use]
    pub fn parse(phase: &str) -> Option<Self> {
        match phase {
            PHASE_IN_PROGRESS | PHASE_EXECUTING => Some(ToolPhase::Start),
            PHASE_COMPLETED => Some(ToolPhase::Complete),
            _ => None,
        }
    }
}

/// A resolved tool lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolEvent {
    pub identifier: String,
    pub phase: ToolPhase,
    pub descriptor: ToolDescriptor,
}

/// Semantic kind of one record.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Error(StreamFailure),
    ResponseCompleted {
        response_id: Option<String>,
        usage: Option<CanonicalUsage>,
    },
    TextDelta {
        delta: String,
    },
    TextDone {
        text: Option<String>,
    },
    Tool(ToolEvent),
    AgenticSearchIteration {
        descriptor: ToolDescriptor,
        entry: AgenticSearchLogEntry,
    },
    Unrecognized,
}

impl EventKind {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Error(_) => "error",
            EventKind::ResponseCompleted { .. } => "response_completed",
            EventKind::TextDelta { .. } => "text_delta",
            EventKind::TextDone { .. } => "text_done",
            EventKind::Tool(ToolEvent {
                phase: ToolPhase::Start,
                ..
            }) => "tool_start",
            EventKind::Tool(ToolEvent {
                phase: ToolPhase::Complete,
                ..
            }) => "tool_complete",
            EventKind::AgenticSearchIteration { .. } => "agentic_search_iteration",
            EventKind::Unrecognized => "unrecognized",
        }
    }
}

/// Classify a decoded record.
#[must_use]
pub fn classify(record: &Record, router: &ToolEventRouter) -> EventKind {
    if let Some(failure) = upstream_failure(record) {
        return EventKind::Error(failure);
    }

    let Some(data_type) = record.data_type() else {
        return EventKind::Unrecognized;
    };

    match data_type {
        RESPONSE_COMPLETED => EventKind::ResponseCompleted {
            response_id: completed_response_id(&record.data),
            usage: record
                .data
                .get("response")
                .and_then(|response| response.get("usage"))
                .and_then(usage_to_canonical),
        },
        OUTPUT_TEXT_DELTA => EventKind::TextDelta {
            delta: record.str_field("delta").unwrap_or_default().to_owned(),
        },
        OUTPUT_TEXT_DONE => EventKind::TextDone {
            text: record.str_field("text").map(str::to_owned),
        },
        AGENTIC_SEARCH_ITERATION => match router.resolve(TOOL_AGENTIC_SEARCH) {
            Some(descriptor) => EventKind::AgenticSearchIteration {
                descriptor,
                entry: search_log_entry(&record.data),
            },
            None => EventKind::Unrecognized,
        },
        other => classify_tool_event(other, router).unwrap_or(EventKind::Unrecognized),
    }
}

fn classify_tool_event(data_type: &str, router: &ToolEventRouter) -> Option<EventKind> {
    let re = TOOL_EVENT_RE.as_ref()?;
    let captures = re.captures(data_type)?;
    let identifier = captures.get(1)?.as_str();
    let phase = ToolPhase::parse(captures.get(2)?.as_str())?;
    let descriptor = router.resolve(identifier)?;
    Some(EventKind::Tool(ToolEvent {
        identifier: identifier.to_owned(),
        phase,
        descriptor,
    }))
}

/// Detect an upstream error record and extract `{code, message}`.
#[must_use]
pub fn upstream_failure(record: &Record) -> Option<StreamFailure> {
    let data = &record.data;
    let named_error = record.event.as_deref() == Some(ERROR);
    let code_and_message = data.get("code").is_some() && data.get("message").is_some();
    let error_field = data.get("error").is_some_and(|error| !error.is_null());
    let typed_error = record.data_type() == Some(ERROR);

    if !(named_error || code_and_message || error_field || typed_error) {
        return None;
    }

    let nested = data.get("error");
    let code = scalar_text(data.get("code"))
        .or_else(|| nested.and_then(|error| scalar_text(error.get("code"))))
        .or_else(|| nested.and_then(|error| scalar_text(error.get("type"))))
        .unwrap_or_else(|| DEFAULT_ERROR_CODE.to_owned());
    let message = scalar_text(data.get("message"))
        .or_else(|| nested.and_then(|error| scalar_text(error.get("message"))))
        .or_else(|| nested.and_then(|error| error.as_str().map(str::to_owned)))
        .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_owned());

    Some(StreamFailure::new(code, message))
}

fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn completed_response_id(data: &Value) -> Option<String> {
    data.get("response")
        .and_then(|response| response.get("id"))
        .or_else(|| data.get("response_id"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn search_log_entry(data: &Value) -> AgenticSearchLogEntry {
    let as_u32 = |field: &str| {
        data.get(field)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    };

    let mut citations: Vec<String> = Vec::new();
    if let Some(items) = data.get("citations").and_then(Value::as_array) {
        for citation in items.iter().filter_map(Value::as_str) {
            if !citations.iter().any(|existing| existing == citation) {
                citations.push(citation.to_owned());
            }
        }
    }

    AgenticSearchLogEntry {
        iteration: as_u32("iteration").unwrap_or(0),
        query: data
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        reasoning: data
            .get("reasoning")
            .and_then(Value::as_str)
            .map(str::to_owned),
        citations,
        remaining_iterations: as_u32("remaining_iterations"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(data: Value) -> Record {
        Record::new(None, data)
    }

    fn router() -> ToolEventRouter {
        ToolEventRouter::with_builtin_tools()
    }

    #[test]
    fn error_shapes_are_detected() {
        let named = Record::new(Some("error".into()), json!({"detail": "boom"}));
        assert_eq!(
            classify(&named, &router()),
            EventKind::Error(StreamFailure::new("stream_error", "Unknown error"))
        );

        let code_message = record(json!({"code": "rate_limited", "message": "too many requests"}));
        assert_eq!(
            classify(&code_message, &router()),
            EventKind::Error(StreamFailure::new("rate_limited", "too many requests"))
        );

        let nested = record(json!({"error": {"type": "server_error", "message": "down"}}));
        assert_eq!(
            classify(&nested, &router()),
            EventKind::Error(StreamFailure::new("server_error", "down"))
        );

        let string_error = record(json!({"error": "bad gateway"}));
        assert_eq!(
            classify(&string_error, &router()),
            EventKind::Error(StreamFailure::new("stream_error", "bad gateway"))
        );

        let typed = record(json!({"type": "error", "code": 500}));
        assert_eq!(
            classify(&typed, &router()),
            EventKind::Error(StreamFailure::new("500", "Unknown error"))
        );
    }

    #[test]
    fn error_takes_precedence_over_delta() {
        let mixed = record(json!({
            "type": "response.output_text.delta",
            "delta": "x",
            "error": {"code": "oops", "message": "bad"}
        }));
        assert!(matches!(classify(&mixed, &router()), EventKind::Error(_)));
    }

    #[test]
    fn null_error_field_is_not_an_error() {
        let rec = record(json!({"type": "response.output_text.delta", "delta": "hi", "error": null}));
        assert_eq!(
            classify(&rec, &router()),
            EventKind::TextDelta { delta: "hi".into() }
        );
    }

    #[test]
    fn completed_extracts_id_and_usage() {
        let rec = record(json!({
            "type": "response.completed",
            "response": {"id": "resp_1", "usage": {"input_tokens": 2, "output_tokens": 3}}
        }));
        match classify(&rec, &router()) {
            EventKind::ResponseCompleted { response_id, usage } => {
                assert_eq!(response_id.as_deref(), Some("resp_1"));
                assert_eq!(usage.and_then(|u| u.total_tokens), Some(5));
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn oversized_usage_does_not_overflow_total() {
        let rec = record(json!({
            "type": "response.completed",
            "response": {"usage": {"input_tokens": u64::MAX, "output_tokens": 1}}
        }));
        match classify(&rec, &router()) {
            EventKind::ResponseCompleted { usage, .. } => {
                let usage = usage.expect("usage");
                assert_eq!(usage.input_tokens, Some(u64::MAX));
                assert_eq!(usage.total_tokens, None);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn text_done_carries_optional_text() {
        let rec = record(json!({"type": "response.output_text.done", "text": "final"}));
        assert_eq!(
            classify(&rec, &router()),
            EventKind::TextDone {
                text: Some("final".into())
            }
        );
        let rec = record(json!({"type": "response.output_text.done"}));
        assert_eq!(classify(&rec, &router()), EventKind::TextDone { text: None });
    }

    #[test]
    fn tool_phases_resolve_through_router() {
        let start = record(json!({"type": "response.file_search.executing"}));
        match classify(&start, &router()) {
            EventKind::Tool(event) => {
                assert_eq!(event.phase, ToolPhase::Start);
                assert_eq!(event.identifier, "file_search");
                assert_eq!(event.descriptor.tool_name, "file_search");
            }
            other => panic!("unexpected kind: {other:?}"),
        }

        let complete = record(json!({"type": "response.weather_forecast.completed"}));
        match classify(&complete, &router()) {
            EventKind::Tool(event) => {
                assert_eq!(event.phase, ToolPhase::Complete);
                assert_eq!(event.descriptor.server_name, "weather");
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn unknown_phases_and_types_are_unrecognized() {
        for data in [
            json!({"type": "response.output_item.added"}),
            json!({"type": "response.output_item.completed"}),
            json!({"type": "response.content_part.completed"}),
            json!({"type": "response.file_search.delta"}),
            json!({"type": "response.created"}),
            json!({"no_type": true}),
        ] {
            assert_eq!(classify(&record(data), &router()), EventKind::Unrecognized);
        }
    }

    #[test]
    fn agentic_search_iteration_builds_log_entry() {
        let rec = record(json!({
            "type": "response.agentic_search.query_phase.iteration",
            "iteration": 2,
            "query": "rust streams",
            "citations": ["a", "b", "a"],
            "remaining_iterations": 1
        }));
        match classify(&rec, &router()) {
            EventKind::AgenticSearchIteration { descriptor, entry } => {
                assert_eq!(descriptor.tool_name, "agentic_search");
                assert_eq!(entry.iteration, 2);
                assert_eq!(entry.citations, vec!["a".to_string(), "b".to_string()]);
                assert_eq!(entry.remaining_iterations, Some(1));
                assert!(entry.reasoning.is_none());
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }
}
