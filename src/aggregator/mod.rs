pub mod driver;
pub mod router;
pub mod session;
pub mod state;

use std::sync::Arc;

pub use driver::{drive_turn, TurnObserver, TurnOptions, TurnSummary};
pub use router::{ToolDescriptor, ToolEventRouter};
pub use session::{SessionContext, TurnId};
pub use state::{
    AgenticSearchLogEntry, ContentBlock, ExecutionTable, StreamFailure, StreamState, ToolExecution,
    ToolKey, ToolStatus,
};

use crate::error::{category_from_upstream_code, ErrorCategory};
use crate::protocol::canonical::CanonicalUsage;
use crate::protocol::classify::{classify, EventKind, ToolEvent, ToolPhase};
use crate::stream::Record;

/// Text of the block synthesized when a turn completes with no content.
pub const DEFAULT_COMPLETION_TEXT: &str = "Response completed";

/// Whether the caller should keep pulling records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop pulling chunks and release the source.
    Stop,
}

/// Stream Aggregator: owns the [`StreamState`] of the current turn and
/// applies one transition per classified event.
///
/// Records must be applied strictly in arrival order; the aggregator is the
/// only writer of its state.
pub struct StreamAggregator {
    router: Arc<ToolEventRouter>,
    session: SessionContext,
    state: StreamState,
}

impl StreamAggregator {
    #[must_use]
    pub fn new(router: Arc<ToolEventRouter>, session: SessionContext) -> Self {
        Self {
            router,
            session,
            state: StreamState::idle(),
        }
    }

    /// Discard the previous turn's state and start a new streaming turn.
    pub fn begin_turn(&mut self) -> &StreamState {
        let turn = self.session.next_turn();
        self.state = StreamState::idle();
        self.state.turn = Some(turn);
        self.state.is_streaming = true;
        tracing::debug!(
            session_id = %turn.session_id,
            sequence = turn.sequence,
            "turn started"
        );
        &self.state
    }

    #[must_use]
    pub fn state(&self) -> &StreamState {
        &self.state
    }

    /// Owned copy of the current state for consumers that keep it.
    #[must_use]
    pub fn snapshot(&self) -> StreamState {
        self.state.clone()
    }

    #[must_use]
    pub fn router(&self) -> &ToolEventRouter {
        &self.router
    }

    #[must_use]
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    #[must_use]
    pub fn classify(&self, record: &Record) -> EventKind {
        classify(record, &self.router)
    }

    /// Classify and apply one record.
    pub fn apply_record(&mut self, record: &Record) -> Flow {
        let kind = self.classify(record);
        self.apply(&kind)
    }

    /// Apply one classified event to the turn state.
    pub fn apply(&mut self, kind: &EventKind) -> Flow {
        if self.state.encountered_error {
            tracing::debug!(kind = kind.name(), "event after turn error ignored");
            return Flow::Stop;
        }

        match kind {
            EventKind::TextDelta { delta } => self.on_text_delta(delta),
            EventKind::TextDone { text } => self.on_text_done(text.as_deref()),
            EventKind::Tool(ToolEvent {
                phase: ToolPhase::Start,
                descriptor,
                ..
            }) => self.on_tool_start(descriptor),
            EventKind::Tool(ToolEvent {
                phase: ToolPhase::Complete,
                identifier,
                descriptor,
            }) => self.on_tool_complete(identifier, &descriptor.key()),
            EventKind::AgenticSearchIteration { descriptor, entry } => {
                self.on_search_iteration(&descriptor.key(), entry);
            }
            EventKind::ResponseCompleted { response_id, usage } => {
                self.on_response_completed(response_id.as_deref(), *usage);
            }
            EventKind::Error(failure) => {
                self.on_error(failure);
                return Flow::Stop;
            }
            EventKind::Unrecognized => {}
        }
        Flow::Continue
    }

    fn on_text_delta(&mut self, delta: &str) {
        let state = &mut self.state;
        state.streaming_text.push_str(delta);

        if let Some(index) = state.current_text_block {
            if let Some(ContentBlock::Text { content }) = state.content_blocks.get_mut(index) {
                content.push_str(delta);
                return;
            }
        }

        remove_inline_loading(&mut state.content_blocks);
        state.content_blocks.push(ContentBlock::text(delta));
        state.current_text_block = Some(state.content_blocks.len() - 1);
    }

    fn on_text_done(&mut self, text: Option<&str>) {
        let state = &mut self.state;
        state.current_text_block = None;
        let Some(text) = text else {
            return;
        };

        let last_text = state
            .content_blocks
            .iter_mut()
            .rev()
            .find_map(|block| match block {
                ContentBlock::Text { content } => Some(content),
                _ => None,
            });
        match last_text {
            Some(content) => {
                content.clear();
                content.push_str(text);
            }
            None if !text.is_empty() => {
                remove_inline_loading(&mut state.content_blocks);
                state.content_blocks.push(ContentBlock::text(text));
            }
            None => {}
        }
    }

    fn on_tool_start(&mut self, descriptor: &ToolDescriptor) {
        let state = &mut self.state;
        self.router
            .begin_execution(&mut state.active_tool_executions, descriptor);

        let has_progress_block = state
            .content_blocks
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolProgress { .. }));
        if has_progress_block {
            refresh_tool_progress(state);
        } else {
            remove_inline_loading(&mut state.content_blocks);
            state.content_blocks.push(ContentBlock::ToolProgress {
                tool_executions: state.active_tool_executions.view(),
            });
        }
        state.current_text_block = None;
    }

    fn on_tool_complete(&mut self, identifier: &str, key: &ToolKey) {
        let state = &mut self.state;
        // generic identifiers only count once a start has been seen
        if !self.router.is_registered(identifier)
            && state.active_tool_executions.get(key).is_none()
        {
            tracing::debug!(identifier, "completion for unseen generic tool ignored");
            return;
        }
        self.router
            .complete_execution(&mut state.active_tool_executions, key);
        refresh_tool_progress(state);
        remove_inline_loading(&mut state.content_blocks);
        state.content_blocks.push(ContentBlock::InlineLoading);
    }

    fn on_search_iteration(&mut self, key: &ToolKey, entry: &AgenticSearchLogEntry) {
        let state = &mut self.state;
        let Some(execution) = state.active_tool_executions.get_mut(key) else {
            tracing::debug!(key = %key, "search iteration for unknown execution ignored");
            return;
        };
        execution.agentic_search_logs.push(entry.clone());
        refresh_tool_progress(state);
    }

    fn on_response_completed(&mut self, response_id: Option<&str>, usage: Option<CanonicalUsage>) {
        let state = &mut self.state;
        for execution in state.active_tool_executions.iter_mut() {
            execution.status = ToolStatus::Completed;
        }
        refresh_tool_progress(state);
        remove_inline_loading(&mut state.content_blocks);
        if state.content_blocks.is_empty() {
            state
                .content_blocks
                .push(ContentBlock::text(DEFAULT_COMPLETION_TEXT));
        }
        state.current_text_block = None;
        state.is_streaming = false;
        if let Some(id) = response_id {
            state.response_id = Some(id.to_owned());
        }
        if usage.is_some() {
            state.usage = usage;
        }
    }

    fn on_error(&mut self, failure: &StreamFailure) {
        match category_from_upstream_code(&failure.code) {
            ErrorCategory::RateLimit | ErrorCategory::Authentication | ErrorCategory::Permission => {
                tracing::warn!(code = %failure.code, "upstream error ended turn: {}", failure.message);
            }
            _ => {
                tracing::error!(code = %failure.code, "upstream error ended turn: {}", failure.message);
            }
        }

        let state = &mut self.state;
        state.active_tool_executions.clear();
        state
            .content_blocks
            .retain(|block| matches!(block, ContentBlock::Text { .. }));
        state.content_blocks.push(ContentBlock::text(failure.display_text()));
        state.current_text_block = None;
        state.encountered_error = true;
        state.is_streaming = false;
        state.error = Some(failure.clone());
    }
}

fn remove_inline_loading(blocks: &mut Vec<ContentBlock>) {
    blocks.retain(|block| !matches!(block, ContentBlock::InlineLoading));
}

fn refresh_tool_progress(state: &mut StreamState) {
    let table = &state.active_tool_executions;
    for block in &mut state.content_blocks {
        if let ContentBlock::ToolProgress { tool_executions } = block {
            *tool_executions = table.view();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn aggregator() -> StreamAggregator {
        let mut aggregator = StreamAggregator::new(
            Arc::new(ToolEventRouter::with_builtin_tools()),
            SessionContext::with_seed(42),
        );
        aggregator.begin_turn();
        aggregator
    }

    fn apply(aggregator: &mut StreamAggregator, data: serde_json::Value) -> Flow {
        aggregator.apply_record(&Record::new(None, data))
    }

    fn delta(text: &str) -> serde_json::Value {
        json!({"type": "response.output_text.delta", "delta": text})
    }

    fn assert_loading_invariant(state: &StreamState) {
        let loading: Vec<usize> = state
            .content_blocks()
            .iter()
            .enumerate()
            .filter(|(_, block)| matches!(block, ContentBlock::InlineLoading))
            .map(|(i, _)| i)
            .collect();
        assert!(loading.len() <= 1, "more than one inline loading block");
        if let Some(&index) = loading.first() {
            assert_eq!(index, state.content_blocks().len() - 1);
        }
    }

    #[test]
    fn begin_turn_resets_state() {
        let mut agg = aggregator();
        apply(&mut agg, delta("old"));
        let state = agg.begin_turn();
        assert!(state.content_blocks().is_empty());
        assert!(state.streaming_text().is_empty());
        assert!(state.is_streaming());
        assert_eq!(state.turn().map(|t| t.sequence), Some(2));
    }

    #[test]
    fn deltas_accumulate_into_one_block() {
        let mut agg = aggregator();
        for part in ["Hel", "lo", " world"] {
            assert_eq!(apply(&mut agg, delta(part)), Flow::Continue);
        }
        let state = agg.state();
        assert_eq!(state.streaming_text(), "Hello world");
        assert_eq!(state.content_blocks(), &[ContentBlock::text("Hello world")]);
        assert_eq!(state.current_text_block(), Some(0));
    }

    #[test]
    fn tool_start_splits_text_blocks() {
        let mut agg = aggregator();
        apply(&mut agg, delta("before"));
        apply(&mut agg, json!({"type": "response.file_search.in_progress"}));
        assert_eq!(agg.state().current_text_block(), None);
        apply(&mut agg, delta("after"));

        let blocks = agg.state().content_blocks();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].as_text(), Some("before"));
        assert!(matches!(blocks[1], ContentBlock::ToolProgress { .. }));
        assert_eq!(blocks[2].as_text(), Some("after"));
        assert_eq!(agg.state().streaming_text(), "beforeafter");
    }

    #[test]
    fn tool_complete_appends_single_trailing_loading_block() {
        let mut agg = aggregator();
        apply(&mut agg, json!({"type": "response.mcp_call.in_progress"}));
        apply(&mut agg, json!({"type": "response.file_search.executing"}));
        apply(&mut agg, json!({"type": "response.mcp_call.completed"}));
        assert_loading_invariant(agg.state());
        apply(&mut agg, json!({"type": "response.file_search.completed"}));
        assert_loading_invariant(agg.state());

        let blocks = agg.state().content_blocks();
        assert_eq!(blocks.len(), 2);
        match &blocks[0] {
            ContentBlock::ToolProgress { tool_executions } => {
                assert_eq!(tool_executions.len(), 2);
                assert!(tool_executions
                    .iter()
                    .all(|e| e.status == ToolStatus::Completed));
            }
            other => panic!("unexpected block: {other:?}"),
        }
        assert_eq!(blocks[1], ContentBlock::InlineLoading);

        apply(&mut agg, delta("next"));
        let blocks = agg.state().content_blocks();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].as_text(), Some("next"));
    }

    #[test]
    fn duplicate_completion_is_noop() {
        let mut agg = aggregator();
        apply(&mut agg, json!({"type": "response.mcp_call.in_progress"}));
        apply(&mut agg, json!({"type": "response.mcp_call.completed"}));
        let before = agg.snapshot();
        apply(&mut agg, json!({"type": "response.mcp_call.completed"}));
        assert_eq!(agg.state().content_blocks(), before.content_blocks());
        assert_eq!(agg.state().active_tool_executions().len(), 1);
    }

    #[test]
    fn completion_for_unknown_key_does_not_raise() {
        let mut agg = aggregator();
        assert_eq!(
            apply(&mut agg, json!({"type": "response.file_search.completed"})),
            Flow::Continue
        );
        assert!(agg.state().active_tool_executions().is_empty());
    }

    #[test]
    fn text_done_overwrites_most_recent_text_block() {
        let mut agg = aggregator();
        apply(&mut agg, delta("first"));
        apply(&mut agg, json!({"type": "response.mcp_call.in_progress"}));
        apply(&mut agg, delta("draft"));
        apply(
            &mut agg,
            json!({"type": "response.output_text.done", "text": "final"}),
        );
        let blocks = agg.state().content_blocks();
        assert_eq!(blocks[0].as_text(), Some("first"));
        assert_eq!(blocks[2].as_text(), Some("final"));
        assert_eq!(agg.state().current_text_block(), None);

        apply(&mut agg, delta("more"));
        assert_eq!(agg.state().content_blocks().len(), 4);
    }

    #[test]
    fn response_completed_forces_completion_and_clears_loading() {
        let mut agg = aggregator();
        apply(&mut agg, json!({"type": "response.mcp_call.in_progress"}));
        apply(&mut agg, json!({"type": "response.file_search.in_progress"}));
        apply(&mut agg, json!({"type": "response.file_search.completed"}));
        apply(
            &mut agg,
            json!({"type": "response.completed", "response": {"id": "resp_9"}}),
        );

        let state = agg.state();
        assert!(!state.is_streaming());
        assert_eq!(state.response_id(), Some("resp_9"));
        assert!(state
            .active_tool_executions()
            .iter()
            .all(|e| e.status == ToolStatus::Completed));
        assert!(!state
            .content_blocks()
            .iter()
            .any(|b| matches!(b, ContentBlock::InlineLoading)));
    }

    #[test]
    fn empty_completion_synthesizes_default_text() {
        let mut agg = aggregator();
        apply(&mut agg, json!({"type": "response.completed"}));
        assert_eq!(
            agg.state().content_blocks(),
            &[ContentBlock::text(DEFAULT_COMPLETION_TEXT)]
        );
    }

    #[test]
    fn error_strips_tool_blocks_and_stops() {
        let mut agg = aggregator();
        apply(&mut agg, delta("partial"));
        apply(&mut agg, json!({"type": "response.mcp_call.in_progress"}));
        apply(&mut agg, json!({"type": "response.mcp_call.completed"}));
        let flow = apply(
            &mut agg,
            json!({"code": "rate_limited", "message": "too many requests"}),
        );
        assert_eq!(flow, Flow::Stop);

        let state = agg.state();
        assert!(state.encountered_error());
        assert!(!state.is_streaming());
        assert!(state.active_tool_executions().is_empty());
        assert_eq!(
            state.content_blocks(),
            &[
                ContentBlock::text("partial"),
                ContentBlock::text("[rate_limited] too many requests"),
            ]
        );
        assert_eq!(state.error().map(|e| e.code.as_str()), Some("rate_limited"));

        assert_eq!(apply(&mut agg, delta("late")), Flow::Stop);
        assert_eq!(agg.state().streaming_text(), "partial");
    }

    #[test]
    fn search_iterations_append_logs_without_status_change() {
        let mut agg = aggregator();
        apply(&mut agg, json!({"type": "response.agentic_search.in_progress"}));
        for iteration in 1..=2 {
            apply(
                &mut agg,
                json!({
                    "type": "response.agentic_search.query_phase.iteration",
                    "iteration": iteration,
                    "query": format!("q{iteration}"),
                    "reasoning": "narrowing",
                    "citations": ["doc-1"],
                    "remaining_iterations": 2 - iteration
                }),
            );
        }
        let key = ToolKey::new("knowledge_base", "agentic_search");
        let execution = agg
            .state()
            .active_tool_executions()
            .get(&key)
            .expect("execution");
        assert_eq!(execution.status, ToolStatus::InProgress);
        assert_eq!(execution.agentic_search_logs.len(), 2);
        assert_eq!(execution.agentic_search_logs[1].query, "q2");

        match &agg.state().content_blocks()[0] {
            ContentBlock::ToolProgress { tool_executions } => {
                assert_eq!(tool_executions[0].agentic_search_logs.len(), 2);
            }
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[test]
    fn tool_status_never_reverts_after_completion() {
        let mut agg = aggregator();
        let key = ToolKey::new("mcp", "mcp_call");
        let mut statuses = Vec::new();
        for phase in ["in_progress", "in_progress", "completed", "executing", "in_progress"] {
            apply(&mut agg, json!({"type": format!("response.mcp_call.{phase}")}));
            statuses.push(
                agg.state()
                    .active_tool_executions()
                    .get(&key)
                    .map(|e| e.status),
            );
        }
        assert_eq!(
            statuses,
            vec![
                Some(ToolStatus::InProgress),
                Some(ToolStatus::InProgress),
                Some(ToolStatus::Completed),
                Some(ToolStatus::Completed),
                Some(ToolStatus::Completed),
            ]
        );
        assert_eq!(agg.state().active_tool_executions().len(), 1);
    }

    #[test]
    fn generic_completion_without_start_is_ignored() {
        let mut agg = aggregator();
        apply(&mut agg, delta("text"));
        let before = agg.snapshot();
        apply(&mut agg, json!({"type": "response.output_item.completed"}));
        apply(&mut agg, json!({"type": "response.weather_forecast.completed"}));
        assert_eq!(agg.state().content_blocks(), before.content_blocks());
        assert_eq!(agg.state().current_text_block(), Some(0));

        apply(&mut agg, json!({"type": "response.weather_forecast.in_progress"}));
        apply(&mut agg, json!({"type": "response.weather_forecast.completed"}));
        assert_eq!(
            agg.state().content_blocks().last(),
            Some(&ContentBlock::InlineLoading)
        );
    }

    #[test]
    fn unrecognized_records_leave_state_untouched() {
        let mut agg = aggregator();
        apply(&mut agg, delta("x"));
        let before = agg.snapshot();
        assert_eq!(
            apply(&mut agg, json!({"type": "response.output_item.added"})),
            Flow::Continue
        );
        assert_eq!(agg.state().content_blocks(), before.content_blocks());
    }
}
