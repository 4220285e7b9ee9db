use std::time::Duration;

use tracing::{debug, info, warn};

use crate::aggregator::{ContentBlock, StreamState};
use crate::error::DecodeError;
use crate::stream::Record;

/// Log a skipped data line. The stream keeps going.
pub fn log_malformed_record(error: &DecodeError) {
    match error {
        DecodeError::MalformedJson { event, line, .. } => {
            warn!(
                event = event.as_deref().unwrap_or(""),
                line_len = line.len(),
                "skipping malformed record: {error}"
            );
        }
    }
}

/// Log a record the aggregator does not interpret.
pub fn log_unrecognized_record(record: &Record) {
    debug!(
        event = record.event.as_deref().unwrap_or(""),
        record_type = record.data_type().unwrap_or(""),
        "unrecognized record passed through"
    );
}

/// Log the end of a turn at INFO level.
pub fn log_turn_complete(state: &StreamState, duration: Duration) {
    let tool_blocks = state
        .content_blocks()
        .iter()
        .filter(|block| matches!(block, ContentBlock::ToolProgress { .. }))
        .count();
    let usage = state.usage().copied().unwrap_or_default();
    info!(
        response_id = state.response_id().unwrap_or(""),
        completed = !state.is_streaming(),
        blocks = state.content_blocks().len(),
        tool_blocks,
        tool_executions = state.active_tool_executions().len(),
        input_tokens = usage.input_tokens.unwrap_or(0),
        output_tokens = usage.output_tokens.unwrap_or(0),
        total_tokens = usage.total_tokens.unwrap_or(0),
        duration_seconds = duration.as_secs_f64(),
        "turn completed"
    );
}
