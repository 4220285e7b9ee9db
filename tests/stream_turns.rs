use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::Stream;
use serde_json::json;
use streamfold::aggregator::driver::{NoopObserver, SnapshotCollector};
use streamfold::aggregator::{
    drive_turn, ContentBlock, SessionContext, StreamAggregator, ToolEventRouter, ToolKey,
    ToolStatus, TurnOptions,
};
use streamfold::config::parse_config;

fn sse(records: &[serde_json::Value]) -> String {
    records
        .iter()
        .map(|data| format!("data: {data}\n\n"))
        .collect()
}

/// Split the payload at arbitrary byte offsets, including inside UTF-8 sequences.
fn chunked(payload: &str, size: usize) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    let chunks: Vec<Result<Bytes, Infallible>> = payload
        .as_bytes()
        .chunks(size)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    futures_util::stream::iter(chunks)
}

fn aggregator() -> StreamAggregator {
    StreamAggregator::new(
        Arc::new(ToolEventRouter::with_builtin_tools()),
        SessionContext::with_seed(11),
    )
}

fn delta(text: &str) -> serde_json::Value {
    json!({"type": "response.output_text.delta", "delta": text})
}

#[tokio::test]
async fn full_turn_with_tools_renders_in_order() {
    let payload = sse(&[
        delta("Looking that up. "),
        json!({"type": "response.file_search.in_progress"}),
        json!({"type": "response.file_search.completed"}),
        delta("Found it: "),
        delta("café ☕"),
        json!({"type": "response.output_text.done", "text": "Found it: café ☕"}),
        json!({
            "type": "response.completed",
            "response": {"id": "resp_42", "usage": {"input_tokens": 12, "output_tokens": 8}}
        }),
    ]);

    for chunk_size in [1, 3, 7, 64, 4096] {
        let mut agg = aggregator();
        let summary = drive_turn(
            &mut agg,
            chunked(&payload, chunk_size),
            &mut NoopObserver,
            &TurnOptions::default(),
            None,
        )
        .await;

        let state = &summary.state;
        assert_eq!(summary.records, 7, "chunk size {chunk_size}");
        assert_eq!(state.streaming_text(), "Looking that up. Found it: café ☕");
        assert_eq!(state.response_id(), Some("resp_42"));
        assert_eq!(state.usage().and_then(|u| u.total_tokens), Some(20));
        assert!(!state.is_streaming());

        let blocks = state.content_blocks();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].as_text(), Some("Looking that up. "));
        assert!(matches!(blocks[1], ContentBlock::ToolProgress { .. }));
        assert_eq!(blocks[2].as_text(), Some("Found it: café ☕"));
    }
}

#[tokio::test]
async fn inline_loading_is_unique_and_last_in_every_snapshot() {
    let payload = sse(&[
        json!({"type": "response.mcp_call.in_progress"}),
        json!({"type": "response.agentic_search.executing"}),
        json!({"type": "response.mcp_call.completed"}),
        json!({"type": "response.agentic_search.completed"}),
        json!({"type": "response.agentic_search.completed"}),
        delta("done"),
        json!({"type": "response.completed"}),
    ]);
    let mut agg = aggregator();
    let mut observer = SnapshotCollector::default();
    drive_turn(
        &mut agg,
        chunked(&payload, 16),
        &mut observer,
        &TurnOptions::default(),
        None,
    )
    .await;

    assert_eq!(observer.snapshots.len(), 8);
    for snapshot in &observer.snapshots {
        let blocks = snapshot.content_blocks();
        let loading = blocks
            .iter()
            .filter(|b| matches!(b, ContentBlock::InlineLoading))
            .count();
        assert!(loading <= 1);
        if loading == 1 {
            assert_eq!(blocks.last(), Some(&ContentBlock::InlineLoading));
        }
    }

    let last = observer.snapshots.last().expect("final snapshot");
    assert!(last
        .active_tool_executions()
        .iter()
        .all(|e| e.status == ToolStatus::Completed));
}

#[tokio::test]
async fn status_never_reverts_to_in_progress_without_a_new_start() {
    let payload = sse(&[
        json!({"type": "response.file_search.in_progress"}),
        json!({"type": "response.file_search.completed"}),
        json!({"type": "response.file_search.completed"}),
    ]);
    let mut agg = aggregator();
    let mut observer = SnapshotCollector::default();
    drive_turn(
        &mut agg,
        chunked(&payload, 5),
        &mut observer,
        &TurnOptions::default(),
        None,
    )
    .await;

    let key = ToolKey::new("knowledge_base", "file_search");
    let statuses: Vec<Option<ToolStatus>> = observer
        .snapshots
        .iter()
        .map(|s| s.active_tool_executions().get(&key).map(|e| e.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            None,
            Some(ToolStatus::InProgress),
            Some(ToolStatus::Completed),
            Some(ToolStatus::Completed),
        ]
    );
}

#[tokio::test]
async fn mid_stream_rate_limit_ends_the_turn() {
    let payload = format!(
        "{}{}{}",
        sse(&[
            json!({"type": "response.mcp_call.in_progress"}),
            delta("partial"),
        ]),
        "data: {\"code\":\"rate_limited\",\"message\":\"too many requests\"}\n\n",
        sse(&[delta(" never")]),
    );
    let mut agg = aggregator();
    let summary = drive_turn(
        &mut agg,
        chunked(&payload, 9),
        &mut NoopObserver,
        &TurnOptions::default(),
        None,
    )
    .await;

    let state = &summary.state;
    assert!(summary.stopped_early);
    assert!(state.encountered_error());
    assert!(state.active_tool_executions().is_empty());
    assert_eq!(
        state.content_blocks(),
        &[
            ContentBlock::text("partial"),
            ContentBlock::text("[rate_limited] too many requests"),
        ]
    );
}

#[tokio::test]
async fn malformed_and_done_lines_do_not_disturb_accumulation() {
    let payload = format!(
        "{}data: {{broken\n\n: keep-alive\n\n{}data: [DONE]\n\n",
        sse(&[delta("Hello, ")]),
        sse(&[delta("world")]),
    );
    let mut agg = aggregator();
    let summary = drive_turn(
        &mut agg,
        chunked(&payload, 4),
        &mut NoopObserver,
        &TurnOptions::default(),
        None,
    )
    .await;

    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.records, 2);
    assert_eq!(summary.state.streaming_text(), "Hello, world");
    assert_eq!(
        summary.state.content_blocks(),
        &[ContentBlock::text("Hello, world")]
    );
    // no synthetic terminal event
    assert!(summary.state.is_streaming());
}

#[tokio::test]
async fn configured_custom_tools_route_through_the_registry() {
    let config = parse_config(
        "tools:\n  custom:\n    - identifier: crm\n      server_name: sales\n      tool_name: lookup\n",
    )
    .expect("config");
    let mut agg = StreamAggregator::new(Arc::new(config.tool_router()), SessionContext::with_seed(5));
    let payload = sse(&[
        json!({"type": "response.crm.in_progress"}),
        json!({"type": "response.weather_forecast.in_progress"}),
    ]);
    let summary = drive_turn(
        &mut agg,
        chunked(&payload, 32),
        &mut NoopObserver,
        &TurnOptions::from(&config.decoder),
        None,
    )
    .await;

    let keys: Vec<String> = summary
        .state
        .active_tool_executions()
        .iter()
        .map(|e| e.key().to_string())
        .collect();
    assert_eq!(keys, vec!["sales/lookup", "weather/forecast"]);
}

#[tokio::test]
async fn consecutive_turns_get_fresh_state_and_new_turn_ids() {
    let mut agg = aggregator();
    let first = drive_turn(
        &mut agg,
        chunked(&sse(&[delta("one")]), 8),
        &mut NoopObserver,
        &TurnOptions::default(),
        None,
    )
    .await;
    let second = drive_turn(
        &mut agg,
        chunked(&sse(&[delta("two")]), 8),
        &mut NoopObserver,
        &TurnOptions::default(),
        None,
    )
    .await;

    assert_eq!(second.state.streaming_text(), "two");
    let (a, b) = (first.state.turn().copied(), second.state.turn().copied());
    assert_eq!(a.map(|t| t.sequence), Some(1));
    assert_eq!(b.map(|t| t.sequence), Some(2));
    assert_eq!(a.map(|t| t.session_id), b.map(|t| t.session_id));
}
