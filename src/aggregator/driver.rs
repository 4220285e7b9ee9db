//! Turn driver: pulls one turn's byte stream through the decoder, classifier
//! and aggregator, pushing state to an observer after every event.

use std::time::{Duration, Instant};

use futures_util::{Stream, StreamExt};
use serde_json::Value;

use super::state::{StreamFailure, StreamState};
use super::{Flow, StreamAggregator};
use crate::config::DecoderConfig;
use crate::error::CanonicalError;
use crate::observability;
use crate::protocol::classify::EventKind;
use crate::stream::record_stream;
use crate::telemetry::TelemetryEmitter;

/// Error code applied when too many consecutive records fail to decode.
pub const MALFORMED_STREAM_CODE: &str = "malformed_stream";

/// A record as seen by the generic observer hook.
#[derive(Debug)]
pub struct ClassifiedRecord<'a> {
    pub event: Option<&'a str>,
    pub record_type: Option<&'a str>,
    pub data: &'a Value,
    pub kind: &'a EventKind,
}

/// Consumer of a running turn.
pub trait TurnObserver {
    /// Every successfully decoded record, recognized or not.
    fn on_record(&mut self, _record: &ClassifiedRecord<'_>) {}

    /// Current state after each applied event.
    fn on_state(&mut self, state: &StreamState);
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TurnObserver for NoopObserver {
    fn on_state(&mut self, _state: &StreamState) {}
}

/// Observer that keeps every pushed snapshot.
#[derive(Debug, Default)]
pub struct SnapshotCollector {
    pub snapshots: Vec<StreamState>,
    pub record_types: Vec<Option<String>>,
}

impl TurnObserver for SnapshotCollector {
    fn on_record(&mut self, record: &ClassifiedRecord<'_>) {
        self.record_types.push(record.record_type.map(str::to_owned));
    }

    fn on_state(&mut self, state: &StreamState) {
        self.snapshots.push(state.clone());
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnOptions {
    /// Escalate to a stream error after this many consecutive malformed
    /// records. `None` never escalates.
    pub max_consecutive_malformed: Option<u32>,
}

impl From<&DecoderConfig> for TurnOptions {
    fn from(config: &DecoderConfig) -> Self {
        Self {
            max_consecutive_malformed: config.max_consecutive_malformed,
        }
    }
}

/// Outcome of one driven turn.
#[derive(Debug, Clone)]
pub struct TurnSummary {
    pub state: StreamState,
    /// Records that decoded successfully.
    pub records: usize,
    /// Data lines skipped as malformed.
    pub malformed: usize,
    /// The source was released before it signalled end-of-stream.
    pub stopped_early: bool,
    pub duration: Duration,
}

impl TurnSummary {
    /// The final state, or the upstream failure that ended the turn.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError::Upstream`] when the turn errored.
    pub fn into_result(self) -> Result<StreamState, CanonicalError> {
        match self.state.error.clone() {
            Some(failure) => Err(failure.into()),
            None => Ok(self.state),
        }
    }
}

/// Drive one turn to completion.
///
/// The source is dropped as soon as the turn errors or `response.completed`
/// is applied. Telemetry, when given, is emitted from the completed response
/// object and never touches the stream state.
pub async fn drive_turn<S, E, O>(
    aggregator: &mut StreamAggregator,
    byte_stream: S,
    observer: &mut O,
    options: &TurnOptions,
    telemetry: Option<&TelemetryEmitter>,
) -> TurnSummary
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
    O: TurnObserver + ?Sized,
{
    let started = Instant::now();
    aggregator.begin_turn();
    observer.on_state(aggregator.state());

    let mut records = Box::pin(record_stream(byte_stream));
    let mut decoded_count = 0usize;
    let mut malformed = 0usize;
    let mut consecutive_malformed = 0u32;
    let mut stopped_early = false;

    while let Some(decoded) = records.next().await {
        let record = match decoded {
            Ok(record) => {
                consecutive_malformed = 0;
                record
            }
            Err(err) => {
                malformed += 1;
                consecutive_malformed = consecutive_malformed.saturating_add(1);
                observability::log_malformed_record(&err);
                if options
                    .max_consecutive_malformed
                    .is_some_and(|limit| consecutive_malformed >= limit)
                {
                    let failure = StreamFailure::new(
                        MALFORMED_STREAM_CODE,
                        format!("{consecutive_malformed} consecutive malformed records"),
                    );
                    aggregator.apply(&EventKind::Error(failure));
                    observer.on_state(aggregator.state());
                    stopped_early = true;
                    break;
                }
                continue;
            }
        };
        decoded_count += 1;

        let kind = aggregator.classify(&record);
        if matches!(kind, EventKind::Unrecognized) {
            observability::log_unrecognized_record(&record);
        }
        observer.on_record(&ClassifiedRecord {
            event: record.event.as_deref(),
            record_type: record.data_type(),
            data: &record.data,
            kind: &kind,
        });

        let flow = aggregator.apply(&kind);
        observer.on_state(aggregator.state());

        if flow == Flow::Stop {
            stopped_early = true;
            break;
        }
        if let EventKind::ResponseCompleted { .. } = kind {
            if let (Some(emitter), Some(response)) = (telemetry, record.data.get("response")) {
                emitter.emit_response(response);
            }
            stopped_early = true;
            break;
        }
    }
    drop(records);

    let duration = started.elapsed();
    let state = aggregator.snapshot();
    if !state.encountered_error() {
        observability::log_turn_complete(&state, duration);
    }

    TurnSummary {
        state,
        records: decoded_count,
        malformed,
        stopped_early,
        duration,
    }
}
