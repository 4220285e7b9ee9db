use std::sync::Arc;

use bytes::Bytes;
use streamfold::aggregator::driver::{NoopObserver, SnapshotCollector, TurnObserver};
use streamfold::aggregator::{drive_turn, SessionContext, StreamAggregator, TurnOptions};
use streamfold::config::{load_config_or_default, AppConfig};
use streamfold::error::CanonicalError;
use streamfold::observability::init_tracing;
use streamfold::telemetry::{TelemetryEmitter, TracingSink};

const CONFIG_ENV: &str = "STREAMFOLD_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const REPLAY_CHUNK_SIZE: usize = 4096;

const USAGE: &str = "usage:
  streamfold replay <capture.sse> [--snapshots]
  streamfold telemetry <response.json>";

enum Command {
    Replay { path: String, snapshots: bool },
    Telemetry { path: String },
}

fn parse_args(args: &[String]) -> Option<Command> {
    match args {
        [cmd, path] if cmd == "replay" => Some(Command::Replay {
            path: path.clone(),
            snapshots: false,
        }),
        [cmd, path, flag] if cmd == "replay" && flag == "--snapshots" => Some(Command::Replay {
            path: path.clone(),
            snapshots: true,
        }),
        [cmd, path] if cmd == "telemetry" => Some(Command::Telemetry { path: path.clone() }),
        _ => None,
    }
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = parse_args(&args) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let config_path =
        std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config_or_default(&config_path).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration from {config_path}: {e}");
        std::process::exit(1);
    });

    init_tracing(&config.features.log_level, config.features.log_format);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize Tokio runtime: {e}");
            std::process::exit(1);
        });

    let result = runtime.block_on(async move {
        match command {
            Command::Replay { path, snapshots } => replay(&config, &path, snapshots).await,
            Command::Telemetry { path } => telemetry(&config, &path).await,
        }
    });

    match result {
        Ok(output) => println!("{output}"),
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}

async fn read_file(path: &str) -> Result<Vec<u8>, CanonicalError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| CanonicalError::Internal(format!("failed to read {path}: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, CanonicalError> {
    serde_json::to_string_pretty(value).map_err(|e| CanonicalError::Internal(e.to_string()))
}

async fn replay(config: &AppConfig, path: &str, snapshots: bool) -> Result<String, CanonicalError> {
    let capture = read_file(path).await?;
    let chunks: Vec<Result<Bytes, std::convert::Infallible>> = capture
        .chunks(REPLAY_CHUNK_SIZE)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();

    let mut aggregator = StreamAggregator::new(Arc::new(config.tool_router()), SessionContext::new());
    let emitter = TelemetryEmitter::from_config(&config.telemetry, Arc::new(TracingSink));
    let options = TurnOptions::from(&config.decoder);

    let mut collector = SnapshotCollector::default();
    let mut noop = NoopObserver;
    let observer: &mut dyn TurnObserver = if snapshots { &mut collector } else { &mut noop };

    let summary = drive_turn(
        &mut aggregator,
        futures_util::stream::iter(chunks),
        observer,
        &options,
        Some(&emitter),
    )
    .await;

    if snapshots {
        return to_json(&collector.snapshots);
    }
    to_json(&serde_json::json!({
        "state": summary.state,
        "records": summary.records,
        "malformed": summary.malformed,
        "stopped_early": summary.stopped_early,
    }))
}

async fn telemetry(config: &AppConfig, path: &str) -> Result<String, CanonicalError> {
    let raw = read_file(path).await?;
    let response: serde_json::Value = serde_json::from_slice(&raw)
        .map_err(|e| CanonicalError::InvalidRecord(format!("{path}: {e}")))?;
    let emitter = TelemetryEmitter::from_config(&config.telemetry, Arc::new(TracingSink));
    to_json(&emitter.response_events(&response))
}
