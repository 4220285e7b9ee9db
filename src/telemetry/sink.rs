use parking_lot::Mutex;

use super::TelemetryEvent;

/// Destination for extracted telemetry events.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: &TelemetryEvent);
}

/// Emits each event as a structured `info!` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: &TelemetryEvent) {
        let payload = serde_json::to_string(&event.payload).unwrap_or_default();
        tracing::info!(
            target: "streamfold::telemetry",
            event_name = %event.name,
            role = event.role.as_str(),
            system = event.system.as_deref().unwrap_or(""),
            payload = %payload,
            "telemetry event"
        );
    }
}

/// Buffers events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemorySink {
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<TelemetryEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl TelemetrySink for MemorySink {
    fn emit(&self, event: &TelemetryEvent) {
        self.events.lock().push(event.clone());
    }
}
