use async_trait::async_trait;
use std::sync::Mutex;

use crate::app::ports::MetricsSink;
use crate::common::types::MetricEvent;

/// Forwards counters to the process-wide `metrics` recorder under a fixed namespace.
/// With no recorder installed the facade drops them, which is the intended no-op.
pub struct RecorderSink {
    namespace: String,
}

impl RecorderSink {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Record against whichever recorder is current for this thread
    pub fn record(&self, events: &[MetricEvent]) {
        for event in events {
            let mut labels = vec![
                ::metrics::Label::new("namespace", self.namespace.clone()),
                ::metrics::Label::new("unit", event.unit),
            ];
            for (key, value) in &event.dimensions {
                labels.push(::metrics::Label::new(*key, value.clone()));
            }
            ::metrics::counter!(event.name, labels).increment(event.value);
        }
    }
}

#[async_trait]
impl MetricsSink for RecorderSink {
    async fn emit(&self, events: Vec<MetricEvent>) {
        self.record(&events);
    }
}

/// Keeps every emitted event; used by tests and dry runs
#[derive(Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<MetricEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `emit` calls received
    pub fn emit_calls(&self) -> usize {
        self.batches.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        self.batches
            .lock()
            .map(|b| b.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Sum of all values emitted under `name`
    pub fn total(&self, name: &str) -> u64 {
        self.events()
            .iter()
            .filter(|e| e.name == name)
            .map(|e| e.value)
            .sum()
    }
}

#[async_trait]
impl MetricsSink for MemorySink {
    async fn emit(&self, events: Vec<MetricEvent>) {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(events);
        }
    }
}
