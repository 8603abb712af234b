use std::sync::Arc;

use crate::app::ports::MetricsSink;
use crate::common::constants::DIMENSION_REGION;
use crate::common::types::MetricEvent;

/// Stamps counters with the deployment region and hands them to the sink in one call
#[derive(Clone)]
pub struct Telemetry {
    sink: Arc<dyn MetricsSink>,
    region: String,
}

impl Telemetry {
    pub fn new(sink: Arc<dyn MetricsSink>, region: impl Into<String>) -> Self {
        Self {
            sink,
            region: region.into(),
        }
    }

    pub async fn count(&self, name: &'static str, value: u64) {
        self.counts(&[(name, value)]).await;
    }

    pub async fn counts(&self, counts: &[(&'static str, u64)]) {
        let events = counts
            .iter()
            .map(|&(name, value)| {
                MetricEvent::count(name, value).with_dimension(DIMENSION_REGION, self.region.clone())
            })
            .collect();
        self.sink.emit(events).await;
    }
}
