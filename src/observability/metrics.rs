//! Prometheus export for the counters emitted through `RecorderSink`.
//!
//! Runs are short-lived, so instead of serving a scrape endpoint the rendered
//! registry is pushed to a Pushgateway once the work is done.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::common::constants::ALL_COUNTERS;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder and describe every counter. Idempotent.
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    if let Some(handle) = HANDLE.get() {
        return Some(handle);
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            for (name, help) in ALL_COUNTERS {
                ::metrics::describe_counter!(name, ::metrics::Unit::Count, help);
            }
            info!("Prometheus recorder installed ({} counters described)", ALL_COUNTERS.len());
            let _ = HANDLE.set(handle);
            HANDLE.get()
        }
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
            None
        }
    }
}

/// Render the current registry in Prometheus text format
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

pub fn push_url(base: &str, job: &str, instance: &str) -> String {
    format!(
        "{}/metrics/job/{}/instance/{}",
        base.trim_end_matches('/'),
        job,
        instance
    )
}

/// Push everything recorded so far to a Pushgateway
pub async fn push_to_pushgateway(base: &str, job: &str, instance: &str) -> anyhow::Result<()> {
    let body = render().ok_or_else(|| anyhow::anyhow!("metrics recorder not installed"))?;
    let url = push_url(base, job, instance);

    let client = reqwest::Client::new();
    let response = client
        .post(&url)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        anyhow::bail!("Pushgateway returned status {}: {}", status, text);
    }

    info!("Pushed metrics to Pushgateway for instance={}", instance);
    Ok(())
}

/// Push if a Pushgateway is configured. Failures are logged only; metrics never fail a run.
pub async fn push_if_configured(pushgateway_url: Option<&str>, job: &str, instance: &str) {
    let Some(base) = pushgateway_url.filter(|u| !u.trim().is_empty()) else {
        info!("pushgateway: not configured, skipping push");
        return;
    };
    if let Err(e) = push_to_pushgateway(base, job, instance).await {
        warn!("pushgateway: push failed for instance={}: {}", instance, e);
    }
}
