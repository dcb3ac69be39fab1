//! Prometheus metrics wiring.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global metrics recorder. Safe to call once at startup.
pub fn init_metrics() {
    let handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("Failed to install metrics recorder: {}", e);
            return;
        }
    };
    let _ = HANDLE.set(handle);
}

/// Render the current metrics in Prometheus exposition format.
pub fn render_metrics() -> String {
    match HANDLE.get() {
        Some(handle) => handle.render(),
        None => "# Metrics recorder not initialized\n".to_string(),
    }
}
