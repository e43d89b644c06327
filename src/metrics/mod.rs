use crate::error::{Result, TokenLimitError};
use crate::rate_limit::types::DecisionPath;
use ::metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the Prometheus recorder. Only one recorder can exist per process.
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            TokenLimitError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    fn register_metrics() {
        describe_counter!(
            "tokenlimit_decisions_total",
            "Admission decisions by decision path and outcome"
        );
        describe_counter!(
            "tokenlimit_degrade_total",
            "Times a limiter fell back to its in-process bucket"
        );
        describe_counter!(
            "tokenlimit_recover_total",
            "Times a limiter resumed using the shared store"
        );
        describe_counter!(
            "tokenlimit_probe_failures_total",
            "Failed liveness probes while degraded"
        );
        describe_gauge!(
            "tokenlimit_remote_alive",
            "Shared store status as seen by the limiter (1 = live, 0 = degraded)"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Record one admission decision
pub fn record_decision(key: &str, path: DecisionPath, allowed: bool) {
    let labels = [
        ("key", key.to_string()),
        ("path", path.as_str().to_string()),
        ("allowed", allowed.to_string()),
    ];
    counter!("tokenlimit_decisions_total", &labels).increment(1);
}

pub fn record_degrade(key: &str) {
    let labels = [("key", key.to_string())];
    counter!("tokenlimit_degrade_total", &labels).increment(1);
}

pub fn record_recover(key: &str) {
    let labels = [("key", key.to_string())];
    counter!("tokenlimit_recover_total", &labels).increment(1);
}

pub fn record_probe_failure(key: &str) {
    let labels = [("key", key.to_string())];
    counter!("tokenlimit_probe_failures_total", &labels).increment(1);
}

pub fn record_remote_alive(key: &str, alive: bool) {
    let labels = [("key", key.to_string())];
    gauge!("tokenlimit_remote_alive", &labels).set(if alive { 1.0 } else { 0.0 });
}
