//! Observability infrastructure for the controller
//!
//! Provides:
//! - Prometheus metrics (pass latency, pass outcomes, workload writes, degraded evidence)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for pass latency (in seconds)
const PASS_LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ControllerMetricsInner> = OnceLock::new();

struct ControllerMetricsInner {
    pass_latency_seconds: Histogram,
    passes: IntCounterVec,
    workload_writes: IntCounterVec,
    degraded_sections: IntCounter,
    status_update_failures: IntCounter,
    managed_targets: IntGauge,
}

impl ControllerMetricsInner {
    fn new() -> Self {
        Self {
            pass_latency_seconds: register_histogram!(
                "ipa_controller_pass_latency_seconds",
                "Time spent reconciling one target",
                PASS_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register pass_latency_seconds"),

            passes: register_int_counter_vec!(
                "ipa_controller_passes_total",
                "Target passes by outcome",
                &["mode", "outcome"]
            )
            .expect("Failed to register passes_total"),

            workload_writes: register_int_counter_vec!(
                "ipa_controller_workload_writes_total",
                "Writes issued against managed workloads",
                &["kind"]
            )
            .expect("Failed to register workload_writes_total"),

            degraded_sections: register_int_counter!(
                "ipa_controller_degraded_evidence_sections_total",
                "Evidence sections replaced by a placeholder after a failed query"
            )
            .expect("Failed to register degraded_evidence_sections_total"),

            status_update_failures: register_int_counter!(
                "ipa_controller_status_update_failures_total",
                "Failed writes of the configuration resource status"
            )
            .expect("Failed to register status_update_failures_total"),

            managed_targets: register_int_gauge!(
                "ipa_controller_managed_targets",
                "Targets declared by the configuration resources seen in the last tick"
            )
            .expect("Failed to register managed_targets"),
        }
    }
}

/// Controller metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct ControllerMetrics {
    _private: (),
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ControllerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ControllerMetricsInner {
        GLOBAL_METRICS.get_or_init(ControllerMetricsInner::new)
    }

    pub fn observe_pass_latency(&self, duration_secs: f64) {
        self.inner().pass_latency_seconds.observe(duration_secs);
    }

    /// Count a finished target pass
    pub fn inc_pass(&self, mode: &str, outcome: &str) {
        self.inner().passes.with_label_values(&[mode, outcome]).inc();
    }

    /// Count a workload write (`replicas` or `resources`)
    pub fn inc_workload_write(&self, kind: &str) {
        self.inner().workload_writes.with_label_values(&[kind]).inc();
    }

    pub fn add_degraded_sections(&self, count: usize) {
        self.inner().degraded_sections.inc_by(count as u64);
    }

    pub fn inc_status_update_failures(&self) {
        self.inner().status_update_failures.inc();
    }

    pub fn set_managed_targets(&self, count: i64) {
        self.inner().managed_targets.set(count);
    }
}

/// Structured logger for controller events
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    /// Log a finished pass over one configuration resource
    pub fn log_pass(&self, resource: &str, targets: usize, failed: usize, requeue_secs: u64) {
        if failed == 0 {
            info!(
                event = "pass_completed",
                node = %self.node_name,
                resource = %resource,
                targets = targets,
                failed = failed,
                requeue_secs = requeue_secs,
                "Reconciliation pass completed"
            );
        } else {
            warn!(
                event = "pass_completed",
                node = %self.node_name,
                resource = %resource,
                targets = targets,
                failed = failed,
                requeue_secs = requeue_secs,
                "Reconciliation pass completed with failures"
            );
        }
    }

    pub fn log_decision(&self, target: &str, mode: &str, replicas: i32, status: &str, message: &str) {
        info!(
            event = "decision_made",
            node = %self.node_name,
            target = %target,
            mode = %mode,
            replicas = replicas,
            status = %status,
            message = %message,
            "Scaling decision produced"
        );
    }

    pub fn log_workload_update(&self, target: &str, replicas_written: bool, resources_written: bool) {
        info!(
            event = "workload_updated",
            node = %self.node_name,
            target = %target,
            replicas_written = replicas_written,
            resources_written = resources_written,
            "Workload updated"
        );
    }

    pub fn log_status_failure(&self, resource: &str, error: &str) {
        warn!(
            event = "status_update_failed",
            node = %self.node_name,
            resource = %resource,
            error = %error,
            "Failed to write resource status"
        );
    }

    pub fn log_startup(&self, version: &str, namespace: Option<&str>) {
        info!(
            event = "controller_started",
            node = %self.node_name,
            controller_version = %version,
            watch_namespace = %namespace.unwrap_or("*"),
            "Autoscaling controller started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "controller_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Autoscaling controller shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_metrics_creation() {
        let metrics = ControllerMetrics::new();
        metrics.observe_pass_latency(0.2);
        metrics.inc_pass("schedule", "succeeded");
        metrics.inc_workload_write("replicas");
        metrics.add_degraded_sections(2);
        metrics.inc_status_update_failures();
        metrics.set_managed_targets(3);

        // Second handle shares the registered metrics
        let again = ControllerMetrics::new();
        again.inc_pass("inference", "failed");
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-node");
        assert_eq!(logger.node_name, "test-node");
        logger.log_decision("shop/web", "schedule", 3, "schedule", "rule #0");
    }
}
