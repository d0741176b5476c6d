//! Writes pass outcomes back onto the configuration resource

use super::PassReport;
use crate::clock::Clock;
use crate::cluster::ClusterAccessor;
use crate::observability::{ControllerMetrics, StructuredLogger};
use crate::resource::{IpaResource, IpaStatus, TargetStatus, STATUS_SUCCESS};
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;

/// Status sub-resource content for a finished pass
pub fn build_status(report: &PassReport, now: DateTime<Utc>) -> IpaStatus {
    let status = if report.any_failed() {
        report.failures().join("; ")
    } else {
        STATUS_SUCCESS.to_string()
    };

    IpaStatus {
        status,
        last_pass_time: Some(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
        targets: report
            .results
            .iter()
            .map(|r| TargetStatus {
                namespace: r.target.namespace.clone(),
                deployment: r.target.deployment.clone(),
                outcome: r.outcome.label().to_string(),
                message: r.outcome.message(),
            })
            .collect(),
    }
}

/// Best-effort status writer
pub struct StatusReporter {
    cluster: Arc<dyn ClusterAccessor>,
    clock: Arc<dyn Clock>,
    metrics: ControllerMetrics,
    logger: StructuredLogger,
}

impl StatusReporter {
    pub fn new(cluster: Arc<dyn ClusterAccessor>, clock: Arc<dyn Clock>, logger: StructuredLogger) -> Self {
        Self {
            cluster,
            clock,
            metrics: ControllerMetrics::new(),
            logger,
        }
    }

    /// Persist the outcome of `report`; returns whether the write landed
    ///
    /// Failures are logged and counted, never propagated.
    pub async fn report(&self, resource: &IpaResource, report: &PassReport) -> bool {
        let status = build_status(report, self.clock.now());
        match self
            .cluster
            .patch_ipa_status(&resource.namespace, &resource.name, &status)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                self.metrics.inc_status_update_failures();
                self.logger.log_status_failure(&resource.key(), &e.to_string());
                false
            }
        }
    }
}
