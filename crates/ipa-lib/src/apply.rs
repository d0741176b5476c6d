//! Convergence of live workload state towards a decision

use crate::cluster::{ClusterAccessor, ClusterError};
use crate::error::ApplyError;
use crate::models::{ContainerResources, ResourceSettings, ScalingDecision, TargetRef, WorkloadState};
use crate::quantity::same_quantity;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default number of attempts when writes conflict
pub const DEFAULT_CONFLICT_ATTEMPTS: u32 = 3;

/// Which writes an apply issued
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub replicas_written: bool,
    pub resources_written: bool,
}

impl ApplyReport {
    pub fn changed(&self) -> bool {
        self.replicas_written || self.resources_written
    }
}

/// True when any container's requests/limits differ from `desired` by value
pub fn resources_differ(containers: &[ContainerResources], desired: &ResourceSettings) -> bool {
    containers.iter().any(|c| {
        !(same_quantity(c.cpu_request.as_deref(), &desired.cpu_request)
            && same_quantity(c.cpu_limit.as_deref(), &desired.cpu_limit)
            && same_quantity(c.memory_request.as_deref(), &desired.memory_request)
            && same_quantity(c.memory_limit.as_deref(), &desired.memory_limit))
    })
}

/// Issues the minimal set of writes that brings a workload to a decision
#[derive(Clone)]
pub struct ConvergenceApplier {
    cluster: Arc<dyn ClusterAccessor>,
    conflict_attempts: u32,
}

impl ConvergenceApplier {
    pub fn new(cluster: Arc<dyn ClusterAccessor>) -> Self {
        Self {
            cluster,
            conflict_attempts: DEFAULT_CONFLICT_ATTEMPTS,
        }
    }

    pub fn with_conflict_attempts(mut self, attempts: u32) -> Self {
        self.conflict_attempts = attempts.max(1);
        self
    }

    /// Compare `live` with `decision` and write only what differs
    ///
    /// At most one replica write and one resource write are issued. A version
    /// conflict re-reads the workload and recomputes the diff.
    pub async fn apply(
        &self,
        target: &TargetRef,
        decision: &ScalingDecision,
        live: WorkloadState,
    ) -> Result<ApplyReport, ApplyError> {
        let mut live = live;
        let mut report = ApplyReport::default();
        let mut attempt = 1;

        loop {
            let outcome = self.converge_once(target, decision, &live, &mut report).await;
            let what = match outcome {
                Ok(()) => return Ok(report),
                Err((what, ClusterError::Conflict(reason))) => {
                    warn!(target = %target, what, attempt, reason = %reason, "Write conflicted");
                    what
                }
                Err((what, e)) => {
                    return Err(ApplyError::Write {
                        what,
                        reason: e.to_string(),
                    })
                }
            };

            if attempt >= self.conflict_attempts {
                return Err(ApplyError::ConflictExhausted {
                    what,
                    attempts: attempt,
                });
            }
            attempt += 1;

            live = self
                .cluster
                .get_workload(target)
                .await
                .map_err(|e| ApplyError::Write {
                    what,
                    reason: format!("re-read after conflict failed: {}", e),
                })?;
        }
    }

    async fn converge_once(
        &self,
        target: &TargetRef,
        decision: &ScalingDecision,
        live: &WorkloadState,
        report: &mut ApplyReport,
    ) -> Result<(), (&'static str, ClusterError)> {
        let mut version = live.resource_version.clone();

        if !report.replicas_written && live.replicas != decision.replicas {
            version = self
                .cluster
                .update_replicas(target, decision.replicas, version.as_deref())
                .await
                .map_err(|e| ("replicas", e))?;
            report.replicas_written = true;
            info!(
                target = %target,
                from = live.replicas,
                to = decision.replicas,
                "Updated replica count"
            );
        }

        if let Some(desired) = &decision.resources {
            if !report.resources_written && resources_differ(&live.containers, desired) {
                let containers: Vec<String> = live.containers.iter().map(|c| c.name.clone()).collect();
                self.cluster
                    .update_resources(target, &containers, desired, version.as_deref())
                    .await
                    .map_err(|e| ("resources", e))?;
                report.resources_written = true;
                info!(
                    target = %target,
                    containers = containers.len(),
                    cpu_request = %desired.cpu_request,
                    memory_request = %desired.memory_request,
                    "Updated container resources"
                );
            }
        }

        if !report.changed() {
            debug!(target = %target, "Workload already converged");
        }
        Ok(())
    }
}
