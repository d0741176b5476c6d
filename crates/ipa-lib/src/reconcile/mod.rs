//! Reconciliation passes
//!
//! A pass takes one configuration resource, validates it, and drives every
//! target it declares through `Fetching -> Deciding -> Applying`. Each target
//! runs under its own deadline and its own error boundary, so a broken target,
//! whether misconfigured or failing at runtime, is recorded and the remaining
//! targets still converge.

mod r#loop;
mod requeue;
mod status;

pub use r#loop::{ControllerLoop, LoopConfig};
pub use requeue::RequeuePolicy;
pub use status::{build_status, StatusReporter};

use crate::apply::{ApplyReport, ConvergenceApplier};
use crate::clock::{Clock, SystemClock};
use crate::cluster::{ClusterAccessor, ClusterError};
use crate::error::{AcquisitionError, ConfigError, ReconcileError, TargetError};
use crate::health::{components, HealthRegistry};
use crate::metrics::{AggregationInput, MetricsAggregator};
use crate::models::{AutoscaleTarget, Decision, ScalingDecision, TargetMode, TargetRef, WorkloadState};
use crate::observability::{ControllerMetrics, StructuredLogger};
use crate::policy::{ExternalInferencePolicy, ScheduleRulePolicy};
use crate::resource::{IpaResource, RejectedTarget, ValidatedConfig};
use crate::retry::RetryPolicy;
use crate::transport::HttpTransport;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Where a target pass currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    Fetching,
    Deciding,
    Applying,
    Succeeded,
    Failed,
}

impl PassState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PassState::Succeeded | PassState::Failed)
    }

    /// Legal moves; any running state may fail, deciding may finish early on abstain
    pub fn can_transition_to(&self, next: PassState) -> bool {
        use PassState::*;
        match (self, next) {
            (Idle, Fetching) | (Fetching, Deciding) | (Deciding, Applying) => true,
            (Deciding, Succeeded) | (Applying, Succeeded) => true,
            (s, Failed) => !s.is_terminal(),
            _ => false,
        }
    }
}

/// Tracks the state of one target pass
#[derive(Debug)]
struct PassTracker {
    target: TargetRef,
    state: PassState,
}

impl PassTracker {
    fn new(target: &TargetRef) -> Self {
        Self {
            target: target.clone(),
            state: PassState::Idle,
        }
    }

    fn enter(&mut self, next: PassState) {
        if !self.state.can_transition_to(next) {
            warn!(target = %self.target, from = ?self.state, to = ?next, "Unexpected pass transition");
        }
        debug!(target = %self.target, from = ?self.state, to = ?next, "Pass state changed");
        self.state = next;
    }
}

/// How one target's pass ended
#[derive(Debug)]
pub enum TargetOutcome {
    Succeeded {
        decision: ScalingDecision,
        report: ApplyReport,
    },
    Abstained {
        reason: String,
    },
    Failed(TargetError),
}

impl TargetOutcome {
    /// Label written to the resource status
    pub fn label(&self) -> &'static str {
        match self {
            TargetOutcome::Succeeded { .. } => "Succeeded",
            TargetOutcome::Abstained { .. } => "Abstained",
            TargetOutcome::Failed(_) => "Failed",
        }
    }

    pub fn message(&self) -> String {
        match self {
            TargetOutcome::Succeeded { decision, .. } => decision.message.clone(),
            TargetOutcome::Abstained { reason } => reason.clone(),
            TargetOutcome::Failed(e) => e.source.to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TargetOutcome::Failed(_))
    }

    pub fn changed(&self) -> bool {
        matches!(self, TargetOutcome::Succeeded { report, .. } if report.changed())
    }
}

#[derive(Debug)]
pub struct TargetResult {
    pub target: TargetRef,
    pub mode: &'static str,
    pub outcome: TargetOutcome,
}

/// Everything one pass over a configuration resource produced
#[derive(Debug)]
pub struct PassReport {
    /// `namespace/name` of the configuration resource
    pub resource: String,
    pub results: Vec<TargetResult>,
    /// Set when the resource itself failed validation; no target ran
    pub config_error: Option<ConfigError>,
}

impl PassReport {
    pub fn new(resource: impl Into<String>, results: Vec<TargetResult>) -> Self {
        Self {
            resource: resource.into(),
            results,
            config_error: None,
        }
    }

    pub fn invalid(resource: impl Into<String>, error: ConfigError) -> Self {
        Self {
            resource: resource.into(),
            results: Vec::new(),
            config_error: Some(error),
        }
    }

    pub fn any_failed(&self) -> bool {
        self.config_error.is_some() || self.results.iter().any(|r| r.outcome.is_failed())
    }

    pub fn any_changed(&self) -> bool {
        self.results.iter().any(|r| r.outcome.changed())
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_failed()).count()
            + usize::from(self.config_error.is_some())
    }

    /// One `<subject>: <error>` entry per failure
    pub fn failures(&self) -> Vec<String> {
        let resource_failure = self
            .config_error
            .iter()
            .map(|e| format!("{}: {}", self.resource, e));
        let target_failures = self.results.iter().filter_map(|r| match &r.outcome {
            TargetOutcome::Failed(e) => Some(e.to_string()),
            _ => None,
        });
        resource_failure.chain(target_failures).collect()
    }
}

/// Tunables of a pass
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Deadline for one target pass (default: 120 seconds)
    pub pass_timeout: Duration,
    /// Retry schedule for monitoring queries
    pub query_retry: RetryPolicy,
    /// Attempts for conflicting workload writes (default: 3)
    pub conflict_attempts: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            pass_timeout: Duration::from_secs(120),
            query_retry: RetryPolicy::default(),
            conflict_attempts: crate::apply::DEFAULT_CONFLICT_ATTEMPTS,
        }
    }
}

/// Runs passes over configuration resources
pub struct Reconciler {
    cluster: Arc<dyn ClusterAccessor>,
    aggregator: MetricsAggregator,
    inference: ExternalInferencePolicy,
    schedule: ScheduleRulePolicy,
    applier: ConvergenceApplier,
    clock: Arc<dyn Clock>,
    health: HealthRegistry,
    metrics: ControllerMetrics,
    logger: StructuredLogger,
    pass_timeout: Duration,
}

impl Reconciler {
    /// Run one pass over every target of `resource`
    pub async fn reconcile(&self, resource: &IpaResource) -> PassReport {
        let key = resource.key();
        let mut config = match resource.validate() {
            Ok(config) => config,
            Err(e) => {
                warn!(resource = %key, error = %e, "Configuration resource is invalid");
                return PassReport::invalid(key, e);
            }
        };

        let mut results = Vec::with_capacity(config.targets.len() + config.rejected.len());
        for rejected in std::mem::take(&mut config.rejected) {
            results.push(self.reject_target(rejected));
        }
        for target in &config.targets {
            results.push(self.reconcile_target(&config, target).await);
        }
        PassReport::new(key, results)
    }

    /// Record a group entry whose own configuration is broken
    fn reject_target(&self, rejected: RejectedTarget) -> TargetResult {
        warn!(
            target = %rejected.target,
            mode = rejected.mode,
            error = %rejected.error,
            "Target configuration is invalid"
        );
        self.metrics.inc_pass(rejected.mode, "failed");
        TargetResult {
            target: rejected.target.clone(),
            mode: rejected.mode,
            outcome: TargetOutcome::Failed(TargetError::new(rejected.target, rejected.error)),
        }
    }

    async fn reconcile_target(&self, config: &ValidatedConfig, target: &AutoscaleTarget) -> TargetResult {
        let started = Instant::now();
        let mut tracker = PassTracker::new(&target.target);
        tracker.enter(PassState::Fetching);

        let result = tokio::time::timeout(self.pass_timeout, self.run_target(config, target, &mut tracker))
            .await
            .unwrap_or_else(|_| Err(AcquisitionError::Timeout(self.pass_timeout).into()));

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracker.enter(PassState::Failed);
                warn!(
                    target = %target.target,
                    mode = target.mode.name(),
                    kind = e.kind(),
                    error = %e,
                    "Target pass failed"
                );
                TargetOutcome::Failed(TargetError::new(target.target.clone(), e))
            }
        };

        self.metrics.observe_pass_latency(started.elapsed().as_secs_f64());
        self.metrics
            .inc_pass(target.mode.name(), &outcome.label().to_ascii_lowercase());

        TargetResult {
            target: target.target.clone(),
            mode: target.mode.name(),
            outcome,
        }
    }

    async fn run_target(
        &self,
        config: &ValidatedConfig,
        target: &AutoscaleTarget,
        tracker: &mut PassTracker,
    ) -> Result<TargetOutcome, ReconcileError> {
        let id = &target.target;
        let live = match self.cluster.get_workload(id).await {
            Ok(live) => live,
            Err(e) => return Err(self.read_error(id, "get_workload", e).await),
        };

        let decision = match &target.mode {
            TargetMode::Schedule { rules, require_match } => {
                tracker.enter(PassState::Deciding);
                self.schedule.decide(rules, self.clock.hour(), *require_match)?
            }
            TargetMode::Inference { ingress } => {
                let input = self.gather_input(id, &live, ingress.clone()).await?;
                tracker.enter(PassState::Deciding);
                Decision::Scale(self.infer(config, &input).await?)
            }
        };
        self.health.set_healthy(components::CLUSTER).await;

        let decision = match decision {
            Decision::Abstain { reason } => {
                debug!(target = %id, reason = %reason, "Policy abstained");
                tracker.enter(PassState::Succeeded);
                return Ok(TargetOutcome::Abstained { reason });
            }
            Decision::Scale(decision) => decision,
        };

        self.logger.log_decision(
            &id.to_string(),
            target.mode.name(),
            decision.replicas,
            &decision.status,
            &decision.message,
        );

        tracker.enter(PassState::Applying);
        let report = self.applier.apply(id, &decision, live).await?;
        if report.replicas_written {
            self.metrics.inc_workload_write("replicas");
        }
        if report.resources_written {
            self.metrics.inc_workload_write("resources");
        }
        if report.changed() {
            self.logger
                .log_workload_update(&id.to_string(), report.replicas_written, report.resources_written);
        }

        tracker.enter(PassState::Succeeded);
        Ok(TargetOutcome::Succeeded { decision, report })
    }

    /// Pods, events and resource summary for the evidence bundle
    async fn gather_input(
        &self,
        id: &TargetRef,
        live: &WorkloadState,
        ingress: Option<String>,
    ) -> Result<AggregationInput, ReconcileError> {
        let pods = match self.cluster.list_pods(&id.namespace, &live.selector).await {
            Ok(pods) => pods,
            Err(e) => return Err(self.read_error(id, "list_pods", e).await),
        };

        let mut events = Vec::new();
        for pod in &pods {
            match self.cluster.list_pod_events(&id.namespace, pod).await {
                Ok(pod_events) => events.extend(pod_events),
                Err(e) => return Err(self.read_error(id, "list_pod_events", e).await),
            }
        }

        Ok(AggregationInput::new(id.clone())
            .with_pods(pods)
            .with_ingress(ingress)
            .with_resource_summary(live.resource_summary())
            .with_events(events))
    }

    async fn infer(
        &self,
        config: &ValidatedConfig,
        input: &AggregationInput,
    ) -> Result<ScalingDecision, ReconcileError> {
        let prometheus_uri = config
            .prometheus_uri
            .as_deref()
            .ok_or(ConfigError::MissingField("prometheusUri"))?;
        let decision_uri = config
            .decision_uri
            .as_deref()
            .ok_or(ConfigError::MissingField("llmAgent"))?;

        let evidence = match self.aggregator.aggregate(prometheus_uri, input).await {
            Ok(evidence) => evidence,
            Err(e) => {
                self.health
                    .set_unhealthy(components::MONITORING, e.to_string())
                    .await;
                return Err(e.into());
            }
        };

        let degraded = evidence.degraded_count();
        if degraded > 0 {
            self.metrics.add_degraded_sections(degraded);
            self.health
                .set_degraded(
                    components::MONITORING,
                    format!("{} evidence section(s) unavailable", degraded),
                )
                .await;
        } else {
            self.health.set_healthy(components::MONITORING).await;
        }

        match self.inference.decide(decision_uri, &evidence).await {
            Ok(decision) => {
                self.health.set_healthy(components::DECISION_SERVICE).await;
                Ok(decision)
            }
            Err(e) => {
                self.health
                    .set_degraded(components::DECISION_SERVICE, e.to_string())
                    .await;
                Err(e.into())
            }
        }
    }

    /// Classify a failed cluster read; anything but a missing workload degrades cluster health
    async fn read_error(&self, target: &TargetRef, call: &'static str, error: ClusterError) -> ReconcileError {
        match error {
            ClusterError::NotFound(_) if call == "get_workload" => {
                ConfigError::WorkloadNotFound(target.clone()).into()
            }
            other => {
                self.health
                    .set_degraded(components::CLUSTER, format!("{} for {}: {}", call, target, other))
                    .await;
                AcquisitionError::Cluster {
                    call,
                    reason: other.to_string(),
                }
                .into()
            }
        }
    }
}

/// Builder for a [`Reconciler`]
pub struct ReconcilerBuilder {
    cluster: Option<Arc<dyn ClusterAccessor>>,
    transport: Option<Arc<dyn HttpTransport>>,
    clock: Arc<dyn Clock>,
    health: HealthRegistry,
    node_name: String,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    pub fn new() -> Self {
        Self {
            cluster: None,
            transport: None,
            clock: Arc::new(SystemClock),
            health: HealthRegistry::new(),
            node_name: "unknown".to_string(),
            config: ReconcilerConfig::default(),
        }
    }

    pub fn cluster(mut self, cluster: Arc<dyn ClusterAccessor>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    pub fn config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Reconciler> {
        let cluster = self
            .cluster
            .ok_or_else(|| anyhow::anyhow!("Cluster accessor is required"))?;
        let transport = self
            .transport
            .ok_or_else(|| anyhow::anyhow!("HTTP transport is required"))?;

        Ok(Reconciler {
            aggregator: MetricsAggregator::new(transport.clone(), self.clock.clone())
                .with_retry(self.config.query_retry),
            inference: ExternalInferencePolicy::new(transport),
            schedule: ScheduleRulePolicy,
            applier: ConvergenceApplier::new(cluster.clone())
                .with_conflict_attempts(self.config.conflict_attempts),
            cluster,
            clock: self.clock,
            health: self.health,
            metrics: ControllerMetrics::new(),
            logger: StructuredLogger::new(self.node_name),
            pass_timeout: self.config.pass_timeout,
        })
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
