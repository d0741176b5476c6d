//! Controller loop
//!
//! Lists configuration resources once per tick and runs a pass for every
//! resource whose requeue delay has elapsed. Passes run one at a time, so two
//! passes over the same resource never overlap.

use super::{PassReport, Reconciler, RequeuePolicy, StatusReporter};
use crate::cluster::ClusterAccessor;
use crate::health::{components, HealthRegistry};
use crate::observability::{ControllerMetrics, StructuredLogger};
use crate::resource::IpaResource;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// How often resources are listed (default: 1 second)
    pub tick: Duration,
    /// Restrict the controller to one namespace
    pub watch_namespace: Option<String>,
    pub requeue: RequeuePolicy,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            watch_namespace: None,
            requeue: RequeuePolicy::default(),
        }
    }
}

pub struct ControllerLoop {
    cluster: Arc<dyn ClusterAccessor>,
    reconciler: Reconciler,
    reporter: StatusReporter,
    config: LoopConfig,
    health: HealthRegistry,
    metrics: ControllerMetrics,
    logger: StructuredLogger,
    /// Next due time per `namespace/name`
    due: HashMap<String, Instant>,
}

impl ControllerLoop {
    pub fn new(
        cluster: Arc<dyn ClusterAccessor>,
        reconciler: Reconciler,
        reporter: StatusReporter,
        config: LoopConfig,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            cluster,
            reconciler,
            reporter,
            config,
            health,
            metrics: ControllerMetrics::new(),
            logger,
            due: HashMap::new(),
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            tick_ms = self.config.tick.as_millis() as u64,
            namespace = self.config.watch_namespace.as_deref().unwrap_or("*"),
            "Starting reconciliation loop"
        );

        let mut ticker = interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick_at(Instant::now()).await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down reconciliation loop");
                    break;
                }
            }
        }
    }

    /// One tick: list resources and run every pass that is due at `now`
    ///
    /// Returns the number of passes run.
    pub async fn tick_at(&mut self, now: Instant) -> usize {
        let resources = match self
            .cluster
            .list_ipas(self.config.watch_namespace.as_deref())
            .await
        {
            Ok(resources) => {
                self.health.set_healthy(components::CLUSTER).await;
                self.health.set_ready(true).await;
                resources
            }
            Err(e) => {
                warn!(error = %e, "Failed to list configuration resources");
                self.health
                    .set_unhealthy(components::CLUSTER, format!("list ipas: {}", e))
                    .await;
                return 0;
            }
        };

        self.forget_vanished(&resources);
        self.metrics.set_managed_targets(
            resources
                .iter()
                .map(|r| r.spec.metadata.ipa_group.len() + r.spec.metadata.schedule_group.len())
                .sum::<usize>() as i64,
        );

        let mut passes = 0;
        for resource in &resources {
            let key = resource.key();
            if self.due.get(&key).map_or(false, |due| *due > now) {
                continue;
            }

            let report = self.reconciler.reconcile(resource).await;
            self.reporter.report(resource, &report).await;
            let delay = self.config.requeue.next_delay(&report);
            self.due.insert(key.clone(), now + delay);
            self.record(&key, &report, delay).await;
            passes += 1;
        }
        passes
    }

    /// Next scheduled pass for a resource, if it is known
    pub fn next_due(&self, key: &str) -> Option<Instant> {
        self.due.get(key).copied()
    }

    fn forget_vanished(&mut self, resources: &[IpaResource]) {
        let present: HashSet<String> = resources.iter().map(IpaResource::key).collect();
        self.due.retain(|key, _| {
            let keep = present.contains(key);
            if !keep {
                debug!(resource = %key, "Configuration resource removed");
            }
            keep
        });
    }

    async fn record(&self, key: &str, report: &PassReport, delay: Duration) {
        let failed = report.failed_count();
        self.logger
            .log_pass(key, report.results.len(), failed, delay.as_secs());
        if failed == 0 {
            self.health.set_healthy(components::RECONCILER).await;
        } else {
            self.health
                .set_degraded(
                    components::RECONCILER,
                    format!("{}: {} target(s) failed", key, failed),
                )
                .await;
        }
    }
}
