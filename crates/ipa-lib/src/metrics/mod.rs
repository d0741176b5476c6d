//! Evidence acquisition from the monitoring backend
//!
//! The [`MetricsAggregator`] issues one range query per metric section and
//! assembles the answers, together with the live resource summary and pod
//! events, into an [`EvidenceBundle`]. Transient failures are retried; a
//! query that still fails leaves an explicit placeholder behind. Only when
//! every issued query fails does aggregation itself fail.

mod evidence;
pub mod query;

pub use evidence::{flatten_events, strip_escapes, EvidenceBundle, EvidenceSection, SectionKind};

use crate::clock::Clock;
use crate::error::AcquisitionError;
use crate::models::{PodEvent, TargetRef};
use crate::retry::RetryPolicy;
use crate::transport::{endpoint, HttpResponse, HttpTransport, TransportError};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Placeholder text for targets without an ingress
pub const NO_INGRESS: &str = "no ingress configured";

/// Everything the aggregator needs to know about one target
#[derive(Debug, Clone)]
pub struct AggregationInput {
    pub target: TargetRef,
    pub pods: Vec<String>,
    pub ingress: Option<String>,
    pub resource_summary: String,
    pub events: Vec<PodEvent>,
}

impl AggregationInput {
    pub fn new(target: TargetRef) -> Self {
        Self {
            target,
            pods: Vec::new(),
            ingress: None,
            resource_summary: String::new(),
            events: Vec::new(),
        }
    }

    pub fn with_pods(mut self, pods: Vec<String>) -> Self {
        self.pods = pods;
        self
    }

    pub fn with_ingress(mut self, ingress: Option<String>) -> Self {
        self.ingress = ingress;
        self
    }

    pub fn with_resource_summary(mut self, summary: impl Into<String>) -> Self {
        self.resource_summary = summary.into();
        self
    }

    pub fn with_events(mut self, events: Vec<PodEvent>) -> Self {
        self.events = events;
        self
    }
}

/// Why one range query failed
#[derive(Debug)]
enum QueryFailure {
    Transport(TransportError),
    Status(HttpResponse),
}

impl QueryFailure {
    fn is_transient(&self) -> bool {
        match self {
            QueryFailure::Transport(e) => e.is_transient(),
            QueryFailure::Status(r) => r.is_transient_failure(),
        }
    }
}

impl fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryFailure::Transport(e) => write!(f, "{}", e),
            QueryFailure::Status(r) => write!(f, "HTTP {}", r.status),
        }
    }
}

/// Builds evidence bundles from the monitoring backend
#[derive(Clone)]
pub struct MetricsAggregator {
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl MetricsAggregator {
    pub fn new(transport: Arc<dyn HttpTransport>, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            clock,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Query every metric for `input` and assemble the bundle
    pub async fn aggregate(
        &self,
        prometheus_uri: &str,
        input: &AggregationInput,
    ) -> Result<EvidenceBundle, AcquisitionError> {
        let url = endpoint(prometheus_uri, query::QUERY_RANGE_PATH).map_err(|e| {
            AcquisitionError::Query {
                query: query::QUERY_RANGE_PATH.to_string(),
                reason: e.to_string(),
            }
        })?;

        let namespace = input.target.namespace.as_str();
        let pods = query::pod_disjunction(&input.pods);

        let mut queries = Vec::with_capacity(SectionKind::METRICS.len());
        queries.push((
            SectionKind::DeploymentReplicas,
            query::deployment_replicas(&input.target),
        ));
        queries.push((SectionKind::CpuUsage, query::cpu_usage(namespace, &pods)));
        queries.push((SectionKind::MemoryUsage, query::memory_usage(namespace, &pods)));
        queries.push((SectionKind::NodeAvailableMemory, query::node_available_memory()));
        if let Some(ingress) = &input.ingress {
            queries.push((
                SectionKind::IngressRequestRate,
                query::ingress_request_rate(namespace, ingress),
            ));
        }

        let now = self.clock.now();
        let transport = &self.transport;
        let mut bundle = EvidenceBundle::new();
        let mut first_failure: Option<(String, String)> = None;
        let issued = queries.len();
        let mut failed = 0;

        for (kind, expr) in queries {
            let params = query::range_params(&expr, now);
            let (query_url, params) = (url.as_str(), &params);
            let result = self
                .retry
                .run(
                    move || async move {
                        match transport.get(query_url, params).await {
                            Ok(response) if response.is_ok() => Ok(response),
                            Ok(response) => Err(QueryFailure::Status(response)),
                            Err(e) => Err(QueryFailure::Transport(e)),
                        }
                    },
                    QueryFailure::is_transient,
                )
                .await;

            match result {
                Ok(response) => {
                    debug!(section = kind.label(), bytes = response.body.len(), "Metric query answered");
                    bundle.push(EvidenceSection::metric(kind, expr, &response.body));
                }
                Err(failure) => {
                    let reason = failure.to_string();
                    warn!(section = kind.label(), query = %expr, error = %reason, "Metric query failed");
                    failed += 1;
                    if first_failure.is_none() {
                        first_failure = Some((expr.clone(), reason.clone()));
                    }
                    bundle.push(EvidenceSection::unavailable(kind, expr, &reason));
                }
            }
        }

        if failed == issued {
            if let Some((query, reason)) = first_failure {
                return Err(AcquisitionError::AllQueriesFailed { query, reason });
            }
        }

        if input.ingress.is_none() {
            bundle.push(EvidenceSection::verbatim(SectionKind::IngressRequestRate, NO_INGRESS));
        }
        bundle.push(EvidenceSection::verbatim(
            SectionKind::ResourceSpec,
            input.resource_summary.clone(),
        ));
        bundle.push(EvidenceSection::verbatim(
            SectionKind::PodEvents,
            flatten_events(&input.events),
        ));

        Ok(bundle)
    }
}
