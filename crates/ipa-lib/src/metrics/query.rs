//! PromQL templates for the evidence bundle

use crate::models::TargetRef;
use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

/// Range-query path relative to the monitoring backend base URI
pub const QUERY_RANGE_PATH: &str = "api/v1/query_range";

/// How far back every range query looks
pub const LOOKBACK: Duration = Duration::from_secs(5 * 60);

/// Resolution of every range query
pub const STEP: &str = "60s";

/// `name1|name2|...`; empty for an empty pod set
pub fn pod_disjunction(pods: &[String]) -> String {
    pods.join("|")
}

pub fn deployment_replicas(target: &TargetRef) -> String {
    format!(
        "kube_deployment_status_replicas{{deployment=\"{}\",namespace=\"{}\"}}",
        target.deployment, target.namespace
    )
}

pub fn cpu_usage(namespace: &str, pods: &str) -> String {
    format!(
        "sum(rate(container_cpu_usage_seconds_total{{namespace=\"{}\",pod=~\"{}\",container!=\"\"}}[5m])) by (pod)",
        namespace, pods
    )
}

pub fn memory_usage(namespace: &str, pods: &str) -> String {
    format!(
        "sum(container_memory_working_set_bytes{{namespace=\"{}\",pod=~\"{}\",container!=\"\"}}) by (pod)",
        namespace, pods
    )
}

pub fn node_available_memory() -> String {
    "node_memory_MemAvailable_bytes".to_string()
}

pub fn ingress_request_rate(namespace: &str, ingress: &str) -> String {
    format!(
        "sum(rate(nginx_ingress_controller_requests{{namespace=\"{}\",ingress=\"{}\"}}[5m]))",
        namespace, ingress
    )
}

/// Query parameters for a range query ending at `now`
pub fn range_params(expr: &str, now: DateTime<Utc>) -> Vec<(String, String)> {
    let lookback = chrono::Duration::from_std(LOOKBACK).unwrap_or_else(|_| chrono::Duration::minutes(5));
    let start = now - lookback;
    vec![
        ("query".to_string(), expr.to_string()),
        (
            "start".to_string(),
            start.to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
        (
            "end".to_string(),
            now.to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
        ("step".to_string(), STEP.to_string()),
    ]
}
