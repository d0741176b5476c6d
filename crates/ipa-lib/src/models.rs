//! Core data models for the autoscaling engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of one managed workload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    pub namespace: String,
    pub deployment: String,
}

impl TargetRef {
    pub fn new(namespace: impl Into<String>, deployment: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            deployment: deployment.into(),
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.deployment)
    }
}

/// A single hour-of-day window mapped to a replica count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRule {
    /// First hour of the window (0-23, inclusive)
    #[serde(rename = "from")]
    pub from_hour: u32,
    /// Last hour of the window (0-23, inclusive)
    #[serde(rename = "to")]
    pub to_hour: u32,
    pub replicas: i32,
    /// Higher priority wins when several rules are active
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

impl ScheduleRule {
    pub fn new(from_hour: u32, to_hour: u32, replicas: i32) -> Self {
        Self {
            from_hour,
            to_hour,
            replicas,
            priority: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn effective_priority(&self) -> i32 {
        self.priority.unwrap_or(0)
    }
}

/// How a target's desired state is decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetMode {
    /// Recommendation from the external decision service
    Inference { ingress: Option<String> },
    /// Fixed time-of-day rules
    Schedule {
        rules: Vec<ScheduleRule>,
        require_match: bool,
    },
}

impl TargetMode {
    pub fn name(&self) -> &'static str {
        match self {
            TargetMode::Inference { .. } => "inference",
            TargetMode::Schedule { .. } => "schedule",
        }
    }
}

/// One managed workload and the policy that governs it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoscaleTarget {
    pub target: TargetRef,
    pub mode: TargetMode,
}

/// Uniform resource settings applied to every container of a workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSettings {
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
}

/// Recommended desired state for one target for one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub replicas: i32,
    /// Absent for decisions that only scale horizontally
    pub resources: Option<ResourceSettings>,
    pub status: String,
    pub message: String,
}

impl ScalingDecision {
    pub fn replicas_only(replicas: i32, message: impl Into<String>) -> Self {
        Self {
            replicas,
            resources: None,
            status: "schedule".to_string(),
            message: message.into(),
        }
    }
}

/// Result of running a decision policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Scale(ScalingDecision),
    /// The policy had nothing to say this pass
    Abstain { reason: String },
}

/// Live resource requests/limits of one container
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContainerResources {
    pub name: String,
    pub cpu_request: Option<String>,
    pub cpu_limit: Option<String>,
    pub memory_request: Option<String>,
    pub memory_limit: Option<String>,
}

impl ContainerResources {
    /// Render the one-line summary embedded in the evidence bundle
    pub fn summary(&self) -> String {
        fn show(value: &Option<String>) -> &str {
            value.as_deref().unwrap_or("0")
        }

        format!(
            "container {}: CPU Resource Requests: {}, CPU Resource Limits: {}, Memory Resource Requests: {}, Memory Resource Limits: {}",
            self.name,
            show(&self.cpu_request),
            show(&self.cpu_limit),
            show(&self.memory_request),
            show(&self.memory_limit),
        )
    }
}

/// Live state of a managed workload as read from the cluster
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkloadState {
    pub replicas: i32,
    pub containers: Vec<ContainerResources>,
    pub selector: BTreeMap<String, String>,
    /// Version the state was observed at; writes are conditioned on it
    pub resource_version: Option<String>,
}

impl WorkloadState {
    pub fn resource_summary(&self) -> String {
        self.containers
            .iter()
            .map(ContainerResources::summary)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A Kubernetes event attached to one of the workload's pods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodEvent {
    pub pod: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub reason: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_ref_display() {
        let target = TargetRef::new("shop", "web");
        assert_eq!(target.to_string(), "shop/web");
    }

    #[test]
    fn test_schedule_rule_serde_names() {
        let rule: ScheduleRule =
            serde_json::from_str(r#"{"from": 22, "to": 6, "replicas": 2}"#).unwrap();
        assert_eq!(rule, ScheduleRule::new(22, 6, 2));
        assert_eq!(rule.effective_priority(), 0);
    }

    #[test]
    fn test_resource_summary_lists_every_container() {
        let state = WorkloadState {
            replicas: 2,
            containers: vec![
                ContainerResources {
                    name: "app".to_string(),
                    cpu_request: Some("200m".to_string()),
                    cpu_limit: Some("500m".to_string()),
                    memory_request: Some("128Mi".to_string()),
                    memory_limit: Some("256Mi".to_string()),
                },
                ContainerResources {
                    name: "sidecar".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let summary = state.resource_summary();
        assert!(summary.contains("container app: CPU Resource Requests: 200m"));
        assert!(summary.contains("container sidecar: CPU Resource Requests: 0"));
        assert_eq!(summary.lines().count(), 2);
    }
}
