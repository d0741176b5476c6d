//! Access to the cluster API
//!
//! The engine talks to the cluster only through [`ClusterAccessor`]. Writes
//! take the `resourceVersion` the caller observed and fail with
//! [`ClusterError::Conflict`] when the object moved underneath them.

mod kubernetes;
#[cfg(test)]
pub(crate) mod memory;

pub use kubernetes::KubeClusterAccessor;

use crate::models::{PodEvent, ResourceSettings, TargetRef, WorkloadState};
use crate::resource::{IpaResource, IpaStatus};
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Api(String),
}

impl ClusterError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClusterError::Conflict(_))
    }
}

/// Render a label map as a `k=v,k2=v2` selector
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
pub trait ClusterAccessor: Send + Sync {
    /// Read replicas, container resources, selector and version of a workload
    async fn get_workload(&self, target: &TargetRef) -> Result<WorkloadState, ClusterError>;

    /// Names of the pods matching `selector`
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, ClusterError>;

    /// Events whose involved object is `pod`
    async fn list_pod_events(&self, namespace: &str, pod: &str) -> Result<Vec<PodEvent>, ClusterError>;

    /// Set the replica count; returns the new resource version
    async fn update_replicas(
        &self,
        target: &TargetRef,
        replicas: i32,
        resource_version: Option<&str>,
    ) -> Result<Option<String>, ClusterError>;

    /// Set identical requests/limits on every named container; returns the new resource version
    async fn update_resources(
        &self,
        target: &TargetRef,
        containers: &[String],
        resources: &ResourceSettings,
        resource_version: Option<&str>,
    ) -> Result<Option<String>, ClusterError>;

    /// Configuration resources, optionally restricted to one namespace
    async fn list_ipas(&self, namespace: Option<&str>) -> Result<Vec<IpaResource>, ClusterError>;

    /// Replace the status sub-resource of a configuration resource
    async fn patch_ipa_status(
        &self,
        namespace: &str,
        name: &str,
        status: &IpaStatus,
    ) -> Result<(), ClusterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_selector() {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "web".to_string());
        labels.insert("tier".to_string(), "frontend".to_string());
        assert_eq!(label_selector(&labels), "app=web,tier=frontend");
        assert_eq!(label_selector(&BTreeMap::new()), "");
    }

    #[test]
    fn test_conflict_classification() {
        assert!(ClusterError::Conflict("rv".into()).is_conflict());
        assert!(!ClusterError::Api("boom".into()).is_conflict());
    }
}
