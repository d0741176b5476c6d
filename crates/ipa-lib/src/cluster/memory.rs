//! In-memory cluster used by unit tests

use super::{ClusterAccessor, ClusterError};
use crate::models::{ContainerResources, PodEvent, ResourceSettings, TargetRef, WorkloadState};
use crate::resource::{IpaResource, IpaStatus};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryCluster {
    workloads: Mutex<HashMap<TargetRef, WorkloadState>>,
    pods: Mutex<HashMap<String, Vec<(String, BTreeMap<String, String>)>>>,
    events: Mutex<Vec<(String, PodEvent)>>,
    ipas: Mutex<Vec<IpaResource>>,
    statuses: Mutex<Vec<(String, IpaStatus)>>,
    failing_reads: Mutex<HashSet<TargetRef>>,
    failing_writes: Mutex<HashSet<TargetRef>>,
    pending_conflicts: AtomicU32,
    fail_status: AtomicBool,
    pub replica_writes: AtomicUsize,
    pub resource_writes: AtomicUsize,
    pub workload_reads: AtomicUsize,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a workload with one container per name, no resources set
    pub fn add_workload(&self, target: &TargetRef, replicas: i32, containers: &[&str]) {
        let mut selector = BTreeMap::new();
        selector.insert("app".to_string(), target.deployment.clone());
        let state = WorkloadState {
            replicas,
            containers: containers
                .iter()
                .map(|name| ContainerResources {
                    name: name.to_string(),
                    ..Default::default()
                })
                .collect(),
            selector,
            resource_version: Some("1".to_string()),
        };
        self.workloads.lock().unwrap().insert(target.clone(), state);
    }

    pub fn set_resources(&self, target: &TargetRef, resources: &ResourceSettings) {
        if let Some(state) = self.workloads.lock().unwrap().get_mut(target) {
            for container in &mut state.containers {
                apply_settings(container, resources);
            }
        }
    }

    pub fn add_pod(&self, target: &TargetRef, pod: &str) {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), target.deployment.clone());
        self.pods
            .lock()
            .unwrap()
            .entry(target.namespace.clone())
            .or_default()
            .push((pod.to_string(), labels));
    }

    pub fn add_event(&self, namespace: &str, event: PodEvent) {
        self.events.lock().unwrap().push((namespace.to_string(), event));
    }

    pub fn add_ipa(&self, resource: IpaResource) {
        self.ipas.lock().unwrap().push(resource);
    }

    pub fn remove_ipa(&self, key: &str) {
        self.ipas.lock().unwrap().retain(|r| r.key() != key);
    }

    pub fn workload(&self, target: &TargetRef) -> Option<WorkloadState> {
        self.workloads.lock().unwrap().get(target).cloned()
    }

    /// Status writes in the order they happened, keyed by `namespace/name`
    pub fn statuses(&self) -> Vec<(String, IpaStatus)> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn fail_reads_for(&self, target: &TargetRef) {
        self.failing_reads.lock().unwrap().insert(target.clone());
    }

    pub fn fail_writes_for(&self, target: &TargetRef) {
        self.failing_writes.lock().unwrap().insert(target.clone());
    }

    /// Make the next `n` writes lose a race against another writer
    pub fn inject_conflicts(&self, n: u32) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    pub fn fail_status_writes(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.replica_writes.load(Ordering::SeqCst) + self.resource_writes.load(Ordering::SeqCst)
    }

    fn write<F>(&self, target: &TargetRef, version: Option<&str>, mutate: F) -> Result<Option<String>, ClusterError>
    where
        F: FnOnce(&mut WorkloadState),
    {
        if self.failing_writes.lock().unwrap().contains(target) {
            return Err(ClusterError::Api("admission webhook denied the request".to_string()));
        }

        let mut workloads = self.workloads.lock().unwrap();
        let state = workloads
            .get_mut(target)
            .ok_or_else(|| ClusterError::NotFound(target.to_string()))?;

        if self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            bump_version(state);
            return Err(ClusterError::Conflict("object has been modified".to_string()));
        }
        if version.is_some() && version != state.resource_version.as_deref() {
            return Err(ClusterError::Conflict("stale resource version".to_string()));
        }

        mutate(state);
        bump_version(state);
        Ok(state.resource_version.clone())
    }
}

fn bump_version(state: &mut WorkloadState) {
    let next = state
        .resource_version
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    state.resource_version = Some(next.to_string());
}

fn apply_settings(container: &mut ContainerResources, resources: &ResourceSettings) {
    container.cpu_request = Some(resources.cpu_request.clone());
    container.cpu_limit = Some(resources.cpu_limit.clone());
    container.memory_request = Some(resources.memory_request.clone());
    container.memory_limit = Some(resources.memory_limit.clone());
}

#[async_trait]
impl ClusterAccessor for InMemoryCluster {
    async fn get_workload(&self, target: &TargetRef) -> Result<WorkloadState, ClusterError> {
        self.workload_reads.fetch_add(1, Ordering::SeqCst);
        if self.failing_reads.lock().unwrap().contains(target) {
            return Err(ClusterError::Api("connection reset by peer".to_string()));
        }
        self.workload(target)
            .ok_or_else(|| ClusterError::NotFound(target.to_string()))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, ClusterError> {
        Ok(self
            .pods
            .lock()
            .unwrap()
            .get(namespace)
            .map(|pods| {
                pods.iter()
                    .filter(|(_, labels)| selector.iter().all(|(k, v)| labels.get(k) == Some(v)))
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_pod_events(&self, namespace: &str, pod: &str) -> Result<Vec<PodEvent>, ClusterError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|(ns, e)| ns == namespace && e.pod == pod)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn update_replicas(
        &self,
        target: &TargetRef,
        replicas: i32,
        resource_version: Option<&str>,
    ) -> Result<Option<String>, ClusterError> {
        let version = self.write(target, resource_version, |state| state.replicas = replicas)?;
        self.replica_writes.fetch_add(1, Ordering::SeqCst);
        Ok(version)
    }

    async fn update_resources(
        &self,
        target: &TargetRef,
        containers: &[String],
        resources: &ResourceSettings,
        resource_version: Option<&str>,
    ) -> Result<Option<String>, ClusterError> {
        let version = self.write(target, resource_version, |state| {
            for container in state.containers.iter_mut().filter(|c| containers.contains(&c.name)) {
                apply_settings(container, resources);
            }
        })?;
        self.resource_writes.fetch_add(1, Ordering::SeqCst);
        Ok(version)
    }

    async fn list_ipas(&self, namespace: Option<&str>) -> Result<Vec<IpaResource>, ClusterError> {
        Ok(self
            .ipas
            .lock()
            .unwrap()
            .iter()
            .filter(|r| namespace.map_or(true, |ns| r.namespace == ns))
            .cloned()
            .collect())
    }

    async fn patch_ipa_status(
        &self,
        namespace: &str,
        name: &str,
        status: &IpaStatus,
    ) -> Result<(), ClusterError> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(ClusterError::Api("status subresource unavailable".to_string()));
        }
        let key = format!("{}/{}", namespace, name);
        self.statuses.lock().unwrap().push((key, status.clone()));
        Ok(())
    }
}
