//! `kube`-backed cluster accessor

use super::{label_selector, ClusterAccessor, ClusterError};
use crate::models::{ContainerResources, PodEvent, ResourceSettings, TargetRef, WorkloadState};
use crate::resource::{IpaResource, IpaStatus, IPA_GROUP, IPA_KIND, IPA_PLURAL, IPA_VERSION};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, Event, Pod};
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ListParams, Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

pub struct KubeClusterAccessor {
    client: Client,
    ipa_resource: ApiResource,
}

impl KubeClusterAccessor {
    pub fn new(client: Client) -> Self {
        let gvk = GroupVersionKind::gvk(IPA_GROUP, IPA_VERSION, IPA_KIND);
        Self {
            client,
            ipa_resource: ApiResource::from_gvk_with_plural(&gvk, IPA_PLURAL),
        }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn ipas(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &self.ipa_resource),
            None => Api::all_with(self.client.clone(), &self.ipa_resource),
        }
    }

    async fn patch_deployment(
        &self,
        target: &TargetRef,
        patch: Patch<serde_json::Value>,
    ) -> Result<Option<String>, ClusterError> {
        let updated = self
            .deployments(&target.namespace)
            .patch(&target.deployment, &PatchParams::default(), &patch)
            .await
            .map_err(|e| map_kube_error(e, &target.to_string()))?;
        Ok(updated.metadata.resource_version)
    }
}

fn map_kube_error(error: kube::Error, object: &str) -> ClusterError {
    match &error {
        kube::Error::Api(response) if response.code == 404 => ClusterError::NotFound(object.to_string()),
        kube::Error::Api(response) if response.code == 409 => ClusterError::Conflict(response.message.clone()),
        _ => ClusterError::Api(error.to_string()),
    }
}

fn container_resources(container: &Container) -> ContainerResources {
    let resources = container.resources.as_ref();
    let pick = |requests: bool, key: &str| {
        resources
            .and_then(|r| if requests { r.requests.as_ref() } else { r.limits.as_ref() })
            .and_then(|m| m.get(key))
            .map(|q| q.0.clone())
    };
    ContainerResources {
        name: container.name.clone(),
        cpu_request: pick(true, "cpu"),
        cpu_limit: pick(false, "cpu"),
        memory_request: pick(true, "memory"),
        memory_limit: pick(false, "memory"),
    }
}

fn workload_state(deployment: Deployment) -> WorkloadState {
    let resource_version = deployment.metadata.resource_version;
    let spec = deployment.spec.unwrap_or_default();
    let containers = spec
        .template
        .spec
        .map(|pod| pod.containers.iter().map(container_resources).collect())
        .unwrap_or_default();

    WorkloadState {
        // The API server defaults an unset count to one
        replicas: spec.replicas.unwrap_or(1),
        containers,
        selector: spec.selector.match_labels.unwrap_or_default(),
        resource_version,
    }
}

fn resources_patch(
    containers: &[String],
    resources: &ResourceSettings,
    resource_version: Option<&str>,
) -> serde_json::Value {
    let containers: Vec<_> = containers
        .iter()
        .map(|name| {
            json!({
                "name": name,
                "resources": {
                    "requests": {"cpu": resources.cpu_request, "memory": resources.memory_request},
                    "limits": {"cpu": resources.cpu_limit, "memory": resources.memory_limit},
                }
            })
        })
        .collect();

    let mut patch = json!({"spec": {"template": {"spec": {"containers": containers}}}});
    if let Some(version) = resource_version {
        patch["metadata"] = json!({"resourceVersion": version});
    }
    patch
}

/// Merge body for the status sub-resource
///
/// `targets` is always present so a pass with no target results clears the
/// entries left by the previous one.
fn status_patch(status: &IpaStatus) -> serde_json::Value {
    json!({ "status": status })
}

fn replicas_patch(replicas: i32, resource_version: Option<&str>) -> serde_json::Value {
    let mut patch = json!({"spec": {"replicas": replicas}});
    if let Some(version) = resource_version {
        patch["metadata"] = json!({"resourceVersion": version});
    }
    patch
}

#[async_trait]
impl ClusterAccessor for KubeClusterAccessor {
    async fn get_workload(&self, target: &TargetRef) -> Result<WorkloadState, ClusterError> {
        let deployment = self
            .deployments(&target.namespace)
            .get_opt(&target.deployment)
            .await
            .map_err(|e| map_kube_error(e, &target.to_string()))?
            .ok_or_else(|| ClusterError::NotFound(target.to_string()))?;
        Ok(workload_state(deployment))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, ClusterError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&label_selector(selector));
        let pods = api
            .list(&params)
            .await
            .map_err(|e| map_kube_error(e, namespace))?;
        Ok(pods.items.into_iter().filter_map(|p| p.metadata.name).collect())
    }

    async fn list_pod_events(&self, namespace: &str, pod: &str) -> Result<Vec<PodEvent>, ClusterError> {
        let api: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().fields(&format!("involvedObject.name={}", pod));
        let events = api.list(&params).await.map_err(|e| map_kube_error(e, pod))?;
        Ok(events
            .items
            .into_iter()
            .map(|e| PodEvent {
                pod: pod.to_string(),
                event_type: e.type_.unwrap_or_default(),
                reason: e.reason.unwrap_or_default(),
                message: e.message.unwrap_or_default(),
            })
            .collect())
    }

    async fn update_replicas(
        &self,
        target: &TargetRef,
        replicas: i32,
        resource_version: Option<&str>,
    ) -> Result<Option<String>, ClusterError> {
        debug!(target = %target, replicas, "Patching replica count");
        self.patch_deployment(target, Patch::Merge(replicas_patch(replicas, resource_version)))
            .await
    }

    async fn update_resources(
        &self,
        target: &TargetRef,
        containers: &[String],
        resources: &ResourceSettings,
        resource_version: Option<&str>,
    ) -> Result<Option<String>, ClusterError> {
        debug!(target = %target, containers = containers.len(), "Patching container resources");
        self.patch_deployment(
            target,
            Patch::Strategic(resources_patch(containers, resources, resource_version)),
        )
        .await
    }

    async fn list_ipas(&self, namespace: Option<&str>) -> Result<Vec<IpaResource>, ClusterError> {
        let list = self
            .ipas(namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_error(e, IPA_PLURAL))?;

        Ok(list
            .items
            .into_iter()
            .map(|obj| {
                IpaResource::from_json(
                    obj.metadata.name.unwrap_or_default(),
                    obj.metadata.namespace.unwrap_or_default(),
                    obj.data.get("spec"),
                    obj.data.get("status"),
                )
            })
            .collect())
    }

    async fn patch_ipa_status(
        &self,
        namespace: &str,
        name: &str,
        status: &IpaStatus,
    ) -> Result<(), ClusterError> {
        let patch = Patch::Merge(status_patch(status));
        self.ipas(Some(namespace))
            .patch_status(name, &PatchParams::default(), &patch)
            .await
            .map_err(|e| map_kube_error(e, name))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec, ResourceRequirements};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

    fn deployment() -> Deployment {
        let mut requests = BTreeMap::new();
        requests.insert("cpu".to_string(), Quantity("100m".to_string()));
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "web".to_string());

        Deployment {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                resource_version: Some("42".to_string()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(3),
                selector: LabelSelector {
                    match_labels: Some(labels),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: None,
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "app".to_string(),
                            resources: Some(ResourceRequirements {
                                requests: Some(requests),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            status: None,
        }
    }

    #[test]
    fn test_workload_state_from_deployment() {
        let state = workload_state(deployment());
        assert_eq!(state.replicas, 3);
        assert_eq!(state.resource_version.as_deref(), Some("42"));
        assert_eq!(state.selector.get("app").map(String::as_str), Some("web"));
        assert_eq!(state.containers.len(), 1);
        assert_eq!(state.containers[0].cpu_request.as_deref(), Some("100m"));
        assert!(state.containers[0].memory_limit.is_none());
    }

    #[test]
    fn test_patches_carry_resource_version() {
        let patch = replicas_patch(5, Some("7"));
        assert_eq!(patch["spec"]["replicas"], 5);
        assert_eq!(patch["metadata"]["resourceVersion"], "7");
        assert!(replicas_patch(5, None).get("metadata").is_none());

        let settings = ResourceSettings {
            cpu_request: "200m".to_string(),
            cpu_limit: "500m".to_string(),
            memory_request: "256Mi".to_string(),
            memory_limit: "512Mi".to_string(),
        };
        let patch = resources_patch(&["app".to_string(), "sidecar".to_string()], &settings, Some("7"));
        let containers = patch["spec"]["template"]["spec"]["containers"].as_array().unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[1]["name"], "sidecar");
        assert_eq!(containers[0]["resources"]["limits"]["memory"], "512Mi");
    }

    #[test]
    fn test_status_patch_clears_previous_targets() {
        let status = IpaStatus {
            status: "default/ipa: missing required field `llmAgent`".to_string(),
            last_pass_time: Some("2024-06-01T12:00:00Z".to_string()),
            targets: Vec::new(),
        };
        let patch = status_patch(&status);
        assert_eq!(patch["status"]["targets"], json!([]));
        assert_eq!(patch["status"]["lastPassTime"], "2024-06-01T12:00:00Z");
    }
}
