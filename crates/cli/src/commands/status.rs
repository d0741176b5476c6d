//! Live status of IPA resources in the cluster

use anyhow::{Context, Result};
use ipa_lib::cluster::{ClusterAccessor, KubeClusterAccessor};
use ipa_lib::resource::IpaStatus;
use serde::Serialize;
use tabled::Tabled;

use crate::config;
use crate::output::{color_status, print_rows, OutputFormat};

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Targets")]
    targets: usize,
    #[tabled(rename = "Last Pass")]
    last_pass: String,
    #[tabled(rename = "Status")]
    status: String,
}

#[derive(Serialize)]
struct ResourceStatus {
    namespace: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<IpaStatus>,
}

/// List IPA resources and their last reported pass
pub async fn show_status(
    kubeconfig: Option<&str>,
    namespace: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let client = config::kube_client(kubeconfig).await?;
    let cluster = KubeClusterAccessor::new(client);
    let mut resources = cluster
        .list_ipas(namespace)
        .await
        .context("Failed to list IPA resources")?;
    resources.sort_by_key(|r| r.key());

    let rows = resources
        .iter()
        .map(|r| {
            let status = r.status.clone().unwrap_or_default();
            StatusRow {
                namespace: r.namespace.clone(),
                name: r.name.clone(),
                targets: r.spec.metadata.ipa_group.len() + r.spec.metadata.schedule_group.len(),
                last_pass: status.last_pass_time.unwrap_or_else(|| "-".to_string()),
                status: color_status(&status.status),
            }
        })
        .collect();

    let value: Vec<ResourceStatus> = resources
        .into_iter()
        .map(|r| ResourceStatus {
            namespace: r.namespace,
            name: r.name,
            status: r.status,
        })
        .collect();

    print_rows(rows, &value, format, "No IPA resources found")
}
