//! `IPA` manifests read from disk

use anyhow::{bail, Context, Result};
use ipa_lib::resource::{IpaResource, IPA_GROUP, IPA_KIND};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    #[serde(default)]
    api_version: Option<String>,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    metadata: ManifestMetadata,
    spec: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ManifestMetadata {
    #[serde(default)]
    name: String,
    #[serde(default)]
    namespace: Option<String>,
}

/// Parse a YAML or JSON manifest into a resource
pub fn parse(content: &str) -> Result<IpaResource> {
    // JSON is valid YAML, so one parser covers both
    let manifest: Manifest = serde_yaml::from_str(content).context("Manifest is not valid YAML or JSON")?;

    if let Some(kind) = manifest.kind.as_deref() {
        if kind != IPA_KIND {
            bail!("Expected kind {}, found {}", IPA_KIND, kind);
        }
    }
    if let Some(api_version) = manifest.api_version.as_deref() {
        if !api_version.starts_with(&format!("{}/", IPA_GROUP)) {
            bail!("Expected apiVersion in group {}, found {}", IPA_GROUP, api_version);
        }
    }

    let name = if manifest.metadata.name.is_empty() {
        "unnamed".to_string()
    } else {
        manifest.metadata.name
    };
    let namespace = manifest.metadata.namespace.unwrap_or_else(|| "default".to_string());

    Ok(IpaResource::from_json(name, namespace, manifest.spec.as_ref(), None))
}

pub fn load(path: &Path) -> Result<IpaResource> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse(&content)
}
