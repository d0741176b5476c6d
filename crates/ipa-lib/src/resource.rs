//! The `IPA` configuration resource
//!
//! Mirrors the custom resource's `spec`/`status` JSON shape and turns a spec
//! into a validated list of [`AutoscaleTarget`]s. Validation runs every time a
//! resource is loaded. Endpoint errors fail the whole resource; a bad group
//! entry fails only the target it names.

use crate::error::ConfigError;
use crate::models::{AutoscaleTarget, ScheduleRule, TargetMode, TargetRef};
use crate::policy::schedule::rule_active;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// API group of the configuration resource
pub const IPA_GROUP: &str = "ipa.shafinhasnat.me";
/// API version of the configuration resource
pub const IPA_VERSION: &str = "v1alpha1";
/// Kind of the configuration resource
pub const IPA_KIND: &str = "IPA";
/// Plural resource name
pub const IPA_PLURAL: &str = "ipas";

/// Status text written when every target succeeded
pub const STATUS_SUCCESS: &str = "Success";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IpaSpec {
    pub metadata: IpaMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpaMetadata {
    /// Base URI of the Prometheus-compatible monitoring backend
    #[serde(default)]
    pub prometheus_uri: String,
    /// Base URI of the decision service
    #[serde(default)]
    pub llm_agent: String,
    /// Targets governed by the decision service
    #[serde(default)]
    pub ipa_group: Vec<IpaGroup>,
    /// Targets governed by time-of-day rules
    #[serde(default)]
    pub schedule_group: Vec<ScheduleGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpaGroup {
    pub deployment: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleGroup {
    pub namespace: String,
    pub deployment: String,
    /// Fail the pass when no rule is active instead of leaving the workload alone
    #[serde(default)]
    pub require_match: bool,
    pub rules: Vec<ScheduleRule>,
}

/// Observed state written back by the controller
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpaStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_pass_time: Option<String>,
    /// Always serialized so merge patches replace stale entries
    #[serde(default)]
    pub targets: Vec<TargetStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetStatus {
    pub namespace: String,
    pub deployment: String,
    pub outcome: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// A configuration resource as listed from the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpaResource {
    pub name: String,
    pub namespace: String,
    pub spec: IpaSpec,
    pub status: Option<IpaStatus>,
    /// Set when the stored spec could not be decoded
    pub parse_error: Option<String>,
}

impl IpaResource {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, spec: IpaSpec) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            spec,
            status: None,
            parse_error: None,
        }
    }

    /// Decode a resource from its raw `spec` and `status` JSON
    pub fn from_json(
        name: impl Into<String>,
        namespace: impl Into<String>,
        spec: Option<&serde_json::Value>,
        status: Option<&serde_json::Value>,
    ) -> Self {
        let mut resource = Self::new(name, namespace, IpaSpec::default());
        match spec.map(|v| serde_json::from_value::<IpaSpec>(v.clone())) {
            Some(Ok(spec)) => resource.spec = spec,
            Some(Err(e)) => resource.parse_error = Some(e.to_string()),
            None => resource.parse_error = Some("resource has no spec".to_string()),
        }
        resource.status = status
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        resource
    }

    /// Key used to track per-resource scheduling
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Validate the decoded spec, failing on decode errors first
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        if let Some(reason) = &self.parse_error {
            return Err(ConfigError::Malformed(reason.clone()));
        }
        self.spec.validate()
    }
}

/// A group entry that could not become a target
#[derive(Debug)]
pub struct RejectedTarget {
    pub target: TargetRef,
    /// Mode of the group the entry was declared in
    pub mode: &'static str,
    pub error: ConfigError,
}

/// Endpoints and targets extracted from a spec
///
/// Group entries with their own configuration errors land in `rejected`;
/// the rest of the resource stays usable.
#[derive(Debug)]
pub struct ValidatedConfig {
    pub prometheus_uri: Option<String>,
    pub decision_uri: Option<String>,
    pub targets: Vec<AutoscaleTarget>,
    pub rejected: Vec<RejectedTarget>,
}

impl ValidatedConfig {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

impl IpaSpec {
    /// Check the spec and produce the targets it declares
    ///
    /// Only endpoint problems fail the whole resource. A workload declared
    /// more than once is rejected at every occurrence, so no mode governs it.
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        let meta = &self.metadata;

        let needs_endpoints = !meta.ipa_group.is_empty();
        let prometheus_uri = endpoint_field(&meta.prometheus_uri, "prometheusUri", needs_endpoints)?;
        let decision_uri = endpoint_field(&meta.llm_agent, "llmAgent", needs_endpoints)?;

        let declared: Vec<(&str, &str)> = meta
            .ipa_group
            .iter()
            .map(|g| (g.namespace.as_str(), g.deployment.as_str()))
            .chain(
                meta.schedule_group
                    .iter()
                    .map(|g| (g.namespace.as_str(), g.deployment.as_str())),
            )
            .collect();
        let mut occurrences: HashMap<TargetRef, usize> = HashMap::new();
        for (namespace, deployment) in &declared {
            if let Ok(target) = target_ref(namespace, deployment) {
                *occurrences.entry(target).or_default() += 1;
            }
        }
        let unique = |namespace: &str, deployment: &str| -> Result<TargetRef, ConfigError> {
            let target = target_ref(namespace, deployment)?;
            if occurrences.get(&target).copied().unwrap_or(0) > 1 {
                return Err(ConfigError::DuplicateTarget(target));
            }
            Ok(target)
        };

        let mut config = ValidatedConfig {
            prometheus_uri,
            decision_uri,
            targets: Vec::with_capacity(declared.len()),
            rejected: Vec::new(),
        };

        for group in &meta.ipa_group {
            match unique(&group.namespace, &group.deployment) {
                Ok(target) => {
                    let ingress = group
                        .ingress
                        .as_deref()
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string);
                    config.targets.push(AutoscaleTarget {
                        target,
                        mode: TargetMode::Inference { ingress },
                    });
                }
                Err(error) => config.rejected.push(RejectedTarget {
                    target: TargetRef::new(group.namespace.trim(), group.deployment.trim()),
                    mode: "inference",
                    error,
                }),
            }
        }

        for group in &meta.schedule_group {
            let checked = unique(&group.namespace, &group.deployment)
                .and_then(|target| validate_rules(&target, &group.rules).map(|()| target));
            match checked {
                Ok(target) => config.targets.push(AutoscaleTarget {
                    target,
                    mode: TargetMode::Schedule {
                        rules: group.rules.clone(),
                        require_match: group.require_match,
                    },
                }),
                Err(error) => config.rejected.push(RejectedTarget {
                    target: TargetRef::new(group.namespace.trim(), group.deployment.trim()),
                    mode: "schedule",
                    error,
                }),
            }
        }

        Ok(config)
    }
}

fn target_ref(namespace: &str, deployment: &str) -> Result<TargetRef, ConfigError> {
    if namespace.trim().is_empty() {
        return Err(ConfigError::MissingField("namespace"));
    }
    if deployment.trim().is_empty() {
        return Err(ConfigError::MissingField("deployment"));
    }
    Ok(TargetRef::new(namespace.trim(), deployment.trim()))
}

fn endpoint_field(
    value: &str,
    field: &'static str,
    required: bool,
) -> Result<Option<String>, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return if required {
            Err(ConfigError::MissingField(field))
        } else {
            Ok(None)
        };
    }
    url::Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        field,
        reason: e.to_string(),
    })?;
    Ok(Some(value.to_string()))
}

/// Reject out-of-range rules and same-priority rules sharing an hour
pub fn validate_rules(target: &TargetRef, rules: &[ScheduleRule]) -> Result<(), ConfigError> {
    for (index, rule) in rules.iter().enumerate() {
        let reason = if rule.from_hour > 23 {
            Some(format!("from hour {} is outside 0-23", rule.from_hour))
        } else if rule.to_hour > 23 {
            Some(format!("to hour {} is outside 0-23", rule.to_hour))
        } else if rule.replicas < 0 {
            Some(format!("replicas {} is negative", rule.replicas))
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(ConfigError::InvalidRule {
                target: target.clone(),
                index,
                reason,
            });
        }
    }

    for (first, a) in rules.iter().enumerate() {
        for (offset, b) in rules[first + 1..].iter().enumerate() {
            if a.effective_priority() != b.effective_priority() {
                continue;
            }
            if let Some(hour) = (0..24).find(|&h| rule_active(a, h) && rule_active(b, h)) {
                return Err(ConfigError::OverlappingRules {
                    target: target.clone(),
                    first,
                    second: first + 1 + offset,
                    hour,
                });
            }
        }
    }

    Ok(())
}
