//! Offline manifest validation

use anyhow::{bail, Result};
use colored::Colorize;
use ipa_lib::models::{AutoscaleTarget, TargetMode};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::manifest;
use crate::output::{format_window, print_json, print_rows, print_success, OutputFormat};

#[derive(Tabled)]
struct TargetRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Deployment")]
    deployment: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Details")]
    details: String,
}

#[derive(Serialize)]
struct ValidationReport {
    resource: String,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    targets: Vec<TargetSummary>,
}

#[derive(Serialize)]
struct TargetSummary {
    namespace: String,
    deployment: String,
    mode: &'static str,
    details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn details(target: &AutoscaleTarget) -> String {
    match &target.mode {
        TargetMode::Inference { ingress: Some(ingress) } => format!("ingress {}", ingress),
        TargetMode::Inference { ingress: None } => "no ingress".to_string(),
        TargetMode::Schedule { rules, require_match } => {
            let windows = rules
                .iter()
                .map(|r| format!("{} -> {}", format_window(r.from_hour, r.to_hour), r.replicas))
                .collect::<Vec<_>>()
                .join(", ");
            if *require_match {
                format!("{} (match required)", windows)
            } else {
                windows
            }
        }
    }
}

/// Validate a manifest file and list the targets it declares
///
/// Every group entry is listed; rejected entries carry their error and make
/// the command fail.
pub fn validate_manifest(path: &Path, format: OutputFormat) -> Result<()> {
    let resource = manifest::load(path)?;

    let config = match resource.validate() {
        Ok(config) => config,
        Err(e) => {
            if let OutputFormat::Json = format {
                print_json(&ValidationReport {
                    resource: resource.key(),
                    valid: false,
                    error: Some(e.to_string()),
                    targets: Vec::new(),
                })?;
            }
            bail!("{} is invalid: {}", resource.key(), e);
        }
    };

    let accepted = config.targets.iter().map(|t| TargetSummary {
        namespace: t.target.namespace.clone(),
        deployment: t.target.deployment.clone(),
        mode: t.mode.name(),
        details: details(t),
        error: None,
    });
    let rejected = config.rejected.iter().map(|r| TargetSummary {
        namespace: r.target.namespace.clone(),
        deployment: r.target.deployment.clone(),
        mode: r.mode,
        details: String::new(),
        error: Some(r.error.to_string()),
    });
    let summaries: Vec<TargetSummary> = accepted.chain(rejected).collect();
    let first_error = config.rejected.first().map(|r| r.error.to_string());

    if let (OutputFormat::Table, None) = (format, &first_error) {
        print_success(&format!("{} is valid", resource.key().cyan()));
    }

    let rows = summaries
        .iter()
        .map(|s| TargetRow {
            namespace: s.namespace.clone(),
            deployment: s.deployment.clone(),
            mode: s.mode.to_string(),
            details: match &s.error {
                Some(e) => e.red().to_string(),
                None => s.details.clone(),
            },
        })
        .collect();

    print_rows(
        rows,
        &ValidationReport {
            resource: resource.key(),
            valid: config.is_clean(),
            error: first_error.clone(),
            targets: summaries,
        },
        format,
        "No targets declared",
    )?;

    match first_error {
        Some(e) => bail!(
            "{} is invalid: {} of {} target(s) rejected, first: {}",
            resource.key(),
            config.rejected.len(),
            config.rejected.len() + config.targets.len(),
            e
        ),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipa_lib::models::{ScheduleRule, TargetRef};

    #[test]
    fn test_schedule_details() {
        let target = AutoscaleTarget {
            target: TargetRef::new("batch", "worker"),
            mode: TargetMode::Schedule {
                rules: vec![ScheduleRule::new(22, 6, 1), ScheduleRule::new(7, 21, 4)],
                require_match: true,
            },
        };
        assert_eq!(
            details(&target),
            "22:00-06:59 -> 1, 07:00-21:59 -> 4 (match required)"
        );
    }

    #[test]
    fn test_inference_details() {
        let target = AutoscaleTarget {
            target: TargetRef::new("shop", "web"),
            mode: TargetMode::Inference { ingress: None },
        };
        assert_eq!(details(&target), "no ingress");
    }
}
