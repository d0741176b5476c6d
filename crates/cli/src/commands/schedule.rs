//! Dry-run of schedule rules for a given hour

use anyhow::Result;
use chrono::{Timelike, Utc};
use ipa_lib::models::{Decision, TargetMode};
use ipa_lib::policy::ScheduleRulePolicy;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::manifest;
use crate::output::{color_status, print_rows, OutputFormat};

#[derive(Tabled)]
struct ScheduleRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Deployment")]
    deployment: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Replicas")]
    replicas: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

#[derive(Serialize)]
struct ScheduleOutcome {
    namespace: String,
    deployment: String,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    replicas: Option<i32>,
    reason: String,
}

/// Show what each schedule target would be scaled to at `hour`
pub fn show_schedule(path: &Path, hour: Option<u32>, format: OutputFormat) -> Result<()> {
    let hour = hour.unwrap_or_else(|| Utc::now().hour());
    if hour > 23 {
        anyhow::bail!("Hour {} is outside 0-23", hour);
    }

    let resource = manifest::load(path)?;
    let config = resource.validate()?;
    let policy = ScheduleRulePolicy;

    let outcomes: Vec<ScheduleOutcome> = config
        .targets
        .iter()
        .filter_map(|target| match &target.mode {
            TargetMode::Schedule { rules, require_match } => Some((target, rules, *require_match)),
            TargetMode::Inference { .. } => None,
        })
        .map(|(target, rules, require_match)| {
            let (outcome, replicas, reason) = match policy.decide(rules, hour, require_match) {
                Ok(Decision::Scale(decision)) => ("Succeeded", Some(decision.replicas), decision.message),
                Ok(Decision::Abstain { reason }) => ("Abstained", None, reason),
                Err(e) => ("Failed", None, e.to_string()),
            };
            ScheduleOutcome {
                namespace: target.target.namespace.clone(),
                deployment: target.target.deployment.clone(),
                outcome,
                replicas,
                reason,
            }
        })
        .chain(
            config
                .rejected
                .iter()
                .filter(|r| r.mode == "schedule")
                .map(|r| ScheduleOutcome {
                    namespace: r.target.namespace.clone(),
                    deployment: r.target.deployment.clone(),
                    outcome: "Failed",
                    replicas: None,
                    reason: r.error.to_string(),
                }),
        )
        .collect();

    let rows = outcomes
        .iter()
        .map(|o| ScheduleRow {
            namespace: o.namespace.clone(),
            deployment: o.deployment.clone(),
            outcome: color_status(o.outcome),
            replicas: o.replicas.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string()),
            reason: o.reason.clone(),
        })
        .collect();

    print_rows(rows, &outcomes, format, "No schedule targets declared")
}
