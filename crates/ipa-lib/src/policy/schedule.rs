//! Time-of-day scaling rules

use crate::error::DecisionError;
use crate::models::{Decision, ScalingDecision, ScheduleRule};
use tracing::warn;

/// Whether `rule` covers `hour`. Windows with `from > to` wrap past midnight.
pub fn rule_active(rule: &ScheduleRule, hour: u32) -> bool {
    active(rule.from_hour, rule.to_hour, hour)
}

/// Inclusive hour window check
pub fn active(from: u32, to: u32, hour: u32) -> bool {
    if from <= to {
        from <= hour && hour <= to
    } else {
        hour >= from || hour <= to
    }
}

/// Picks a replica count from an ordered rule list for the current hour
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleRulePolicy;

impl ScheduleRulePolicy {
    /// Highest priority active rule wins; among equals the last one listed wins.
    pub fn decide(
        &self,
        rules: &[ScheduleRule],
        hour: u32,
        require_match: bool,
    ) -> Result<Decision, DecisionError> {
        let matching: Vec<(usize, &ScheduleRule)> = rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule_active(rule, hour))
            .collect();

        if matching.len() > 1 {
            warn!(
                hour,
                rules = ?matching.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
                "Multiple schedule rules match the same hour"
            );
        }

        // max_by_key returns the last maximum, which gives last-match-wins on ties
        let chosen = matching
            .into_iter()
            .max_by_key(|(_, rule)| rule.effective_priority());

        match chosen {
            Some((index, rule)) => Ok(Decision::Scale(ScalingDecision::replicas_only(
                rule.replicas,
                format!(
                    "schedule rule #{} ({:02}-{:02}) active at hour {:02}",
                    index, rule.from_hour, rule.to_hour, hour
                ),
            ))),
            None if require_match => Err(DecisionError::NoMatchingRule { hour }),
            None => Ok(Decision::Abstain {
                reason: format!("no schedule rule active at hour {:02}", hour),
            }),
        }
    }
}
