//! When the next pass over a resource runs

use super::PassReport;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequeuePolicy {
    /// Delay after a pass in which any target failed (default: 5 seconds)
    pub after_failure: Duration,
    /// Delay after a pass that wrote to a workload (default: 30 seconds)
    pub after_change: Duration,
    /// Delay after a pass that changed nothing (default: 60 seconds)
    pub when_stable: Duration,
}

impl Default for RequeuePolicy {
    fn default() -> Self {
        Self {
            after_failure: Duration::from_secs(5),
            after_change: Duration::from_secs(30),
            when_stable: Duration::from_secs(60),
        }
    }
}

impl RequeuePolicy {
    pub fn next_delay(&self, report: &PassReport) -> Duration {
        if report.any_failed() {
            self.after_failure
        } else if report.any_changed() {
            self.after_change
        } else {
            self.when_stable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::ApplyReport;
    use crate::error::{DecisionError, TargetError};
    use crate::models::{ScalingDecision, TargetRef};
    use crate::reconcile::{TargetOutcome, TargetResult};

    fn result(outcome: TargetOutcome) -> TargetResult {
        TargetResult {
            target: TargetRef::new("shop", "web"),
            mode: "schedule",
            outcome,
        }
    }

    fn succeeded(changed: bool) -> TargetOutcome {
        TargetOutcome::Succeeded {
            decision: ScalingDecision::replicas_only(2, "rule"),
            report: ApplyReport {
                replicas_written: changed,
                resources_written: false,
            },
        }
    }

    #[test]
    fn test_failure_takes_precedence() {
        let policy = RequeuePolicy::default();
        let failed = TargetOutcome::Failed(TargetError::new(
            TargetRef::new("shop", "api"),
            DecisionError::Malformed("eof".to_string()),
        ));
        let report = PassReport::new("default/ipa", vec![result(succeeded(true)), result(failed)]);
        assert_eq!(policy.next_delay(&report), Duration::from_secs(5));
    }

    #[test]
    fn test_change_then_stable() {
        let policy = RequeuePolicy::default();
        let changed = PassReport::new("default/ipa", vec![result(succeeded(true))]);
        assert_eq!(policy.next_delay(&changed), Duration::from_secs(30));

        let stable = PassReport::new(
            "default/ipa",
            vec![
                result(succeeded(false)),
                result(TargetOutcome::Abstained {
                    reason: "no rule".to_string(),
                }),
            ],
        );
        assert_eq!(policy.next_delay(&stable), Duration::from_secs(60));
    }
}
