//! Decision policies
//!
//! A target is governed by exactly one policy, picked by its
//! [`TargetMode`](crate::models::TargetMode):
//! - `ExternalInferencePolicy` asks the decision service, given evidence
//! - `ScheduleRulePolicy` evaluates fixed hour-of-day windows
//!
//! Neither keeps state between calls.

pub mod inference;
pub mod schedule;

pub use inference::{
    DecisionRequest, DecisionResponse, ExternalInferencePolicy, RecommendedConfig, DECISION_PATH,
};
pub use schedule::{active, rule_active, ScheduleRulePolicy};
