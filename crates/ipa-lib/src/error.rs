//! Error taxonomy for reconciliation passes
//!
//! Every failure a pass can hit falls into one of four classes. Errors are
//! wrapped with the target they belong to before they reach the pass handler,
//! and their display text is what ends up in the resource status.

use crate::models::TargetRef;
use std::time::Duration;
use thiserror::Error;

/// Evidence or live state could not be gathered
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("monitoring query `{query}` failed: {reason}")]
    Query { query: String, reason: String },

    #[error("every monitoring query failed (first: `{query}`: {reason})")]
    AllQueriesFailed { query: String, reason: String },

    #[error("cluster call `{call}` failed: {reason}")]
    Cluster { call: &'static str, reason: String },

    #[error("pass deadline of {0:?} exceeded")]
    Timeout(Duration),
}

/// No valid decision could be produced
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("decision service request failed: {0}")]
    Transport(String),

    #[error("decision service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed decision response: {0}")]
    Malformed(String),

    #[error("invalid decision: {0}")]
    Invalid(String),

    #[error("no schedule rule is active at hour {hour}")]
    NoMatchingRule { hour: u32 },
}

/// A corrective write was rejected
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("failed to update {what}: {reason}")]
    Write { what: &'static str, reason: String },

    #[error("{what} update kept conflicting after {attempts} attempts")]
    ConflictExhausted { what: &'static str, attempts: u32 },
}

/// The configuration resource does not describe a usable target
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("deployment {0} not found")]
    WorkloadNotFound(TargetRef),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("schedule rule #{index} for {target} is invalid: {reason}")]
    InvalidRule {
        target: TargetRef,
        index: usize,
        reason: String,
    },

    #[error("schedule rules #{first} and #{second} for {target} overlap at hour {hour} with equal priority")]
    OverlappingRules {
        target: TargetRef,
        first: usize,
        second: usize,
        hour: u32,
    },

    #[error("{0} is declared in more than one group")]
    DuplicateTarget(TargetRef),

    #[error("unreadable resource spec: {0}")]
    Malformed(String),
}

/// Any failure of a single target pass
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Decision(#[from] DecisionError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ReconcileError {
    /// Short class name used for metrics labels and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileError::Acquisition(_) => "acquisition",
            ReconcileError::Decision(_) => "decision",
            ReconcileError::Apply(_) => "apply",
            ReconcileError::Config(_) => "config",
        }
    }
}

/// A pass failure tagged with the target it belongs to
#[derive(Debug, Error)]
#[error("{target}: {source}")]
pub struct TargetError {
    pub target: TargetRef,
    pub source: ReconcileError,
}

impl TargetError {
    pub fn new(target: TargetRef, source: impl Into<ReconcileError>) -> Self {
        Self {
            target,
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_error_display_names_target_and_call() {
        let err = TargetError::new(
            TargetRef::new("shop", "web"),
            DecisionError::Status {
                status: 503,
                body: "overloaded".to_string(),
            },
        );

        assert_eq!(
            err.to_string(),
            "shop/web: decision service returned HTTP 503: overloaded"
        );
        assert_eq!(err.source.kind(), "decision");
    }

    #[test]
    fn test_error_kinds() {
        let acquisition: ReconcileError = AcquisitionError::Timeout(Duration::from_secs(1)).into();
        let apply: ReconcileError = ApplyError::ConflictExhausted {
            what: "replicas",
            attempts: 3,
        }
        .into();
        let config: ReconcileError =
            ConfigError::WorkloadNotFound(TargetRef::new("a", "b")).into();

        assert_eq!(acquisition.kind(), "acquisition");
        assert_eq!(apply.kind(), "apply");
        assert_eq!(config.kind(), "config");
        assert_eq!(config.to_string(), "deployment a/b not found");
    }
}
