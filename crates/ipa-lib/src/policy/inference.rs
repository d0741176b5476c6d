//! Decision service client
//!
//! Sends the rendered evidence bundle to the decision service and validates
//! the recommendation it returns. Anything short of a well-formed, sane
//! recommendation is a `DecisionError`, so a bad answer never reaches the
//! apply step.

use crate::error::DecisionError;
use crate::metrics::EvidenceBundle;
use crate::models::{ResourceSettings, ScalingDecision};
use crate::quantity::Quantity;
use crate::transport::{endpoint, HttpTransport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Sub-path of the decision service that answers scaling questions
pub const DECISION_PATH: &str = "askllm";

/// Maximum number of body bytes quoted back in error messages
const ERROR_BODY_LIMIT: usize = 512;

/// Request body sent to the decision service
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRequest<'a> {
    pub metrics: &'a str,
}

/// Response body expected from the decision service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub status: String,
    pub message: String,
    pub text: RecommendedConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendedConfig {
    pub replicas: i32,
    pub cpu_limit: String,
    pub cpu_request: String,
    pub memory_limit: String,
    pub memory_request: String,
}

impl RecommendedConfig {
    fn validate(&self) -> Result<(), DecisionError> {
        if self.replicas < 0 {
            return Err(DecisionError::Invalid(format!(
                "replicas {} is negative",
                self.replicas
            )));
        }

        let parse = |field: &str, value: &str| {
            Quantity::parse(value)
                .map_err(|e| DecisionError::Invalid(format!("{}: {}", field, e)))
        };
        let cpu_request = parse("cpu_request", &self.cpu_request)?;
        let cpu_limit = parse("cpu_limit", &self.cpu_limit)?;
        let memory_request = parse("memory_request", &self.memory_request)?;
        let memory_limit = parse("memory_limit", &self.memory_limit)?;

        if cpu_request > cpu_limit {
            return Err(DecisionError::Invalid(format!(
                "cpu_request {} exceeds cpu_limit {}",
                self.cpu_request, self.cpu_limit
            )));
        }
        if memory_request > memory_limit {
            return Err(DecisionError::Invalid(format!(
                "memory_request {} exceeds memory_limit {}",
                self.memory_request, self.memory_limit
            )));
        }
        Ok(())
    }
}

impl DecisionResponse {
    /// Parse and validate a raw response body
    pub fn parse(body: &str) -> Result<Self, DecisionError> {
        let response: DecisionResponse =
            serde_json::from_str(body).map_err(|e| DecisionError::Malformed(e.to_string()))?;
        response.text.validate()?;
        Ok(response)
    }

    pub fn into_decision(self) -> ScalingDecision {
        ScalingDecision {
            replicas: self.text.replicas,
            resources: Some(ResourceSettings {
                cpu_request: self.text.cpu_request.trim().to_string(),
                cpu_limit: self.text.cpu_limit.trim().to_string(),
                memory_request: self.text.memory_request.trim().to_string(),
                memory_limit: self.text.memory_limit.trim().to_string(),
            }),
            status: self.status,
            message: self.message,
        }
    }
}

/// Asks the external decision service for a recommendation
#[derive(Clone)]
pub struct ExternalInferencePolicy {
    transport: Arc<dyn HttpTransport>,
}

impl ExternalInferencePolicy {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// POST the evidence to `<decision_uri>/askllm` and validate the answer
    pub async fn decide(
        &self,
        decision_uri: &str,
        evidence: &EvidenceBundle,
    ) -> Result<ScalingDecision, DecisionError> {
        let url = endpoint(decision_uri, DECISION_PATH)
            .map_err(|e| DecisionError::Transport(e.to_string()))?;
        let rendered = evidence.render();
        let body = serde_json::to_value(DecisionRequest { metrics: &rendered })
            .map_err(|e| DecisionError::Transport(e.to_string()))?;

        let response = self
            .transport
            .post_json(url.as_str(), &body)
            .await
            .map_err(|e| DecisionError::Transport(e.to_string()))?;

        if !response.is_ok() {
            return Err(DecisionError::Status {
                status: response.status,
                body: truncate(&response.body, ERROR_BODY_LIMIT),
            });
        }

        let decision = DecisionResponse::parse(&response.body)?.into_decision();
        debug!(
            replicas = decision.replicas,
            status = %decision.status,
            "Decision service answered"
        );
        Ok(decision)
    }
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
