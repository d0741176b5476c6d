//! Controller configuration

use anyhow::{Context, Result};
use ipa_lib::reconcile::{LoopConfig, ReconcilerConfig, RequeuePolicy};
use ipa_lib::retry::RetryPolicy;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Controller configuration, read from `IPA_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Node name from the Kubernetes downward API
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Only reconcile resources in this namespace
    #[serde(default)]
    pub watch_namespace: Option<String>,

    #[serde(default = "default_requeue_after_failure")]
    pub requeue_after_failure_secs: u64,

    #[serde(default = "default_requeue_after_change")]
    pub requeue_after_change_secs: u64,

    #[serde(default = "default_requeue_when_stable")]
    pub requeue_when_stable_secs: u64,

    /// Deadline for one target pass
    #[serde(default = "default_pass_timeout")]
    pub pass_timeout_secs: u64,

    /// Timeout of each HTTP request to the monitoring backend or decision service
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_query_max_attempts")]
    pub query_max_attempts: u32,

    #[serde(default = "default_conflict_max_attempts")]
    pub conflict_max_attempts: u32,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_requeue_after_failure() -> u64 {
    5
}

fn default_requeue_after_change() -> u64 {
    30
}

fn default_requeue_when_stable() -> u64 {
    60
}

fn default_pass_timeout() -> u64 {
    120
}

fn default_request_timeout() -> u64 {
    30
}

fn default_query_max_attempts() -> u32 {
    3
}

fn default_conflict_max_attempts() -> u32 {
    3
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_env(None)
    }

    /// Load from an explicit variable map instead of the process environment
    pub fn from_env(vars: Option<HashMap<String, String>>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("IPA")
                    .try_parsing(true)
                    .source(vars),
            )
            .build()
            .context("Failed to read controller configuration")?;

        let mut parsed: ControllerConfig = config
            .try_deserialize()
            .context("Invalid controller configuration")?;
        parsed.watch_namespace = parsed
            .watch_namespace
            .take()
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty());
        Ok(parsed)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            watch_namespace: self.watch_namespace.clone(),
            requeue: RequeuePolicy {
                after_failure: Duration::from_secs(self.requeue_after_failure_secs),
                after_change: Duration::from_secs(self.requeue_after_change_secs),
                when_stable: Duration::from_secs(self.requeue_when_stable_secs),
            },
            ..LoopConfig::default()
        }
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            pass_timeout: Duration::from_secs(self.pass_timeout_secs),
            query_retry: RetryPolicy::default().with_max_attempts(self.query_max_attempts),
            conflict_attempts: self.conflict_max_attempts.max(1),
        }
    }
}
