//! Autoscaling decision and reconciliation engine
//!
//! This crate provides:
//! - Evidence acquisition from a Prometheus-compatible backend
//! - Scaling decisions from an external decision service or time-of-day rules
//! - Minimal, version-conditioned convergence of workload state
//! - Reconciliation passes, requeueing and status reporting
//! - Health checks and observability

pub mod api;
pub mod apply;
pub mod clock;
pub mod cluster;
pub mod error;
pub mod health;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod policy;
pub mod quantity;
pub mod reconcile;
pub mod resource;
pub mod retry;
pub mod transport;

pub use error::{AcquisitionError, ApplyError, ConfigError, DecisionError, ReconcileError, TargetError};
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse};
pub use models::*;
pub use observability::{ControllerMetrics, StructuredLogger};
