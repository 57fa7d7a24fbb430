//! # inferd-supervisor
//!
//! Supervised launch and runtime monitoring for co-resident GPU inference
//! services.
//!
//! This crate provides:
//! - [`Supervisor`]: health-gated, dependency-ordered launch; idempotent
//!   stop; bounded automatic restart with exponential backoff
//! - [`HealthGate`]: readiness polling against each service's HTTP endpoint
//! - [`ResourceMonitor`]: a sampling loop that classifies GPU memory
//!   pressure and emits advisory events
//!
//! The supervisor owns process lifecycles and the shared state table; the
//! monitor only observes. Remediation of memory pressure stays an operator
//! decision.

use thiserror::Error;

pub mod gate;
pub mod monitor;
pub mod process;
pub mod supervisor;

pub use gate::{HealthGate, ReadyOutcome};
pub use monitor::{PressureEvent, ResourceMonitor};
pub use process::ManagedProcess;
pub use supervisor::Supervisor;

/// Result type for supervision operations
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Errors that can occur during supervision
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The service process could not be created (missing executable,
    /// permission problem, port already bound at spawn)
    #[error("Launch failed for {service}: {reason}")]
    Launch { service: String, reason: String },

    /// The service launched but its readiness endpoint never answered
    /// within the configured timeout
    #[error("Readiness timeout for {service}: {reason}")]
    ReadinessTimeout { service: String, reason: String },

    /// Automatic restarts were attempted and exhausted; the service stays
    /// Failed until an operator intervenes
    #[error("Restart budget exhausted for {service} after {attempts} attempts")]
    RestartBudgetExhausted { service: String, attempts: u32 },

    /// A dependency of this service did not reach Healthy
    #[error("Dependency {dependency} of {service} is not healthy; launch aborted")]
    DependencyNotHealthy { service: String, dependency: String },

    /// Start was cancelled; already-launched services are left running
    #[error("Start cancelled")]
    Cancelled,

    /// Process signalling or wait errors
    #[error("Process error for {service}: {reason}")]
    Process { service: String, reason: String },

    #[error(transparent)]
    Core(#[from] inferd_core::Error),

    #[error(transparent)]
    Telemetry(#[from] inferd_telemetry::TelemetryError),
}

impl SupervisorError {
    /// Errors caused by a single service that must not abort its siblings
    pub fn is_service_local(&self) -> bool {
        matches!(
            self,
            SupervisorError::Launch { .. }
                | SupervisorError::ReadinessTimeout { .. }
                | SupervisorError::RestartBudgetExhausted { .. }
                | SupervisorError::DependencyNotHealthy { .. }
                | SupervisorError::Process { .. }
        )
    }

    /// The service this error is attributed to, when there is one
    pub fn service(&self) -> Option<&str> {
        match self {
            SupervisorError::Launch { service, .. }
            | SupervisorError::ReadinessTimeout { service, .. }
            | SupervisorError::RestartBudgetExhausted { service, .. }
            | SupervisorError::DependencyNotHealthy { service, .. }
            | SupervisorError::Process { service, .. } => Some(service),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_attribution() {
        let error = SupervisorError::ReadinessTimeout {
            service: "vllm".to_string(),
            reason: "HTTP 503".to_string(),
        };
        assert_eq!(error.service(), Some("vllm"));
        assert!(error.is_service_local());

        assert!(SupervisorError::Cancelled.service().is_none());
        assert!(!SupervisorError::Cancelled.is_service_local());
    }

    #[test]
    fn test_error_display() {
        let error = SupervisorError::RestartBudgetExhausted {
            service: "vllm".to_string(),
            attempts: 3,
        };
        assert_eq!(
            error.to_string(),
            "Restart budget exhausted for vllm after 3 attempts"
        );
    }
}
