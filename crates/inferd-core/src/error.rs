//! Error handling for inferd core types
//!
//! Provides the unified error type for manifest validation, budget planning,
//! and runtime state transitions.

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the core data model
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or inconsistent service manifest
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Declared memory fractions plus the safety margin exceed the GPU budget.
    /// Carries the offending total and the headroom the margin allows so the
    /// operator can see exactly how far over budget the manifest is.
    #[error(
        "Budget overcommit: declared fractions sum to {declared:.3} but only {headroom:.3} \
         is available after the safety margin"
    )]
    Overcommit { declared: f64, headroom: f64 },

    /// A memory fraction outside the accepted (0, 1] range
    #[error("Invalid memory fraction {fraction} for service {service}: must be in (0, 1]")]
    InvalidFraction { service: String, fraction: f64 },

    /// Reference to a service name the manifest does not declare
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// A lifecycle transition the state machine does not permit
    #[error("Invalid state transition for {service}: {from} -> {to}")]
    InvalidTransition {
        service: String,
        from: crate::state::ServiceState,
        to: crate::state::ServiceState,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest (de)serialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Check if this error is a configuration problem that must be fixed by
    /// the operator before any service may be launched
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::Manifest(_)
                | Error::Overcommit { .. }
                | Error::InvalidFraction { .. }
                | Error::UnknownService(_)
                | Error::Yaml(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = Error::Overcommit {
            declared: 1.05,
            headroom: 0.95,
        };
        let message = error.to_string();
        assert!(message.contains("1.050"));
        assert!(message.contains("0.950"));

        let error = Error::UnknownService("vllm".to_string());
        assert_eq!(error.to_string(), "Unknown service: vllm");
    }

    #[test]
    fn test_configuration_error_classification() {
        assert!(Error::Manifest("bad".to_string()).is_configuration_error());
        assert!(Error::Overcommit {
            declared: 1.1,
            headroom: 0.9
        }
        .is_configuration_error());
        assert!(Error::UnknownService("x".to_string()).is_configuration_error());

        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "x"));
        assert!(!io.is_configuration_error());
    }
}
