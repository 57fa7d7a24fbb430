//! # inferd-telemetry
//!
//! GPU memory telemetry for the inferd orchestrator.
//!
//! This crate provides:
//! - The [`TelemetryReader`] contract: a point-in-time GPU memory snapshot
//!   with per-process attribution
//! - An `nvidia-smi` backend that shells out to the driver tool and parses
//!   its CSV output
//! - A mock backend with an adjustable used fraction for tests and
//!   development runs on hosts without a GPU
//!
//! The core orchestration logic never sees a specific tool's output format;
//! it depends only on [`GpuMemorySnapshot`].

use thiserror::Error;

pub mod mock;
pub mod nvidia_smi;
pub mod reader;
pub mod snapshot;

pub use mock::MockTelemetryReader;
pub use nvidia_smi::NvidiaSmiReader;
pub use reader::{create_reader, TelemetryBackend, TelemetryReader};
pub use snapshot::{GpuMemorySnapshot, GpuProcessUsage};

/// Result type for telemetry operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors that can occur while reading GPU telemetry
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Telemetry backend not supported: {0}")]
    UnsupportedBackend(String),

    #[error("Telemetry source unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to run telemetry command: {0}")]
    Command(String),

    #[error("Failed to parse telemetry output: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TelemetryError {
    /// Check if this error is retryable; a transient read failure should not
    /// bring down a monitoring loop
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TelemetryError::Unavailable(_) | TelemetryError::Command(_) | TelemetryError::Io(_)
        )
    }
}
