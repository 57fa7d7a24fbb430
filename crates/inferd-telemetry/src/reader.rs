//! Telemetry reader contract and backend selection

use crate::snapshot::GpuMemorySnapshot;
use crate::{Result, TelemetryError};

use async_trait::async_trait;
use std::sync::Arc;

/// Available telemetry backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryBackend {
    /// Shell out to nvidia-smi
    NvidiaSmi,
    /// Synthetic readings for tests and GPU-less development
    Mock,
}

impl std::fmt::Display for TelemetryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetryBackend::NvidiaSmi => write!(f, "nvidia-smi"),
            TelemetryBackend::Mock => write!(f, "mock"),
        }
    }
}

impl std::str::FromStr for TelemetryBackend {
    type Err = TelemetryError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nvidia-smi" | "nvidia" | "nvidia_smi" => Ok(TelemetryBackend::NvidiaSmi),
            "mock" => Ok(TelemetryBackend::Mock),
            other => Err(TelemetryError::UnsupportedBackend(other.to_string())),
        }
    }
}

/// Contract for reading GPU memory state. Implementations must be cheap to
/// call repeatedly; the monitor polls on every sampling tick.
#[async_trait]
pub trait TelemetryReader: Send + Sync {
    /// Take a fresh snapshot of GPU memory
    async fn snapshot(&self) -> Result<GpuMemorySnapshot>;

    /// Which backend produced this reader
    fn backend(&self) -> TelemetryBackend;
}

/// Create a reader for the requested backend
pub fn create_reader(backend: TelemetryBackend) -> Arc<dyn TelemetryReader> {
    match backend {
        TelemetryBackend::NvidiaSmi => Arc::new(crate::nvidia_smi::NvidiaSmiReader::new()),
        TelemetryBackend::Mock => Arc::new(crate::mock::MockTelemetryReader::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parsing() {
        assert_eq!(
            "nvidia-smi".parse::<TelemetryBackend>().unwrap(),
            TelemetryBackend::NvidiaSmi
        );
        assert_eq!(
            "Mock".parse::<TelemetryBackend>().unwrap(),
            TelemetryBackend::Mock
        );
        assert!("rocm".parse::<TelemetryBackend>().is_err());
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(TelemetryBackend::NvidiaSmi.to_string(), "nvidia-smi");
        assert_eq!(TelemetryBackend::Mock.to_string(), "mock");
    }

    #[tokio::test]
    async fn test_factory_builds_mock() {
        let reader = create_reader(TelemetryBackend::Mock);
        assert_eq!(reader.backend(), TelemetryBackend::Mock);
        assert!(reader.snapshot().await.is_ok());
    }
}
