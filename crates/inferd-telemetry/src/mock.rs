//! Mock telemetry reader for tests and GPU-less development

use crate::reader::{TelemetryBackend, TelemetryReader};
use crate::snapshot::{GpuMemorySnapshot, GpuProcessUsage};
use crate::Result;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

const GIB: u64 = 1024 * 1024 * 1024;

/// Mock reader with a fixed capacity and an adjustable used amount
pub struct MockTelemetryReader {
    total_bytes: u64,
    used_bytes: Arc<RwLock<u64>>,
    processes: Arc<RwLock<Vec<GpuProcessUsage>>>,
}

impl MockTelemetryReader {
    /// A 32 GiB card at 25% utilization
    pub fn new() -> Self {
        Self {
            total_bytes: 32 * GIB,
            used_bytes: Arc::new(RwLock::new(8 * GIB)),
            processes: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_total_bytes(mut self, total: u64) -> Self {
        self.total_bytes = total;
        self
    }

    /// Set the used amount as a fraction of capacity
    pub fn with_used_fraction(self, fraction: f64) -> Self {
        let used = (self.total_bytes as f64 * fraction) as u64;
        Self {
            used_bytes: Arc::new(RwLock::new(used)),
            ..self
        }
    }

    /// Adjust the used amount while the reader is shared
    pub async fn set_used_fraction(&self, fraction: f64) {
        let used = (self.total_bytes as f64 * fraction) as u64;
        *self.used_bytes.write().await = used;
    }

    /// Replace the per-process attribution
    pub async fn set_processes(&self, processes: Vec<GpuProcessUsage>) {
        *self.processes.write().await = processes;
    }
}

impl Default for MockTelemetryReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryReader for MockTelemetryReader {
    async fn snapshot(&self) -> Result<GpuMemorySnapshot> {
        let used = *self.used_bytes.read().await;
        let processes = self.processes.read().await.clone();
        Ok(GpuMemorySnapshot::new(self.total_bytes, used, processes))
    }

    fn backend(&self) -> TelemetryBackend {
        TelemetryBackend::Mock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_snapshot() {
        let reader = MockTelemetryReader::new();
        let snapshot = reader.snapshot().await.unwrap();

        assert_eq!(snapshot.total_bytes, 32 * GIB);
        assert_eq!(snapshot.used_bytes, 8 * GIB);
        assert!((snapshot.utilization_percent() - 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_set_used_fraction() {
        let reader = MockTelemetryReader::new();
        reader.set_used_fraction(0.92).await;

        let snapshot = reader.snapshot().await.unwrap();
        assert!((snapshot.utilization_percent() - 92.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_snapshots_are_independent() {
        let reader = MockTelemetryReader::new();
        let first = reader.snapshot().await.unwrap();

        reader.set_used_fraction(0.9).await;
        let second = reader.snapshot().await.unwrap();

        // The earlier snapshot is immutable; only the new read moved
        assert_eq!(first.used_bytes, 8 * GIB);
        assert!(second.used_bytes > first.used_bytes);
    }

    #[tokio::test]
    async fn test_process_attribution() {
        let reader = MockTelemetryReader::new();
        reader
            .set_processes(vec![GpuProcessUsage {
                pid: 7,
                used_bytes: GIB,
            }])
            .await;

        let snapshot = reader.snapshot().await.unwrap();
        assert_eq!(snapshot.usage_of_pid(7), Some(GIB));
    }
}
