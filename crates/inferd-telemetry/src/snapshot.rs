//! Point-in-time GPU memory snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// GPU memory attributed to one process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuProcessUsage {
    pub pid: u32,
    pub used_bytes: u64,
}

/// Total/used/free GPU memory at one instant, with per-process attribution.
/// Produced fresh on every read and never mutated; the timestamp lets
/// consumers present stale data as stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuMemorySnapshot {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub taken_at: DateTime<Utc>,
    pub processes: Vec<GpuProcessUsage>,
}

impl GpuMemorySnapshot {
    /// Build a snapshot timestamped now; free memory is derived
    pub fn new(total_bytes: u64, used_bytes: u64, processes: Vec<GpuProcessUsage>) -> Self {
        Self {
            total_bytes,
            used_bytes,
            free_bytes: total_bytes.saturating_sub(used_bytes),
            taken_at: Utc::now(),
            processes,
        }
    }

    /// Used memory as a percentage of capacity (0.0 to 100.0)
    pub fn utilization_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        self.used_bytes as f64 / self.total_bytes as f64 * 100.0
    }

    /// How old this snapshot is
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.taken_at
    }

    /// Memory attributed to a specific process, if the source reported it
    pub fn usage_of_pid(&self, pid: u32) -> Option<u64> {
        self.processes
            .iter()
            .find(|p| p.pid == pid)
            .map(|p| p.used_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_is_derived() {
        let snapshot = GpuMemorySnapshot::new(1000, 400, Vec::new());
        assert_eq!(snapshot.free_bytes, 600);
    }

    #[test]
    fn test_free_saturates() {
        // used > total can happen with inconsistent driver readings
        let snapshot = GpuMemorySnapshot::new(1000, 1200, Vec::new());
        assert_eq!(snapshot.free_bytes, 0);
    }

    #[test]
    fn test_utilization_percent() {
        let snapshot = GpuMemorySnapshot::new(1000, 920, Vec::new());
        assert!((snapshot.utilization_percent() - 92.0).abs() < 1e-9);

        let empty = GpuMemorySnapshot::new(0, 0, Vec::new());
        assert_eq!(empty.utilization_percent(), 100.0);
    }

    #[test]
    fn test_process_attribution() {
        let snapshot = GpuMemorySnapshot::new(
            1000,
            500,
            vec![
                GpuProcessUsage {
                    pid: 42,
                    used_bytes: 300,
                },
                GpuProcessUsage {
                    pid: 43,
                    used_bytes: 200,
                },
            ],
        );

        assert_eq!(snapshot.usage_of_pid(42), Some(300));
        assert_eq!(snapshot.usage_of_pid(99), None);
    }

    #[test]
    fn test_age_is_nonnegative() {
        let snapshot = GpuMemorySnapshot::new(1000, 100, Vec::new());
        assert!(snapshot.age() >= chrono::Duration::zero());
    }
}
