//! nvidia-smi telemetry backend
//!
//! Queries the driver tool in machine-readable CSV mode:
//!
//! ```text
//! nvidia-smi --query-gpu=memory.total,memory.used,memory.free --format=csv,noheader,nounits
//! nvidia-smi --query-compute-apps=pid,used_memory --format=csv,noheader,nounits
//! ```
//!
//! Values come back in MiB. Parsing is kept separate from process invocation
//! so the format handling is testable without a GPU.

use crate::reader::{TelemetryBackend, TelemetryReader};
use crate::snapshot::{GpuMemorySnapshot, GpuProcessUsage};
use crate::{Result, TelemetryError};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

const MIB: u64 = 1024 * 1024;

/// Telemetry reader backed by the nvidia-smi tool
pub struct NvidiaSmiReader {
    binary: String,
    gpu_index: u32,
}

impl NvidiaSmiReader {
    pub fn new() -> Self {
        Self {
            binary: "nvidia-smi".to_string(),
            gpu_index: 0,
        }
    }

    /// Use a specific GPU index on multi-GPU hosts
    pub fn with_gpu_index(mut self, index: u32) -> Self {
        self.gpu_index = index;
        self
    }

    /// Override the binary path (useful for wrappers)
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn run_query(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.binary)
            .args(args)
            .arg("--format=csv,noheader,nounits")
            .arg(format!("--id={}", self.gpu_index))
            .output()
            .await
            .map_err(|e| TelemetryError::Command(format!("{}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TelemetryError::Unavailable(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for NvidiaSmiReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryReader for NvidiaSmiReader {
    async fn snapshot(&self) -> Result<GpuMemorySnapshot> {
        let memory_csv = self
            .run_query(&["--query-gpu=memory.total,memory.used,memory.free"])
            .await?;
        let (total, used, _free) = parse_memory_line(&memory_csv)?;

        let process_csv = self
            .run_query(&["--query-compute-apps=pid,used_memory"])
            .await?;
        let processes = parse_process_lines(&process_csv);

        debug!(
            total_bytes = total,
            used_bytes = used,
            processes = processes.len(),
            "gpu memory snapshot"
        );

        Ok(GpuMemorySnapshot::new(total, used, processes))
    }

    fn backend(&self) -> TelemetryBackend {
        TelemetryBackend::NvidiaSmi
    }
}

/// Parse the `memory.total,memory.used,memory.free` line (MiB values)
fn parse_memory_line(output: &str) -> Result<(u64, u64, u64)> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| TelemetryError::Parse("empty memory query output".to_string()))?;

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 3 {
        return Err(TelemetryError::Parse(format!(
            "expected 3 memory fields, got {}: {:?}",
            fields.len(),
            line
        )));
    }

    let parse = |field: &str| -> Result<u64> {
        field
            .parse::<u64>()
            .map_err(|_| TelemetryError::Parse(format!("non-numeric memory value: {:?}", field)))
    };

    Ok((
        parse(fields[0])? * MIB,
        parse(fields[1])? * MIB,
        parse(fields[2])? * MIB,
    ))
}

/// Parse `pid,used_memory` lines. Malformed lines are skipped with a warning
/// rather than failing the whole snapshot; attribution is best-effort and
/// some driver modes report `[N/A]` for used memory.
fn parse_process_lines(output: &str) -> Vec<GpuProcessUsage> {
    let mut processes = Vec::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 2 {
            warn!(line, "skipping malformed process attribution line");
            continue;
        }

        let pid = match fields[0].parse::<u32>() {
            Ok(pid) => pid,
            Err(_) => {
                warn!(line, "skipping process line with non-numeric pid");
                continue;
            }
        };

        let used_bytes = match fields[1].parse::<u64>() {
            Ok(mib) => mib * MIB,
            Err(_) => {
                warn!(line, "skipping process line with unreadable memory value");
                continue;
            }
        };

        processes.push(GpuProcessUsage { pid, used_bytes });
    }

    processes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_line() {
        let (total, used, free) = parse_memory_line("32768, 12288, 20480\n").unwrap();
        assert_eq!(total, 32768 * MIB);
        assert_eq!(used, 12288 * MIB);
        assert_eq!(free, 20480 * MIB);
    }

    #[test]
    fn test_parse_memory_line_rejects_empty() {
        assert!(matches!(
            parse_memory_line("\n\n"),
            Err(TelemetryError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_memory_line_rejects_wrong_field_count() {
        assert!(matches!(
            parse_memory_line("32768, 12288"),
            Err(TelemetryError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_memory_line_rejects_non_numeric() {
        assert!(matches!(
            parse_memory_line("[N/A], 12288, 20480"),
            Err(TelemetryError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_process_lines() {
        let output = "1234, 8192\n5678, 2048\n";
        let processes = parse_process_lines(output);
        assert_eq!(processes.len(), 2);
        assert_eq!(processes[0].pid, 1234);
        assert_eq!(processes[0].used_bytes, 8192 * MIB);
    }

    #[test]
    fn test_parse_process_lines_skips_malformed() {
        let output = "1234, 8192\n[N/A], [N/A]\n5678, [Insufficient Permissions]\n";
        let processes = parse_process_lines(output);
        assert_eq!(processes.len(), 1);
        assert_eq!(processes[0].pid, 1234);
    }

    #[test]
    fn test_parse_process_lines_empty_output() {
        // No compute processes running is the common idle case
        assert!(parse_process_lines("").is_empty());
        assert!(parse_process_lines("\n").is_empty());
    }

    #[test]
    fn test_builder() {
        let reader = NvidiaSmiReader::new()
            .with_gpu_index(1)
            .with_binary("/usr/local/bin/nvidia-smi");
        assert_eq!(reader.gpu_index, 1);
        assert_eq!(reader.binary, "/usr/local/bin/nvidia-smi");
        assert_eq!(reader.backend(), TelemetryBackend::NvidiaSmi);
    }
}
