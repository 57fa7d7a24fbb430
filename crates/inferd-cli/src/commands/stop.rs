//! Stop command: signal a running orchestrator via its PID file

use crate::output;
use anyhow::{Context, Result};
use std::path::PathBuf;

pub async fn run(pid_file: PathBuf) -> Result<i32> {
    if !pid_file.exists() {
        output::print_info(&format!(
            "PID file not found: {} (orchestrator not running?)",
            pid_file.display()
        ));
        return Ok(0);
    }

    let pid_str = std::fs::read_to_string(&pid_file)
        .with_context(|| format!("failed to read pid file {}", pid_file.display()))?;
    let pid: u32 = pid_str
        .trim()
        .parse()
        .with_context(|| format!("invalid PID in {}", pid_file.display()))?;

    println!("Stopping orchestrator with PID: {}", pid);

    #[cfg(unix)]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let target = Pid::from_raw(pid as i32);
        match signal::kill(target, Signal::SIGTERM) {
            Ok(()) => {
                // The orchestrator tears its services down on SIGTERM; give
                // it a moment before escalating.
                tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

                match signal::kill(target, None) {
                    Ok(()) => {
                        output::print_warning(&format!(
                            "process {} still running, sending SIGKILL",
                            pid
                        ));
                        let _ = signal::kill(target, Signal::SIGKILL);
                    }
                    Err(_) => {
                        output::print_success(&format!("process {} stopped", pid));
                    }
                }
            }
            Err(e) => {
                output::print_error(&format!("failed to signal process {}: {}", pid, e));
            }
        }
    }

    #[cfg(not(unix))]
    output::print_warning("process termination is not supported on this platform");

    let _ = std::fs::remove_file(&pid_file);
    Ok(0)
}
