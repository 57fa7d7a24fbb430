//! Managed service processes
//!
//! Spawning and termination of the long-running engine processes. The
//! resolved GPU memory fraction is injected into the child environment as
//! `INFERD_MEMORY_FRACTION`; the budget is a cooperative contract, and this
//! is how each engine learns its share.

use crate::{Result, SupervisorError};
use inferd_core::ServiceSpec;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Environment variable carrying the service's resolved memory fraction
pub const MEMORY_FRACTION_ENV: &str = "INFERD_MEMORY_FRACTION";

/// One spawned service process
pub struct ManagedProcess {
    name: String,
    fraction: f64,
    child: Option<Child>,
    started_at: Option<Instant>,
}

impl ManagedProcess {
    /// Spawn the service described by `spec` with its planned fraction
    pub fn spawn(spec: &ServiceSpec, fraction: f64) -> Result<Self> {
        info!(
            service = %spec.name,
            command = %spec.command,
            fraction,
            "launching service"
        );

        let mut command = Command::new(&spec.command);
        command.args(&spec.args);

        for (key, value) in &spec.env {
            command.env(key, value);
        }
        command.env(MEMORY_FRACTION_ENV, fraction.to_string());

        if let Some(working_dir) = &spec.working_dir {
            command.current_dir(working_dir);
        }

        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null());

        let mut child = command.spawn().map_err(|e| SupervisorError::Launch {
            service: spec.name.clone(),
            reason: e.to_string(),
        })?;

        debug!(service = %spec.name, pid = child.id(), "process spawned");

        // Drain both pipes continuously. A service that logs more than the
        // kernel pipe buffer would otherwise block on write and hang.
        if let Some(stdout) = child.stdout.take() {
            forward_output(spec.name.clone(), "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(spec.name.clone(), "stderr", stderr);
        }

        Ok(Self {
            name: spec.name.clone(),
            fraction,
            child: Some(child),
            started_at: Some(Instant::now()),
        })
    }

    /// OS process id, while the process is held
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(|c| c.id())
    }

    /// The fraction this process was launched with
    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    /// Time since spawn
    pub fn uptime(&self) -> Option<Duration> {
        self.started_at.map(|start| start.elapsed())
    }

    /// Check liveness without blocking. An exited process is reaped and the
    /// handle cleared.
    pub fn is_running(&mut self) -> bool {
        if let Some(child) = &mut self.child {
            match child.try_wait() {
                Ok(Some(status)) => {
                    warn!(service = %self.name, %status, "process exited");
                    self.child = None;
                    self.started_at = None;
                    false
                }
                Ok(None) => true,
                Err(e) => {
                    error!(service = %self.name, error = %e, "failed to poll process");
                    self.child = None;
                    self.started_at = None;
                    false
                }
            }
        } else {
            false
        }
    }

    /// Terminate the process: SIGTERM, wait up to `grace`, then SIGKILL.
    /// Terminating an already-exited process is a no-op.
    pub async fn terminate(&mut self, grace: Duration) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        self.started_at = None;

        info!(service = %self.name, pid = child.id(), "stopping process");

        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(child.id() as i32);
            if let Err(e) = signal::kill(pid, Signal::SIGTERM) {
                // Process may already be gone between try_wait and here
                debug!(service = %self.name, error = %e, "SIGTERM delivery failed");
            }
        }

        let deadline = Instant::now() + grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    info!(service = %self.name, %status, "process stopped gracefully");
                    return Ok(());
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Err(e) => {
                    return Err(SupervisorError::Process {
                        service: self.name.clone(),
                        reason: format!("wait failed: {}", e),
                    });
                }
            }
        }

        warn!(service = %self.name, "grace period expired, force-killing");
        if let Err(e) = child.kill() {
            debug!(service = %self.name, error = %e, "kill failed, process likely exited");
        }
        child.wait().map_err(|e| SupervisorError::Process {
            service: self.name.clone(),
            reason: format!("wait after kill failed: {}", e),
        })?;

        info!(service = %self.name, "process force-stopped");
        Ok(())
    }
}

/// Forward one child pipe to the log, line by line, until EOF. Runs on a
/// dedicated thread because the handles from `std::process` block on read.
fn forward_output<R: Read + Send + 'static>(service: String, stream: &'static str, pipe: R) {
    std::thread::spawn(move || {
        let reader = BufReader::new(pipe);
        for line in reader.lines() {
            match line {
                Ok(line) => debug!(service = %service, stream, "{}", line),
                Err(e) => {
                    debug!(service = %service, stream, error = %e, "output stream closed");
                    break;
                }
            }
        }
    });
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!(service = %self.name, "process handle dropped while running, killing");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
