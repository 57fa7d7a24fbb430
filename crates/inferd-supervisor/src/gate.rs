//! Readiness gating
//!
//! Polls a service's readiness endpoint after launch. The gate reports the
//! outcome rather than retrying forever, so restart policy stays with the
//! supervisor.

use inferd_core::ServiceSpec;
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, trace};
use url::Url;

/// Result of waiting for a service to become ready
#[derive(Debug, Clone)]
pub struct ReadyOutcome {
    pub ready: bool,
    /// Last observed failure when not ready: connection refused, non-2xx
    /// status, probe timeout, or cancellation
    pub last_error: Option<String>,
    pub elapsed: Duration,
}

/// Health gate shared across all launches; the underlying HTTP client pools
/// connections per endpoint
#[derive(Clone)]
pub struct HealthGate {
    client: Client,
}

impl HealthGate {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// One readiness probe. Success means any 2xx response.
    pub async fn probe(&self, url: &Url, timeout: Duration) -> std::result::Result<(), String> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| describe_request_error(&e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("HTTP {}", status.as_u16()))
        }
    }

    /// Poll the spec's readiness URL until it answers 2xx or `timeout`
    /// elapses. Returns the last observed error on failure. A shutdown
    /// signal aborts the wait early; the caller decides what to do with the
    /// launched process.
    pub async fn await_ready(
        &self,
        spec: &ServiceSpec,
        timeout: Duration,
        poll_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> ReadyOutcome {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut last_error: Option<String> = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(
                    service = %spec.name,
                    elapsed = ?started.elapsed(),
                    last_error = ?last_error,
                    "readiness gate timed out"
                );
                return ReadyOutcome {
                    ready: false,
                    last_error: last_error
                        .or_else(|| Some("readiness timeout before first probe".to_string())),
                    elapsed: started.elapsed(),
                };
            }

            let probe_timeout = poll_interval.min(remaining);
            match self.probe(&spec.readiness_url, probe_timeout).await {
                Ok(()) => {
                    debug!(
                        service = %spec.name,
                        elapsed = ?started.elapsed(),
                        "service ready"
                    );
                    return ReadyOutcome {
                        ready: true,
                        last_error: None,
                        elapsed: started.elapsed(),
                    };
                }
                Err(e) => {
                    trace!(service = %spec.name, error = %e, "readiness probe failed");
                    last_error = Some(e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return ReadyOutcome {
                            ready: false,
                            last_error: Some("cancelled".to_string()),
                            elapsed: started.elapsed(),
                        };
                    }
                }
            }
        }
    }
}

impl Default for HealthGate {
    fn default() -> Self {
        Self::new()
    }
}

fn describe_request_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "probe timeout".to_string()
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    }
}
