//! Per-service lifecycle state and the shared runtime state table
//!
//! The table is the only shared mutable structure in the orchestrator. The
//! supervisor owns writes; the monitor and control surface read cloned
//! snapshots. A single table-wide lock is sufficient: entries are small and
//! updates are infrequent (state transitions and health observations).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{Error, Result};

/// Lifecycle state of one managed service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    /// Declared but not yet scheduled to launch
    Pending,
    /// Process spawned, waiting for the readiness gate
    Starting,
    /// Readiness endpoint answering
    Healthy,
    /// Process alive but a later health probe failed
    Degraded,
    /// Process exited unexpectedly or readiness gating timed out
    Failed,
    /// Terminated by the supervisor
    Stopped,
}

impl ServiceState {
    /// Whether the state machine permits moving to `next`.
    /// Stopping is always permitted and stopping twice is a no-op, so
    /// `Stopped -> Stopped` is allowed.
    pub fn can_transition_to(&self, next: ServiceState) -> bool {
        use ServiceState::*;
        match (self, next) {
            (_, Stopped) => true,
            (Pending, Starting) => true,
            (Starting, Healthy) | (Starting, Failed) => true,
            (Healthy, Degraded) | (Healthy, Failed) => true,
            (Degraded, Healthy) | (Degraded, Failed) => true,
            // Automatic or operator restart
            (Failed, Starting) | (Stopped, Starting) => true,
            _ => false,
        }
    }

    /// Whether the service is expected to have a live process
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            ServiceState::Starting | ServiceState::Healthy | ServiceState::Degraded
        )
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Pending => write!(f, "pending"),
            ServiceState::Starting => write!(f, "starting"),
            ServiceState::Healthy => write!(f, "healthy"),
            ServiceState::Degraded => write!(f, "degraded"),
            ServiceState::Failed => write!(f, "failed"),
            ServiceState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Outcome of one readiness probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthObservation {
    pub healthy: bool,
    /// Error detail when unhealthy (connection refused, HTTP status, timeout)
    pub detail: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl HealthObservation {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            detail: None,
            observed_at: Utc::now(),
        }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            detail: Some(detail.into()),
            observed_at: Utc::now(),
        }
    }
}

/// Runtime state for one service, one entry per [`crate::ServiceSpec`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRuntimeState {
    pub state: ServiceState,
    pub last_health: Option<HealthObservation>,
    pub restart_count: u32,
    pub last_started_at: Option<DateTime<Utc>>,
}

impl ServiceRuntimeState {
    fn new() -> Self {
        Self {
            state: ServiceState::Pending,
            last_health: None,
            restart_count: 0,
            last_started_at: None,
        }
    }
}

/// Shared, lock-guarded table of per-service runtime state
#[derive(Debug, Clone, Default)]
pub struct StateTable {
    inner: Arc<RwLock<HashMap<String, ServiceRuntimeState>>>,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service in Pending state. Re-registering resets the entry.
    pub async fn register(&self, name: &str) {
        let mut table = self.inner.write().await;
        table.insert(name.to_string(), ServiceRuntimeState::new());
    }

    /// Apply a lifecycle transition, enforcing the state machine
    pub async fn transition(&self, name: &str, to: ServiceState) -> Result<()> {
        let mut table = self.inner.write().await;
        let entry = table
            .get_mut(name)
            .ok_or_else(|| Error::UnknownService(name.to_string()))?;

        if entry.state == to && to == ServiceState::Stopped {
            // Stop is idempotent
            return Ok(());
        }

        if !entry.state.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                service: name.to_string(),
                from: entry.state,
                to,
            });
        }

        debug!(service = name, from = %entry.state, to = %to, "state transition");
        if to == ServiceState::Starting {
            entry.last_started_at = Some(Utc::now());
        }
        entry.state = to;
        Ok(())
    }

    /// Record the outcome of a health probe
    pub async fn record_health(&self, name: &str, observation: HealthObservation) -> Result<()> {
        let mut table = self.inner.write().await;
        let entry = table
            .get_mut(name)
            .ok_or_else(|| Error::UnknownService(name.to_string()))?;
        entry.last_health = Some(observation);
        Ok(())
    }

    /// Bump the restart counter, returning the new count
    pub async fn increment_restarts(&self, name: &str) -> Result<u32> {
        let mut table = self.inner.write().await;
        let entry = table
            .get_mut(name)
            .ok_or_else(|| Error::UnknownService(name.to_string()))?;
        entry.restart_count += 1;
        Ok(entry.restart_count)
    }

    /// Current state of one service
    pub async fn get(&self, name: &str) -> Option<ServiceRuntimeState> {
        self.inner.read().await.get(name).cloned()
    }

    /// Read-only snapshot of the whole table
    pub async fn snapshot(&self) -> HashMap<String, ServiceRuntimeState> {
        self.inner.read().await.clone()
    }

    /// Convenience check used by launch sequencing
    pub async fn is_in_state(&self, name: &str, state: ServiceState) -> bool {
        self.inner
            .read()
            .await
            .get(name)
            .map(|e| e.state == state)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_starts_pending() {
        let table = StateTable::new();
        table.register("a").await;

        let entry = table.get("a").await.unwrap();
        assert_eq!(entry.state, ServiceState::Pending);
        assert_eq!(entry.restart_count, 0);
        assert!(entry.last_started_at.is_none());
    }

    #[tokio::test]
    async fn test_happy_path_transitions() {
        let table = StateTable::new();
        table.register("a").await;

        table.transition("a", ServiceState::Starting).await.unwrap();
        assert!(table.get("a").await.unwrap().last_started_at.is_some());

        table.transition("a", ServiceState::Healthy).await.unwrap();
        table.transition("a", ServiceState::Degraded).await.unwrap();
        table.transition("a", ServiceState::Healthy).await.unwrap();
        table.transition("a", ServiceState::Stopped).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_transition_rejected() {
        let table = StateTable::new();
        table.register("a").await;

        // Pending cannot jump straight to Healthy
        let err = table
            .transition("a", ServiceState::Healthy)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let table = StateTable::new();
        table.register("a").await;

        table.transition("a", ServiceState::Stopped).await.unwrap();
        // Second stop is a no-op, not an error
        table.transition("a", ServiceState::Stopped).await.unwrap();
        assert_eq!(table.get("a").await.unwrap().state, ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_restart_path_from_failed() {
        let table = StateTable::new();
        table.register("a").await;

        table.transition("a", ServiceState::Starting).await.unwrap();
        table.transition("a", ServiceState::Failed).await.unwrap();
        table.transition("a", ServiceState::Starting).await.unwrap();
        table.transition("a", ServiceState::Healthy).await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_counter() {
        let table = StateTable::new();
        table.register("a").await;

        assert_eq!(table.increment_restarts("a").await.unwrap(), 1);
        assert_eq!(table.increment_restarts("a").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let table = StateTable::new();
        let err = table
            .transition("ghost", ServiceState::Starting)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownService(_)));
    }

    #[tokio::test]
    async fn test_health_observation() {
        let table = StateTable::new();
        table.register("a").await;

        table
            .record_health("a", HealthObservation::unhealthy("HTTP 503"))
            .await
            .unwrap();

        let entry = table.get("a").await.unwrap();
        let health = entry.last_health.unwrap();
        assert!(!health.healthy);
        assert_eq!(health.detail.as_deref(), Some("HTTP 503"));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ServiceState::Healthy.to_string(), "healthy");
        assert_eq!(ServiceState::Degraded.to_string(), "degraded");
    }

    #[test]
    fn test_is_running() {
        assert!(ServiceState::Starting.is_running());
        assert!(ServiceState::Healthy.is_running());
        assert!(ServiceState::Degraded.is_running());
        assert!(!ServiceState::Pending.is_running());
        assert!(!ServiceState::Failed.is_running());
        assert!(!ServiceState::Stopped.is_running());
    }
}
