//! The process supervisor
//!
//! Owns service lifecycles for one orchestration run: rank-ordered launch
//! with readiness gating, idempotent stop, bounded restart with exponential
//! backoff, and a background loop that notices unexpected exits and probe
//! failures. All lifecycle state lives in the shared [`StateTable`].

use crate::gate::HealthGate;
use crate::process::ManagedProcess;
use crate::{Result, SupervisorError};
use inferd_core::{
    BudgetPlan, HealthObservation, Manifest, ServiceSpec, ServiceState, StateTable,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

/// Supervises the services declared in one manifest under one budget plan.
/// Cheap to clone; clones share the same state table, process map, and
/// shutdown signal.
#[derive(Clone)]
pub struct Supervisor {
    manifest: Arc<Manifest>,
    plan: BudgetPlan,
    table: StateTable,
    gate: HealthGate,
    processes: Arc<Mutex<HashMap<String, ManagedProcess>>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Supervisor {
    /// Create a supervisor; every declared service starts out Pending
    pub async fn new(manifest: Manifest, plan: BudgetPlan) -> Self {
        let table = StateTable::new();
        for spec in &manifest.services {
            table.register(&spec.name).await;
        }

        let (shutdown_tx, _) = watch::channel(false);

        Self {
            manifest: Arc::new(manifest),
            plan,
            table,
            gate: HealthGate::new(),
            processes: Arc::new(Mutex::new(HashMap::new())),
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Shared view of per-service runtime state
    pub fn state_table(&self) -> StateTable {
        self.table.clone()
    }

    /// The plan this run was launched under
    pub fn plan(&self) -> &BudgetPlan {
        &self.plan
    }

    /// Subscribe to the shutdown signal
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    fn cancelled(&self) -> bool {
        *self.shutdown_tx.subscribe().borrow()
    }

    /// Launch all services in ascending start-order rank. Services sharing a
    /// rank launch concurrently; a failed service never aborts its siblings,
    /// only its dependents. Returns the first service-local failure after
    /// every launchable service has been attempted.
    pub async fn start(&self) -> Result<()> {
        let mut ranks: BTreeMap<u32, Vec<ServiceSpec>> = BTreeMap::new();
        for spec in &self.manifest.services {
            ranks.entry(spec.start_order).or_default().push(spec.clone());
        }

        let mut first_failure: Option<SupervisorError> = None;

        for (rank, group) in ranks {
            if self.cancelled() {
                info!("start cancelled; leaving already-launched services running");
                return Err(first_failure.unwrap_or(SupervisorError::Cancelled));
            }

            debug!(rank, services = group.len(), "launching rank group");

            let mut handles = Vec::new();
            for spec in group {
                let supervisor = self.clone();
                handles.push(tokio::spawn(async move {
                    supervisor.launch_service(&spec).await
                }));
            }

            for handle in handles {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) if e.is_service_local() => {
                        error!(service = ?e.service(), error = %e, "service failed to start");
                        first_failure.get_or_insert(e);
                    }
                    Ok(Err(e)) => return Err(e),
                    Err(join_error) => {
                        return Err(SupervisorError::Process {
                            service: "launch task".to_string(),
                            reason: join_error.to_string(),
                        })
                    }
                }
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Launch one service: dependency check, spawn, readiness gate, bounded
    /// restart on gate failure. Used for initial launch, operator restart,
    /// and crash recovery alike.
    pub async fn launch_service(&self, spec: &ServiceSpec) -> Result<()> {
        if let Some(dep) = &spec.depends_on {
            if !self.table.is_in_state(dep, ServiceState::Healthy).await {
                warn!(
                    service = %spec.name,
                    dependency = %dep,
                    "dependency not healthy, launch aborted"
                );
                return Err(SupervisorError::DependencyNotHealthy {
                    service: spec.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        let fraction =
            self.plan
                .fraction_of(&spec.name)
                .ok_or_else(|| SupervisorError::Launch {
                    service: spec.name.clone(),
                    reason: "service missing from budget plan".to_string(),
                })?;

        let max_restarts = self.manifest.restart.max_restarts;
        let mut last_error: Option<String> = None;

        for attempt in 0..=max_restarts {
            if attempt > 0 {
                let backoff = self.manifest.restart.backoff_for_attempt(attempt - 1);
                let count = self.table.increment_restarts(&spec.name).await?;
                info!(
                    service = %spec.name,
                    attempt = count,
                    backoff = ?backoff,
                    "restarting after failure"
                );
                tokio::time::sleep(backoff).await;
            }

            if self.cancelled() {
                return Err(SupervisorError::Cancelled);
            }

            self.table
                .transition(&spec.name, ServiceState::Starting)
                .await?;

            // Spawn failures are configuration-class problems (missing
            // binary, bad working dir); retrying cannot fix them.
            let process = match ManagedProcess::spawn(spec, fraction) {
                Ok(process) => process,
                Err(e) => {
                    self.table
                        .transition(&spec.name, ServiceState::Failed)
                        .await?;
                    self.table
                        .record_health(
                            &spec.name,
                            HealthObservation::unhealthy(e.to_string()),
                        )
                        .await?;
                    return Err(e);
                }
            };

            self.processes
                .lock()
                .await
                .insert(spec.name.clone(), process);

            let outcome = self
                .gate
                .await_ready(
                    spec,
                    self.manifest.timeouts.readiness_timeout(),
                    self.manifest.timeouts.poll_interval(),
                    self.shutdown_signal(),
                )
                .await;

            if outcome.ready {
                self.table
                    .record_health(&spec.name, HealthObservation::healthy())
                    .await?;
                self.table
                    .transition(&spec.name, ServiceState::Healthy)
                    .await?;
                info!(service = %spec.name, elapsed = ?outcome.elapsed, "service healthy");
                return Ok(());
            }

            if self.cancelled() {
                // Cancelled mid-gate: the process stays up, rollback is the
                // operator's call.
                return Err(SupervisorError::Cancelled);
            }

            let reason = outcome
                .last_error
                .unwrap_or_else(|| "readiness probe never succeeded".to_string());
            warn!(service = %spec.name, reason = %reason, "readiness gate failed");

            self.table
                .record_health(&spec.name, HealthObservation::unhealthy(reason.clone()))
                .await?;
            self.table
                .transition(&spec.name, ServiceState::Failed)
                .await?;

            if let Some(mut process) = self.processes.lock().await.remove(&spec.name) {
                process
                    .terminate(self.manifest.timeouts.stop_grace())
                    .await?;
            }

            last_error = Some(reason);
        }

        let reason = last_error.unwrap_or_else(|| "unknown".to_string());
        if max_restarts == 0 {
            Err(SupervisorError::ReadinessTimeout {
                service: spec.name.clone(),
                reason,
            })
        } else {
            Err(SupervisorError::RestartBudgetExhausted {
                service: spec.name.clone(),
                attempts: max_restarts,
            })
        }
    }

    /// Stop one service: graceful signal, bounded grace period, then force
    /// kill. Always ends in Stopped; stopping a stopped service is a no-op.
    pub async fn stop(&self, name: &str) -> Result<()> {
        if self.manifest.service(name).is_none() {
            return Err(inferd_core::Error::UnknownService(name.to_string()).into());
        }

        let process = self.processes.lock().await.remove(name);
        if let Some(mut process) = process {
            process
                .terminate(self.manifest.timeouts.stop_grace())
                .await?;
        }

        self.table.transition(name, ServiceState::Stopped).await?;
        Ok(())
    }

    /// Restart one service, preserving its fraction from the original plan
    pub async fn restart(&self, name: &str) -> Result<()> {
        let spec = self
            .manifest
            .service(name)
            .ok_or_else(|| inferd_core::Error::UnknownService(name.to_string()))?
            .clone();

        info!(service = %name, "restarting service");
        self.stop(name).await?;
        self.launch_service(&spec).await
    }

    /// Stop everything in reverse start order and signal all waiters
    pub async fn stop_all(&self) {
        info!("stopping all services");
        let _ = self.shutdown_tx.send(true);

        let mut ordered = self.manifest.services_by_rank();
        ordered.reverse();
        for spec in ordered {
            let name = spec.name.clone();
            if let Err(e) = self.stop(&name).await {
                warn!(service = %name, error = %e, "error while stopping");
            }
        }
    }

    /// Background loop: notices unexpected exits (restart policy applies)
    /// and re-probes readiness of running services so Healthy/Degraded
    /// track reality. Runs until the shutdown signal fires.
    pub async fn watch_processes(&self) {
        let mut shutdown = self.shutdown_signal();
        let interval = self.manifest.timeouts.poll_interval();
        let probe_timeout = interval.min(Duration::from_secs(5));

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("process watcher shutting down");
                        return;
                    }
                }
            }

            self.reap_exited().await;
            self.reprobe_running(probe_timeout).await;
        }
    }

    /// Detect services whose process died underneath a running state and
    /// hand them to the restart path
    async fn reap_exited(&self) {
        let exited: Vec<String> = {
            let mut processes = self.processes.lock().await;
            let mut exited = Vec::new();
            for (name, process) in processes.iter_mut() {
                if !process.is_running() {
                    exited.push(name.clone());
                }
            }
            for name in &exited {
                processes.remove(name);
            }
            exited
        };

        for name in exited {
            let Some(entry) = self.table.get(&name).await else {
                continue;
            };
            if !entry.state.is_running() {
                continue;
            }

            warn!(service = %name, "unexpected process exit");
            let _ = self
                .table
                .record_health(&name, HealthObservation::unhealthy("process exited"))
                .await;
            let _ = self.table.transition(&name, ServiceState::Failed).await;

            if let Some(spec) = self.manifest.service(&name) {
                let supervisor = self.clone();
                let spec = spec.clone();
                tokio::spawn(async move {
                    if let Err(e) = supervisor.launch_service(&spec).await {
                        error!(service = %spec.name, error = %e, "crash recovery failed");
                    }
                });
            }
        }
    }

    /// Probe Healthy/Degraded services; a probe failure without process
    /// exit moves Healthy to Degraded, a success moves Degraded back
    async fn reprobe_running(&self, probe_timeout: Duration) {
        for spec in &self.manifest.services {
            let Some(entry) = self.table.get(&spec.name).await else {
                continue;
            };
            if !matches!(
                entry.state,
                ServiceState::Healthy | ServiceState::Degraded
            ) {
                continue;
            }

            match self.gate.probe(&spec.readiness_url, probe_timeout).await {
                Ok(()) => {
                    let _ = self
                        .table
                        .record_health(&spec.name, HealthObservation::healthy())
                        .await;
                    if entry.state == ServiceState::Degraded {
                        info!(service = %spec.name, "service recovered");
                        let _ = self
                            .table
                            .transition(&spec.name, ServiceState::Healthy)
                            .await;
                    }
                }
                Err(e) => {
                    let _ = self
                        .table
                        .record_health(&spec.name, HealthObservation::unhealthy(e.clone()))
                        .await;
                    if entry.state == ServiceState::Healthy {
                        warn!(service = %spec.name, error = %e, "health probe failed, degraded");
                        let _ = self
                            .table
                            .transition(&spec.name, ServiceState::Degraded)
                            .await;
                    }
                }
            }
        }
    }
}
