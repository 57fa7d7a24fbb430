//! Start command: plan, launch, supervise

use crate::commands::load_manifest;
use crate::output::{self, OutputFormat};
use crate::{EXIT_LAUNCH_FAILURE, EXIT_OVERCOMMIT};
use anyhow::{Context, Result};
use inferd_core::{plan, Error as CoreError, PressureLevel};
use inferd_supervisor::{ResourceMonitor, Supervisor, SupervisorError};
use inferd_telemetry::{create_reader, TelemetryBackend};
use std::path::PathBuf;
use tracing::info;

pub async fn run(
    config: Option<PathBuf>,
    backend: TelemetryBackend,
    pid_file: PathBuf,
    format: OutputFormat,
) -> Result<i32> {
    let manifest = load_manifest(config.as_deref())?;

    let budget = match plan(&manifest.services, manifest.safety_margin) {
        Ok(budget) => budget,
        Err(e @ CoreError::Overcommit { .. }) => {
            output::print_error(&e.to_string());
            return Ok(EXIT_OVERCOMMIT);
        }
        Err(e) => return Err(e.into()),
    };

    // Preflight telemetry read; an unreadable GPU is worth knowing about
    // before anything launches, but it does not block the launch.
    let reader = create_reader(backend);
    let total_bytes = match reader.snapshot().await {
        Ok(snapshot) => {
            let level = PressureLevel::classify(snapshot.used_bytes, snapshot.total_bytes);
            info!(
                total = %output::format_bytes(snapshot.total_bytes),
                used = %output::format_bytes(snapshot.used_bytes),
                "gpu memory at launch"
            );
            if level.is_elevated() {
                output::print_warning(&format!(
                    "gpu memory already at {:.1}% before launch",
                    snapshot.utilization_percent()
                ));
            }
            Some(snapshot.total_bytes)
        }
        Err(e) => {
            output::print_warning(&format!("telemetry preflight failed: {}", e));
            None
        }
    };

    if format == OutputFormat::Table {
        println!("{}", output::plan_table(&budget, total_bytes));
    }

    std::fs::write(&pid_file, std::process::id().to_string())
        .with_context(|| format!("failed to write pid file {}", pid_file.display()))?;
    info!("PID file: {}", pid_file.display());

    let sample_interval = manifest.monitor.sample_interval();
    let supervisor = Supervisor::new(manifest, budget.clone()).await;

    if let Err(e) = supervisor.start().await {
        output::print_error(&e.to_string());
        supervisor.stop_all().await;
        let _ = std::fs::remove_file(&pid_file);
        return match e {
            SupervisorError::ReadinessTimeout { .. }
            | SupervisorError::RestartBudgetExhausted { .. }
            | SupervisorError::DependencyNotHealthy { .. }
            | SupervisorError::Launch { .. } => Ok(EXIT_LAUNCH_FAILURE),
            other => Err(other.into()),
        };
    }

    output::print_success("all services healthy");

    let monitor = ResourceMonitor::new(reader, budget, sample_interval);
    let mut pressure_events = monitor.subscribe();

    let watcher = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.watch_processes().await })
    };
    let monitor_task = {
        let shutdown = supervisor.shutdown_signal();
        tokio::spawn(async move { monitor.run(shutdown).await })
    };
    let advisor = tokio::spawn(async move {
        // The monitor already logs every elevated sample; this surfaces the
        // recommendation on the console.
        while let Ok(event) = pressure_events.recv().await {
            if let Some(recommendation) = event.recommendation {
                output::print_warning(&recommendation);
            }
        }
    });

    wait_for_shutdown().await?;
    output::print_info("shutdown signal received, stopping services");

    supervisor.stop_all().await;
    let _ = watcher.await;
    let _ = monitor_task.await;
    advisor.abort();
    let _ = std::fs::remove_file(&pid_file);

    output::print_success("all services stopped");
    Ok(0)
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_overcommitted_manifest_exits_with_budget_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.yaml");
        let mut manifest = inferd_core::Manifest::default_manifest();
        manifest.services[0].memory_fraction = 0.9;
        manifest.services[1].memory_fraction = 0.25;
        manifest.to_file(&path).unwrap();

        let code = run(
            Some(path),
            TelemetryBackend::Mock,
            dir.path().join("inferd.pid"),
            OutputFormat::Table,
        )
        .await
        .unwrap();
        assert_eq!(code, EXIT_OVERCOMMIT);
    }
}
