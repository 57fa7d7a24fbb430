//! GPU memory pressure monitoring
//!
//! Samples the telemetry reader on a fixed interval, classifies pressure,
//! and broadcasts advisory events. The monitor never kills or resizes a
//! service; it only recommends what an operator could do.

use inferd_core::{BudgetPlan, PressureLevel};
use inferd_telemetry::{GpuMemorySnapshot, TelemetryReader};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

/// Capacity of the pressure event channel; slow subscribers lose the
/// oldest events rather than stalling the sampling loop
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// One advisory observation of GPU memory pressure
#[derive(Debug, Clone)]
pub struct PressureEvent {
    pub level: PressureLevel,
    pub snapshot: GpuMemorySnapshot,
    /// Suggested operator action, present when pressure is elevated
    pub recommendation: Option<String>,
}

/// Periodic GPU memory sampler producing [`PressureEvent`]s
pub struct ResourceMonitor {
    reader: Arc<dyn TelemetryReader>,
    plan: BudgetPlan,
    interval: Duration,
    events: broadcast::Sender<PressureEvent>,
}

impl ResourceMonitor {
    pub fn new(reader: Arc<dyn TelemetryReader>, plan: BudgetPlan, interval: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            reader,
            plan,
            interval,
            events,
        }
    }

    /// Subscribe to pressure events; every sample produces one event
    pub fn subscribe(&self) -> broadcast::Receiver<PressureEvent> {
        self.events.subscribe()
    }

    /// Take one sample and classify it
    pub async fn sample(&self) -> inferd_telemetry::Result<PressureEvent> {
        let snapshot = self.reader.snapshot().await?;
        Ok(self.classify(snapshot))
    }

    fn classify(&self, snapshot: GpuMemorySnapshot) -> PressureEvent {
        let level = PressureLevel::classify(snapshot.used_bytes, snapshot.total_bytes);
        let recommendation = if level.is_elevated() {
            self.plan.largest().map(|(name, fraction)| {
                format!(
                    "memory pressure at {:.1}%: consider lowering the fraction of '{}' (currently {:.2})",
                    snapshot.utilization_percent(),
                    name,
                    fraction
                )
            })
        } else {
            None
        };

        PressureEvent {
            level,
            snapshot,
            recommendation,
        }
    }

    /// Sampling loop; runs until the shutdown signal fires. A telemetry
    /// failure is logged and the next tick tries again.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            backend = %self.reader.backend(),
            interval = ?self.interval,
            "resource monitor started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("resource monitor shutting down");
                        return;
                    }
                }
            }

            match self.sample().await {
                Ok(event) => {
                    let utilization = event.snapshot.utilization_percent();
                    match event.level {
                        PressureLevel::Healthy => {
                            debug!(utilization, "gpu memory sample");
                        }
                        PressureLevel::Warning => {
                            warn!(
                                utilization,
                                recommendation = ?event.recommendation,
                                "gpu memory pressure warning"
                            );
                        }
                        PressureLevel::Critical => {
                            error!(
                                utilization,
                                recommendation = ?event.recommendation,
                                "gpu memory pressure critical"
                            );
                        }
                    }
                    // Nobody listening is fine; events are advisory
                    let _ = self.events.send(event);
                }
                Err(e) => {
                    warn!(error = %e, retryable = e.is_retryable(), "telemetry sample failed");
                }
            }
        }
    }
}
