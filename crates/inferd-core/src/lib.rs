//! # inferd-core
//!
//! Core data model for the inferd GPU memory orchestrator.
//!
//! This crate provides:
//! - The service manifest: declarative specs for co-resident inference services
//! - The budget planner: validates that declared GPU memory fractions fit the budget
//! - The runtime state table: lock-guarded per-service lifecycle state
//! - Memory pressure classification
//!
//! GPU memory is a shared, non-partitionable resource with no OS-level quota
//! enforcement, so the budget computed here is a cooperative contract among the
//! services inferd launches. Overcommitted budgets are rejected outright rather
//! than clamped; shrinking an operator-declared fraction silently would trade a
//! visible configuration error for unpredictable OOM behavior at runtime.
//!
//! ## Example
//!
//! ```rust
//! use inferd_core::{Manifest, plan};
//!
//! let manifest = Manifest::default_manifest();
//! manifest.validate().unwrap();
//!
//! let budget = plan(&manifest.services, manifest.safety_margin).unwrap();
//! assert!(budget.headroom() >= 0.0);
//! ```

pub mod error;
pub mod manifest;
pub mod plan;
pub mod pressure;
pub mod state;

pub use error::{Error, Result};
pub use manifest::{Manifest, MonitorConfig, RestartConfig, ServiceSpec, TimeoutConfig};
pub use plan::{plan, BudgetPlan};
pub use pressure::PressureLevel;
pub use state::{HealthObservation, ServiceRuntimeState, ServiceState, StateTable};
