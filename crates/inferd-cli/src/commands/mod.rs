//! Command implementations for the inferd CLI

pub mod config;
pub mod start;
pub mod status;
pub mod stop;

use anyhow::{Context, Result};
use inferd_core::Manifest;
use std::path::Path;
use tracing::info;

/// Load the manifest, apply environment overrides, and validate it
pub fn load_manifest(config: Option<&Path>) -> Result<Manifest> {
    let mut manifest = match config {
        Some(path) => {
            info!("Loading manifest from: {}", path.display());
            Manifest::from_file(path)
                .with_context(|| format!("failed to load manifest {}", path.display()))?
        }
        None => {
            info!("Using built-in default manifest");
            Manifest::default_manifest()
        }
    };

    manifest.apply_env_overrides()?;
    manifest.validate()?;
    Ok(manifest)
}
