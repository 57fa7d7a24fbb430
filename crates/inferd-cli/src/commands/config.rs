//! Manifest generation and validation commands

use crate::output::{self, OutputFormat};
use crate::EXIT_OVERCOMMIT;
use anyhow::Result;
use inferd_core::{plan, Error as CoreError, Manifest};
use std::path::PathBuf;

/// Write the built-in default manifest to a file or stdout
pub fn generate(output_path: Option<PathBuf>) -> Result<i32> {
    let manifest = Manifest::default_manifest();

    match output_path {
        Some(path) => {
            manifest.to_file(&path)?;
            output::print_success(&format!("Generated manifest: {}", path.display()));
        }
        None => {
            print!("{}", serde_yaml::to_string(&manifest)?);
        }
    }

    Ok(0)
}

/// Validate a manifest file, including its budget plan
pub fn validate(config: PathBuf, format: OutputFormat) -> Result<i32> {
    println!("Validating manifest: {}", config.display());

    let mut manifest = Manifest::from_file(&config)?;
    manifest.apply_env_overrides()?;
    manifest.validate()?;

    let budget = match plan(&manifest.services, manifest.safety_margin) {
        Ok(budget) => budget,
        Err(e @ CoreError::Overcommit { .. }) => {
            output::print_error(&e.to_string());
            return Ok(EXIT_OVERCOMMIT);
        }
        Err(e) => return Err(e.into()),
    };

    output::print_success("Manifest is valid");
    println!("Services: {}", manifest.services.len());
    println!("Safety margin: {:.2}", manifest.safety_margin);
    println!("Headroom: {:.2}", budget.headroom());
    if format == OutputFormat::Table {
        println!("{}", output::plan_table(&budget, None));
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_writes_loadable_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.yaml");
        assert_eq!(generate(Some(path.clone())).unwrap(), 0);

        let manifest = Manifest::from_file(&path).unwrap();
        manifest.validate().unwrap();
        assert_eq!(manifest.services.len(), 2);
    }

    #[test]
    fn test_validate_accepts_generated_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.yaml");
        generate(Some(path.clone())).unwrap();
        assert_eq!(validate(path, OutputFormat::Table).unwrap(), 0);
    }

    #[test]
    fn test_validate_flags_overcommit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.yaml");
        let mut manifest = Manifest::default_manifest();
        manifest.services[0].memory_fraction = 0.9;
        manifest.services[1].memory_fraction = 0.25;
        manifest.to_file(&path).unwrap();

        assert_eq!(validate(path, OutputFormat::Table).unwrap(), EXIT_OVERCOMMIT);
    }
}
