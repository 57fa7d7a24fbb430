//! inferd - command-line control surface for the inferd orchestrator

use anyhow::Result;
use clap::{Parser, Subcommand};
use inferd_telemetry::TelemetryBackend;
use std::path::PathBuf;
use tracing::debug;

mod commands;
mod output;

use output::OutputFormat;

/// Overcommitted memory budget; the manifest cannot be planned
pub const EXIT_OVERCOMMIT: i32 = 2;
/// A service failed to reach readiness within its budgeted attempts
pub const EXIT_LAUNCH_FAILURE: i32 = 3;
/// GPU memory pressure is critical
pub const EXIT_PRESSURE_CRITICAL: i32 = 4;

/// Orchestrate co-resident GPU inference services on one host
#[derive(Debug, Parser)]
#[command(name = "inferd")]
#[command(about = "Orchestrate co-resident GPU inference services on one host")]
#[command(version)]
pub struct Cli {
    /// Manifest file path (built-in defaults when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Telemetry backend (nvidia-smi, mock)
    #[arg(long, default_value = "nvidia-smi")]
    telemetry: TelemetryBackend,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// PID file path
    #[arg(long, value_name = "FILE")]
    pid_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Plan the memory budget, launch all services, and supervise them
    Start,

    /// Stop a running orchestrator via its PID file
    Stop,

    /// Show the budget plan, probe every readiness endpoint, and sample GPU memory
    Status,

    /// Continuously show status until interrupted
    Watch {
        /// Refresh interval in seconds
        #[arg(short, long, default_value = "5")]
        interval: u64,
    },

    /// Generate a default manifest
    Config {
        /// Output file path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a manifest and its budget plan
    Validate {
        /// Manifest file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn default_pid_file() -> PathBuf {
    std::env::temp_dir().join("inferd.pid")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "inferd_cli={0},inferd_core={0},inferd_supervisor={0},inferd_telemetry={0}",
            log_level
        ))
        .with_target(false)
        .init();

    debug!("Starting inferd CLI with args: {:?}", cli);

    let pid_file = cli.pid_file.clone().unwrap_or_else(default_pid_file);

    let code = match cli.command {
        Commands::Start => {
            commands::start::run(cli.config, cli.telemetry, pid_file, cli.output).await?
        }
        Commands::Stop => commands::stop::run(pid_file).await?,
        Commands::Status => {
            commands::status::run(cli.config, cli.telemetry, cli.output).await?
        }
        Commands::Watch { interval } => {
            commands::status::watch(cli.config, cli.telemetry, cli.output, interval).await?
        }
        Commands::Config { output } => commands::config::generate(output)?,
        Commands::Validate { config } => commands::config::validate(config, cli.output)?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert()
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["inferd", "start"]).unwrap();
        assert!(matches!(cli.command, Commands::Start));

        let cli = Cli::try_parse_from(["inferd", "--telemetry", "mock", "status"]).unwrap();
        assert_eq!(cli.telemetry, TelemetryBackend::Mock);

        let cli = Cli::try_parse_from(["inferd", "watch", "--interval", "2"]).unwrap();
        assert!(matches!(cli.command, Commands::Watch { interval: 2 }));
    }

    #[test]
    fn test_validate_requires_config() {
        assert!(Cli::try_parse_from(["inferd", "validate"]).is_err());
    }
}
