//! Service manifest: the declarative input describing the services inferd manages

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Static declaration of one managed service. Immutable once the manifest is
/// loaded; runtime state lives in [`crate::StateTable`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Unique service name
    pub name: String,

    /// Command used to launch the service
    pub command: String,

    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables for the service process
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Working directory (inherited from inferd if not set)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Listening port
    pub port: u16,

    /// Readiness-check URL; only a 2xx response counts as ready
    pub readiness_url: Url,

    /// Declared fraction of total GPU memory in (0, 1]
    pub memory_fraction: f64,

    /// Minimum acceptable fraction
    #[serde(default = "default_min_fraction")]
    pub min_fraction: f64,

    /// Maximum acceptable fraction
    #[serde(default = "default_max_fraction")]
    pub max_fraction: f64,

    /// Start-order rank; lower ranks launch first, equal ranks launch
    /// concurrently
    pub start_order: u32,

    /// Name of a service that must be Healthy before this one launches.
    /// The dependency must have a strictly lower start-order rank.
    #[serde(default)]
    pub depends_on: Option<String>,
}

/// Timeouts governing launch, readiness polling, and shutdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// How long a service may take to become ready after launch (seconds)
    pub readiness_timeout_seconds: u64,

    /// Interval between readiness probes (seconds)
    pub poll_interval_seconds: u64,

    /// Grace period between SIGTERM and SIGKILL on stop (seconds)
    pub stop_grace_seconds: u64,
}

/// Automatic restart policy for failed services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartConfig {
    /// Maximum automatic restart attempts before a service is left Failed
    pub max_restarts: u32,

    /// Base backoff delay; attempt N waits base * 2^N (seconds)
    pub backoff_base_seconds: u64,
}

/// Resource monitor sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between GPU memory samples (seconds)
    pub sample_interval_seconds: u64,
}

/// Complete service manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Managed services
    pub services: Vec<ServiceSpec>,

    /// Reserved headroom subtracted from the total budget to absorb
    /// allocation overhead and fragmentation
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,

    /// Launch and shutdown timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Restart policy
    #[serde(default)]
    pub restart: RestartConfig,

    /// Monitor sampling
    #[serde(default)]
    pub monitor: MonitorConfig,
}

fn default_min_fraction() -> f64 {
    0.0
}

fn default_max_fraction() -> f64 {
    1.0
}

fn default_safety_margin() -> f64 {
    0.05
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            // Large models can take minutes to load weights before the
            // readiness endpoint answers; match the engines' startup grace.
            readiness_timeout_seconds: 300,
            poll_interval_seconds: 5,
            stop_grace_seconds: 15,
        }
    }
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            backoff_base_seconds: 1,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval_seconds: 5,
        }
    }
}

impl TimeoutConfig {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_seconds)
    }
}

impl RestartConfig {
    /// Backoff before restart attempt `attempt` (zero-based)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(6);
        Duration::from_secs(self.backoff_base_seconds.saturating_mul(1 << exponent))
    }
}

impl MonitorConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_seconds)
    }
}

impl ServiceSpec {
    /// Validate this spec in isolation
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Manifest("Service name cannot be empty".to_string()));
        }

        if self.command.is_empty() {
            return Err(Error::Manifest(format!(
                "Service {} has an empty launch command",
                self.name
            )));
        }

        if !(self.memory_fraction > 0.0 && self.memory_fraction <= 1.0) {
            return Err(Error::InvalidFraction {
                service: self.name.clone(),
                fraction: self.memory_fraction,
            });
        }

        if self.min_fraction > self.max_fraction {
            return Err(Error::Manifest(format!(
                "Service {}: min_fraction {} exceeds max_fraction {}",
                self.name, self.min_fraction, self.max_fraction
            )));
        }

        if self.memory_fraction < self.min_fraction || self.memory_fraction > self.max_fraction {
            return Err(Error::Manifest(format!(
                "Service {}: memory_fraction {} outside declared bounds [{}, {}]",
                self.name, self.memory_fraction, self.min_fraction, self.max_fraction
            )));
        }

        match self.readiness_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::Manifest(format!(
                    "Service {}: readiness URL must use HTTP or HTTPS, got {}",
                    self.name, other
                )));
            }
        }

        if let Some(dep) = &self.depends_on {
            if dep == &self.name {
                return Err(Error::Manifest(format!(
                    "Service {} cannot depend on itself",
                    self.name
                )));
            }
        }

        Ok(())
    }
}

impl Manifest {
    /// Load a manifest from a YAML file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::Manifest(format!(
                "Failed to read manifest {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a manifest from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let manifest: Manifest = serde_yaml::from_str(content)
            .map_err(|e| Error::Manifest(format!("Failed to parse manifest: {}", e)))?;
        Ok(manifest)
    }

    /// Save the manifest to a YAML file
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Apply `INFERD_*` environment overrides on top of the loaded values.
    /// Unparseable values are rejected rather than ignored.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = read_env_override("INFERD_SAFETY_MARGIN")? {
            self.safety_margin = value;
        }
        if let Some(value) = read_env_override("INFERD_READINESS_TIMEOUT_SECONDS")? {
            self.timeouts.readiness_timeout_seconds = value;
        }
        if let Some(value) = read_env_override("INFERD_POLL_INTERVAL_SECONDS")? {
            self.timeouts.poll_interval_seconds = value;
        }
        if let Some(value) = read_env_override("INFERD_STOP_GRACE_SECONDS")? {
            self.timeouts.stop_grace_seconds = value;
        }
        if let Some(value) = read_env_override("INFERD_MAX_RESTARTS")? {
            self.restart.max_restarts = value;
        }
        if let Some(value) = read_env_override("INFERD_SAMPLE_INTERVAL_SECONDS")? {
            self.monitor.sample_interval_seconds = value;
        }
        Ok(())
    }

    /// Validate the whole manifest: per-spec checks plus cross-service
    /// consistency (unique names and ports, resolvable dependencies,
    /// dependency rank ordering).
    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(Error::Manifest(
                "Manifest declares no services".to_string(),
            ));
        }

        if !(self.safety_margin >= 0.0 && self.safety_margin < 1.0) {
            return Err(Error::Manifest(format!(
                "Safety margin {} must be in [0, 1)",
                self.safety_margin
            )));
        }

        if self.timeouts.poll_interval_seconds == 0 {
            return Err(Error::Manifest(
                "Poll interval must be greater than zero".to_string(),
            ));
        }

        if self.timeouts.poll_interval_seconds > self.timeouts.readiness_timeout_seconds {
            return Err(Error::Manifest(
                "Poll interval must not exceed the readiness timeout".to_string(),
            ));
        }

        let mut names = HashSet::new();
        let mut ports = HashMap::new();
        for spec in &self.services {
            spec.validate()?;

            if !names.insert(spec.name.as_str()) {
                return Err(Error::Manifest(format!(
                    "Duplicate service name: {}",
                    spec.name
                )));
            }

            if let Some(other) = ports.insert(spec.port, spec.name.as_str()) {
                return Err(Error::Manifest(format!(
                    "Services {} and {} both declare port {}",
                    other, spec.name, spec.port
                )));
            }
        }

        // Dependencies must exist and sit at a strictly lower rank, which
        // rules out cycles without a separate graph walk.
        let ranks: HashMap<&str, u32> = self
            .services
            .iter()
            .map(|s| (s.name.as_str(), s.start_order))
            .collect();
        for spec in &self.services {
            if let Some(dep) = &spec.depends_on {
                let dep_rank = ranks
                    .get(dep.as_str())
                    .ok_or_else(|| Error::UnknownService(dep.clone()))?;
                if *dep_rank >= spec.start_order {
                    return Err(Error::Manifest(format!(
                        "Service {} (rank {}) depends on {} (rank {}): \
                         dependencies must have a lower start-order rank",
                        spec.name, spec.start_order, dep, dep_rank
                    )));
                }
            }
        }

        Ok(())
    }

    /// Look up a service spec by name
    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Services in ascending start-order rank
    pub fn services_by_rank(&self) -> Vec<&ServiceSpec> {
        let mut ordered: Vec<&ServiceSpec> = self.services.iter().collect();
        ordered.sort_by_key(|s| s.start_order);
        ordered
    }

    /// A complete example manifest with a primary LLM engine and a RAG
    /// companion, matching the stack this orchestrator grew up around.
    pub fn default_manifest() -> Self {
        let vllm = ServiceSpec {
            name: "vllm".to_string(),
            command: "vllm".to_string(),
            args: vec![
                "serve".to_string(),
                "Qwen/Qwen3-32B-Instruct".to_string(),
                "--port".to_string(),
                "8000".to_string(),
            ],
            env: HashMap::new(),
            working_dir: None,
            port: 8000,
            readiness_url: Url::parse("http://127.0.0.1:8000/health").unwrap(),
            memory_fraction: 0.75,
            min_fraction: 0.5,
            max_fraction: 0.9,
            start_order: 0,
            depends_on: None,
        };

        let rag = ServiceSpec {
            name: "rag-ui".to_string(),
            command: "anythingllm".to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            port: 3001,
            readiness_url: Url::parse("http://127.0.0.1:3001/api/ping").unwrap(),
            memory_fraction: 0.15,
            min_fraction: 0.05,
            max_fraction: 0.25,
            start_order: 1,
            depends_on: Some("vllm".to_string()),
        };

        Self {
            services: vec![vllm, rag],
            safety_margin: default_safety_margin(),
            timeouts: TimeoutConfig::default(),
            restart: RestartConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

fn read_env_override<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Manifest(format!("Invalid value for {}: {}", key, raw))),
        Err(_) => Ok(None),
    }
}
