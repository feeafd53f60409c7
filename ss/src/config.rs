//! ShellSync configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::sync::SyncConfig;

/// Main ShellSync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Coordinator configuration
    pub sync: SyncConfig,

    /// Tenant settings storage
    pub storage: StorageConfig,

    /// Local cluster simulation
    pub simulation: SimulationConfig,
}

impl Config {
    /// Check values that would make the coordinator misbehave
    pub fn validate(&self) -> Result<()> {
        if self.sync.channel.is_empty() || self.sync.channel.contains(crate::codec::SEPARATOR) {
            return Err(eyre::eyre!("Invalid channel name '{}'", self.sync.channel));
        }
        if self.sync.control_tenant.is_empty() {
            return Err(eyre::eyre!("control-tenant must not be empty"));
        }
        if self.simulation.nodes == 0 {
            return Err(eyre::eyre!("simulation.nodes must be at least 1"));
        }
        Ok(())
    }

    /// Load the explicit file if one was named, else the first readable candidate, else defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::candidate_paths() {
            if !candidate.is_file() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                // A broken optional file falls through to the next one
                Err(e) => warn!(path = %candidate.display(), error = %e, "Config::load: skipping unreadable config"),
            }
        }

        info!("Config::load: no config file found, using defaults");
        Ok(Self::default())
    }

    /// Implicit config locations, most specific first
    pub fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".shellsync.yml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("shellsync").join("shellsync.yml"));
        }
        paths
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Config::load_from_file: called");
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        info!(path = %path.display(), "Config::load_from_file: loaded");
        Ok(config)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one settings file per tenant
    pub dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // ~/.local/share/shellsync/tenants on Linux
        let dir = dirs::data_local_dir()
            .map(|d| d.join("shellsync").join("tenants"))
            .unwrap_or_else(|| PathBuf::from(".shellsync/tenants"))
            .to_string_lossy()
            .into_owned();

        Self { dir }
    }
}

/// Local cluster simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of simulated nodes
    pub nodes: usize,

    /// Tenants created during the run
    pub tenants: Vec<String>,

    /// How long to let deliveries settle before reporting, in milliseconds
    #[serde(rename = "settle-ms")]
    pub settle_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: 3,
            tenants: vec!["alpha".to_string(), "beta".to_string()],
            settle_ms: 200,
        }
    }
}
