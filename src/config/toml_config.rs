//! TOML Configuration with Environment Variable Overrides
//!
//! Supports:
//! - TOML configuration file at `$CODEFLOW_CONFIG` or the user config dir
//! - `CODEFLOW_*` environment variable overrides
//! - Atomic writes with backup

use crate::agents::types::AgentConfiguration;
use crate::channels::NotificationChannelConfig;
use crate::consensus::ConsensusConfig;
use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "CODEFLOW_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CoordinatorConfig {
    /// Defaults applied to every registered agent
    #[serde(default)]
    pub agents: AgentConfiguration,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Coordinator-level destinations for merged results
    #[serde(default)]
    pub channels: Vec<NotificationChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sled,
}

impl StorageBackend {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "sled" => Some(Self::Sled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Sled database location; the user config dir when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// TTL of `agent:{id}:state` checkpoints; 0 keeps them forever
    #[serde(default = "default_checkpoint_ttl_secs")]
    pub checkpoint_ttl_secs: u64,
}

fn default_checkpoint_ttl_secs() -> u64 {
    24 * 60 * 60
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: None,
            checkpoint_ttl_secs: default_checkpoint_ttl_secs(),
        }
    }
}

impl StorageConfig {
    pub fn checkpoint_ttl(&self) -> Option<Duration> {
        (self.checkpoint_ttl_secs > 0).then(|| Duration::from_secs(self.checkpoint_ttl_secs))
    }
}

pub fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("codeflow");
    path.push("config.toml");
    path
}

/// Load from the default location, falling back to defaults. Never fails.
pub fn load_config() -> CoordinatorConfig {
    let path = get_config_path();

    let config = if path.exists() {
        match load_from(&path) {
            Ok(config) => {
                tracing::info!("Loaded TOML config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable config at {:?}, using defaults", path);
                CoordinatorConfig::default()
            }
        }
    } else {
        tracing::debug!("No config at {:?}, using defaults", path);
        CoordinatorConfig::default()
    };

    apply_env_overrides(config)
}

/// Parse one file without env overrides
pub fn load_from(path: &Path) -> Result<CoordinatorConfig> {
    let contents = fs::read_to_string(path)
        .map_err(|e| AgentError::Config(format!("read {}: {}", path.display(), e)))?;
    let config: CoordinatorConfig = toml::from_str(&contents)
        .map_err(|e| AgentError::Config(format!("parse {}: {}", path.display(), e)))?;
    config.agents.validate()?;
    Ok(config)
}

pub fn save_config(config: &CoordinatorConfig) -> Result<()> {
    save_config_to(config, &get_config_path())
}

pub fn save_config_to(config: &CoordinatorConfig, path: &Path) -> Result<()> {
    let io_err = |e: std::io::Error| AgentError::Config(e.to_string());

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    if path.exists() {
        let backup_path = path.with_extension("toml.bak");
        let _ = fs::copy(path, &backup_path);
    }

    let contents =
        toml::to_string_pretty(config).map_err(|e| AgentError::Config(e.to_string()))?;

    let temp_path = path.with_extension("toml.tmp");
    fs::write(&temp_path, &contents).map_err(io_err)?;
    fs::rename(&temp_path, path).map_err(io_err)?;

    tracing::info!("Saved TOML config to {:?}", path);
    Ok(())
}

pub fn apply_env_overrides(config: CoordinatorConfig) -> CoordinatorConfig {
    apply_overrides_from(config, |key| std::env::var(key).ok())
}

/// Overrides read through `lookup`; unparsable values are ignored
pub fn apply_overrides_from<F>(mut config: CoordinatorConfig, lookup: F) -> CoordinatorConfig
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("CODEFLOW_CONFIDENCE_THRESHOLD") {
        match v.parse::<f64>() {
            Ok(t) if (0.0..=1.0).contains(&t) => config.agents.confidence_threshold = t,
            _ => tracing::warn!(value = %v, "Ignoring CODEFLOW_CONFIDENCE_THRESHOLD"),
        }
    }

    if let Some(v) = lookup("CODEFLOW_MAX_ANALYSIS_MS") {
        match v.parse::<u64>() {
            Ok(ms) if ms > 0 => config.agents.max_analysis_time_ms = ms,
            _ => tracing::warn!(value = %v, "Ignoring CODEFLOW_MAX_ANALYSIS_MS"),
        }
    }

    if let Some(v) = lookup("CODEFLOW_MAX_RECOMMENDATIONS") {
        match v.parse::<u32>() {
            Ok(n) => config.agents.max_recommendations_per_period = n,
            Err(_) => tracing::warn!(value = %v, "Ignoring CODEFLOW_MAX_RECOMMENDATIONS"),
        }
    }

    if let Some(v) = lookup("CODEFLOW_STORAGE_BACKEND") {
        match StorageBackend::from_str(&v) {
            Some(backend) => config.storage.backend = backend,
            None => tracing::warn!(value = %v, "Ignoring CODEFLOW_STORAGE_BACKEND"),
        }
    }

    if let Some(v) = lookup("CODEFLOW_STORAGE_PATH") {
        if !v.is_empty() {
            config.storage.path = Some(PathBuf::from(v));
        }
    }

    config
}
