use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::{ArchiveError, Result};

/// Process-level configuration of the store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory of the local disk store
    pub data_dir: PathBuf,
    /// Host memory budget shared by all archive batches
    pub host_memory_budget_bytes: u64,
    /// Rows per live batch
    pub live_batch_capacity: u32,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// How often the scheduler looks for shards due for archiving
    pub tick_interval_secs: u64,
}

/// Per-table archiving settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Live data younger than this is never archived
    pub archiving_delay_minutes: u32,
    /// Minimum time between two archiving runs of a shard
    pub archiving_interval_minutes: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            host_memory_budget_bytes: 4 * 1024 * 1024 * 1024, // 4GB
            live_batch_capacity: 4096,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_secs: 60,
        }
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            archiving_delay_minutes: 1440,
            archiving_interval_minutes: 180,
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: StoreConfig =
            toml::from_str(content).map_err(|e| ArchiveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(
                "Configuration file {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.live_batch_capacity == 0 {
            return Err(ArchiveError::Config(
                "live_batch_capacity must be positive".to_string(),
            ));
        }
        if self.scheduler.enabled && self.scheduler.tick_interval_secs == 0 {
            return Err(ArchiveError::Config(
                "scheduler.tick_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
