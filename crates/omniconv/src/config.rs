//! Engine configuration: JSON-loadable, validated, with sane defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_worker_count() -> usize {
    num_cpus::get().max(1)
}

fn default_strategy_timeout_secs() -> u64 {
    120
}

fn default_progress_capacity() -> usize {
    128
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Root of the content-addressed upload store.
    pub storage_dir: PathBuf,
    /// Directory for conversion outputs (one artifact per job).
    pub output_dir: PathBuf,
    /// SQLite file for the durable job store; `None` keeps jobs
    /// in-memory only.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Number of parallel conversion workers.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Wall-clock budget per strategy attempt (not per job).
    #[serde(default = "default_strategy_timeout_secs")]
    pub strategy_timeout_secs: u64,
    /// Capacity of the progress broadcast channel.
    #[serde(default = "default_progress_capacity")]
    pub progress_capacity: usize,
}

impl EngineConfig {
    /// Standard layout under a single root directory.
    pub fn for_root<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            storage_dir: root.join("store"),
            output_dir: root.join("converted"),
            database_path: Some(root.join("omniconv.db")),
            worker_count: default_worker_count(),
            strategy_timeout_secs: default_strategy_timeout_secs(),
            progress_capacity: default_progress_capacity(),
        }
    }

    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_secs(self.strategy_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::Validation {
                message: "workerCount must be at least 1".to_string(),
            });
        }
        if self.strategy_timeout_secs == 0 {
            return Err(ConfigError::Validation {
                message: "strategyTimeoutSecs must be at least 1".to_string(),
            });
        }
        if self.progress_capacity == 0 {
            return Err(ConfigError::Validation {
                message: "progressCapacity must be at least 1".to_string(),
            });
        }
        if self.storage_dir == self.output_dir {
            return Err(ConfigError::Validation {
                message: "storageDir and outputDir must differ".to_string(),
            });
        }
        Ok(())
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Default data root: `~/.omniconv`.
pub fn default_storage_root() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".omniconv"))
}
