use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::types::error::{RecorderError, Result};

/// Recorder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Record new consumers' notifications until told otherwise
    #[serde(default = "default_true")]
    pub recording_enabled_by_default: bool,

    /// How many trailing queue entries coalescing looks back over
    #[serde(default = "default_coalesce_window")]
    pub coalesce_window: usize,

    /// Where recorder state is kept
    #[serde(default)]
    pub store: StoreConfig,
}

/// Durable store selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database file (sqlite) or directory (file); defaults to the data directory
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// One SQLite database shared by all consumers
    #[default]
    Sqlite,
    /// One JSON file per consumer
    File,
    /// Nothing survives the process (for testing)
    Memory,
}

fn default_true() -> bool {
    true
}

fn default_coalesce_window() -> usize {
    64
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            recording_enabled_by_default: true,
            coalesce_window: default_coalesce_window(),
            store: StoreConfig::default(),
        }
    }
}

impl RecorderConfig {
    /// SQLite database file for the sqlite backend
    pub fn sqlite_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| default_data_directory().join("recorder.db"))
    }

    /// Directory holding per-consumer files for the file backend
    pub fn file_directory(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| default_data_directory().join("queues"))
    }
}

/// Directory for recorder state
pub fn default_data_directory() -> PathBuf {
    // Keep debug builds' state next to the checkout
    if cfg!(debug_assertions) {
        return PathBuf::from("../.change-recorder");
    }

    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("change-recorder")
}

/// Get default config paths
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // XDG config path
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("change-recorder").join("config.toml"));
    }

    // Home directory fallback
    if let Some(home_dir) = dirs::home_dir() {
        paths.push(
            home_dir
                .join(".config")
                .join("change-recorder")
                .join("config.toml"),
        );
        paths.push(home_dir.join(".change-recorder.rc"));
    }

    paths
}

/// Load configuration from the first default path that exists
pub fn load_config() -> Result<RecorderConfig> {
    for path in default_config_paths() {
        if path.exists() {
            info!("Found config at: {:?}", path);
            return load_config_from_path(&path);
        }
    }

    info!("No config file found, using defaults");
    Ok(RecorderConfig::default())
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<RecorderConfig> {
    info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path)
        .map_err(|e| RecorderError::Config(format!("Failed to read config: {}", e)))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<RecorderConfig> {
    let config: RecorderConfig = toml::from_str(content)
        .map_err(|e| RecorderError::Config(format!("Failed to parse config: {}", e)))?;

    if config.coalesce_window == 0 {
        return Err(RecorderError::Config(
            "coalesce_window must be at least 1".to_string(),
        ));
    }

    Ok(config)
}
