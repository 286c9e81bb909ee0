//! Settings file for the command-line client.

use std::path::Path;

use serde::Deserialize;

use dirquery_client::{ConnectionConfig, PoolConfig};

use crate::executor::ExecuteError;

/// Contents of the `--config` JSON file. Command-line flags override it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub connection: ConnectionConfig,
    pub pool: PoolConfig,
    /// Search base used when `--base` is not given.
    pub base: Option<String>,
    /// Largest page the server returns.
    pub max_page_size: Option<u32>,
}

impl CliConfig {
    /// Read and parse a settings file.
    pub fn load(path: &Path) -> Result<Self, ExecuteError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| ExecuteError::Config(format!("{}: {}", path.display(), e)))
    }
}
