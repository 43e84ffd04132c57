//! Configuration for the metadata engine
//!
//! Handles configuration loading and synchronization backend selection.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cond::CondBackend;
use crate::error::{MetaError, Result};

/// Metadata store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory the internal file plugin persists under
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Wait/notify backend every attached process must agree on
    #[serde(default)]
    pub cond_backend: CondBackend,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/modstore")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cond_backend: CondBackend::default(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MetaError::internal(format!("config read: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MetaError::internal(format!("config parse: {e}")))
    }
}
