//! Application configuration
//!
//! Loaded from `~/.pinsight/config.toml` when present; every field has a
//! default so a missing file just means defaults.

use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ledger::MergeMode;

fn default_base_currency() -> String {
    "CAD".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Currency all normalized values are expressed in. Display-only: the
    /// conversion table's multipliers already target this currency.
    #[serde(default = "default_base_currency")]
    pub base_currency: String,

    /// Which ledger shape and merge policy the product runs with.
    #[serde(default)]
    pub merge_mode: MergeMode,

    /// Override for the store location; defaults to `~/.pinsight/data.db`.
    #[serde(default)]
    pub data_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_currency: default_base_currency(),
            merge_mode: MergeMode::default(),
            data_file: None,
        }
    }
}

/// Get the default data directory (~/.pinsight)
pub fn get_default_data_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".pinsight"))
}

impl Config {
    /// Load from the default config path, falling back to defaults when
    /// the file does not exist.
    pub fn load() -> Result<Self> {
        let path = get_default_data_dir()?.join("config.toml");
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config at {:?}", path))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config at {:?}", path))?;
        Ok(config)
    }

    /// Resolve the store path: explicit override, or the default location.
    pub fn data_file(&self) -> Result<PathBuf> {
        match &self.data_file {
            Some(path) => Ok(path.clone()),
            None => Ok(get_default_data_dir()?.join("data.db")),
        }
    }
}
