// Engine configuration
//
// Loaded from TOML. Every field is optional; missing fields fall back to
// the defaults below.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Range tokens expanding to more cells than this are rejected.
    pub max_range_cells: usize,
    /// Reject formulas naming an unknown range. When false they are accepted
    /// and evaluate to the unknown-name sentinel.
    pub reject_unresolved_names: bool,
    /// Emit a one-line debug summary after each recalculation pass.
    pub log_recalc_summary: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_range_cells: 1_000_000,
            reject_unresolved_names: true,
            log_recalc_summary: true,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a TOML file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&contents)?;
        log::debug!("loaded engine config from {}", path.as_ref().display());
        Ok(config)
    }
}
