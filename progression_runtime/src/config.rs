//! Engine configuration.
//!
//! Loaded from TOML or built in code. Every ladder is validated before
//! an engine accepts it.
//!
//! ```toml
//! schema_version = 2
//! clamp_min_xp = 0
//! rule_scope = "retroactive"
//! replay = "incremental"
//!
//! [storage]
//! path = "/var/lib/bigbrother/progress.db"
//!
//! [[level_thresholds]]
//! level = 1
//! xp_required = 0
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use progression_kernel::invariants::validate_ladder;
use progression_kernel::levels::default_thresholds;
use progression_kernel::{LevelThreshold, ReduceOptions, RuleScope};

use crate::error::EngineError;
use crate::schema::CURRENT_SCHEMA_VERSION;

/// Where the SQLite store lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageLocation {
    /// Private in-memory database. Its contents are lost on `close`.
    Memory,
    Path(PathBuf),
}

/// How `record_event` computes the state it snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStrategy {
    /// Reload and replay the full log on every write.
    #[default]
    Full,
    /// Keep a running accumulator between writes.
    Incremental,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub storage: StorageLocation,
    pub schema_version: u32,
    pub clamp_min_xp: i64,
    pub level_thresholds: Vec<LevelThreshold>,
    pub rule_scope: RuleScope,
    pub replay: ReplayStrategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage: StorageLocation::Memory,
            schema_version: CURRENT_SCHEMA_VERSION,
            clamp_min_xp: 0,
            level_thresholds: default_thresholds(),
            rule_scope: RuleScope::Retroactive,
            replay: ReplayStrategy::Full,
        }
    }
}

impl EngineConfig {
    /// Default config backed by a database file.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageLocation::Path(path.into()),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        let config: Self =
            toml::from_str(text).map_err(|e| EngineError::ConfigFile(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = fs::read_to_string(path).map_err(|e| {
            EngineError::ConfigFile(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        validate_ladder(&self.level_thresholds)?;
        Ok(())
    }

    pub fn reduce_options(&self) -> ReduceOptions {
        ReduceOptions {
            clamp_min_xp: self.clamp_min_xp,
            level_thresholds: self.level_thresholds.clone(),
        }
    }
}
