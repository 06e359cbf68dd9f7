//! Store configuration.
//!
//! Resolution order: defaults, then an optional JSON file, then `TABLEKV_*`
//! environment variables.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `TABLEKV_PATH` | `path` |
//! | `TABLEKV_BACKEND` | `backend` (`sled`, `temporary`, `memory`) |
//! | `TABLEKV_SEQUENCE_BANDWIDTH` | `sequence_bandwidth` |
//! | `TABLEKV_WRITE_MODE` | `write_mode` (`atomic`, `per_entry`) |
//! | `TABLEKV_FLUSH_ON_CLOSE` | `flush_on_close` |

use crate::error::{TkvError, TkvResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Which substrate a store runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// sled database at `path`.
    Sled,
    /// sled database deleted on drop.
    Temporary,
    /// BTreeMap, nothing persisted.
    Memory,
}

/// How a record's entries reach the substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// All entries of one save/update/delete in one atomic batch.
    Atomic,
    /// One write per entry. A failure mid-record leaves earlier entries in
    /// place and readers may observe a partially written row.
    PerEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// Directory of the sled database, required for [`BackendKind::Sled`].
    pub path: Option<PathBuf>,
    /// Row ids leased from the substrate per sequence round trip.
    pub sequence_bandwidth: u64,
    pub write_mode: WriteMode,
    /// Flush the substrate when the store is closed.
    pub flush_on_close: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            path: None,
            sequence_bandwidth: 1,
            write_mode: WriteMode::Atomic,
            flush_on_close: true,
        }
    }
}

impl StoreConfig {
    /// Persistent sled store at `path`.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::Sled,
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_sequence_bandwidth(mut self, bandwidth: u64) -> Self {
        self.sequence_bandwidth = bandwidth;
        self
    }

    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Load from a JSON file; missing fields keep their defaults.
    pub fn from_file(path: &Path) -> TkvResult<Self> {
        let json = fs::read_to_string(path)?;
        let config: StoreConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then `file` if it exists, then environment overrides.
    pub fn load(file: Option<&Path>) -> TkvResult<Self> {
        let mut config = match file.filter(|p| p.exists()) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TABLEKV_*` environment overrides.
    pub fn apply_env(&mut self) -> TkvResult<()> {
        self.apply_vars(|name| env::var(name).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> TkvResult<()> {
        if let Some(path) = var("TABLEKV_PATH") {
            self.path = Some(PathBuf::from(path));
        }
        if let Some(backend) = var("TABLEKV_BACKEND") {
            self.backend = match backend.to_lowercase().as_str() {
                "sled" => BackendKind::Sled,
                "temporary" => BackendKind::Temporary,
                "memory" => BackendKind::Memory,
                other => return Err(TkvError::Config(format!("unknown backend {other:?}"))),
            };
        }
        if let Some(bandwidth) = var("TABLEKV_SEQUENCE_BANDWIDTH") {
            self.sequence_bandwidth = bandwidth.parse().map_err(|_| {
                TkvError::Config(format!("invalid sequence bandwidth {bandwidth:?}"))
            })?;
        }
        if let Some(mode) = var("TABLEKV_WRITE_MODE") {
            self.write_mode = match mode.to_lowercase().as_str() {
                "atomic" => WriteMode::Atomic,
                "per_entry" => WriteMode::PerEntry,
                other => return Err(TkvError::Config(format!("unknown write mode {other:?}"))),
            };
        }
        if let Some(flush) = var("TABLEKV_FLUSH_ON_CLOSE") {
            self.flush_on_close = flush.to_lowercase() == "true" || flush == "1";
        }
        Ok(())
    }

    pub fn validate(&self) -> TkvResult<()> {
        if self.sequence_bandwidth == 0 {
            return Err(TkvError::Config(
                "sequence_bandwidth must be at least 1".to_string(),
            ));
        }
        if self.backend == BackendKind::Sled && self.path.is_none() {
            return Err(TkvError::Config("sled backend requires a path".to_string()));
        }
        Ok(())
    }

    /// Persist as pretty JSON.
    pub fn save_to_file(&self, path: &Path) -> TkvResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)?;
        Ok(())
    }
}
