//! Engine configuration
//!
//! Read from YAML (every field optional), then overridden by `DOCVAULT_*`
//! environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{IndexError, Result};
use crate::search::embedding::{ModelHandle, HTP_MODEL_NAME};
use crate::search::lifecycle::{LifecycleOptions, StalenessPolicy};

pub const DEFAULT_CONFIG_FILE: &str = "docvault.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root of persisted indices (`<data_dir>/indices/user_<owner>/`)
    pub data_dir: PathBuf,
    /// SQLite document database used by the CLI
    pub database: PathBuf,
    /// Embedding model identifier
    pub model: String,
    pub cache_capacity: usize,
    pub staleness: StalenessPolicy,
    pub rebuild_timeout_secs: Option<u64>,
    pub search: SearchDefaults,
    pub hybrid: HybridDefaults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchDefaults {
    pub k: usize,
    pub threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridDefaults {
    pub semantic_weight: f32,
    pub keyword_weight: f32,
    pub limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database: PathBuf::from("data/documents.db"),
            model: HTP_MODEL_NAME.to_string(),
            cache_capacity: 64,
            staleness: StalenessPolicy::Rebuild,
            rebuild_timeout_secs: None,
            search: SearchDefaults::default(),
            hybrid: HybridDefaults::default(),
        }
    }
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self { k: 10, threshold: 0.3 }
    }
}

impl Default for HybridDefaults {
    fn default() -> Self {
        Self {
            semantic_weight: 0.7,
            keyword_weight: 0.3,
            limit: 20,
        }
    }
}

impl EngineConfig {
    /// Load from an explicit file, or `docvault.yaml` in the working
    /// directory when it exists, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw).map_err(|e| IndexError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|e| IndexError::Config(e.to_string()))
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup("DOCVAULT_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(db) = lookup("DOCVAULT_DATABASE") {
            self.database = PathBuf::from(db);
        }
        if let Some(model) = lookup("DOCVAULT_MODEL") {
            self.model = model;
        }
        if let Some(capacity) = lookup("DOCVAULT_CACHE_CAPACITY") {
            self.cache_capacity = capacity.parse().map_err(|_| {
                IndexError::Config(format!("DOCVAULT_CACHE_CAPACITY is not a number: {}", capacity))
            })?;
        }
        Ok(())
    }

    pub fn lifecycle_options(&self) -> LifecycleOptions {
        LifecycleOptions {
            cache_capacity: self.cache_capacity,
            staleness: self.staleness,
            rebuild_timeout: self.rebuild_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Lazily loaded handle for the configured model. Only the bundled HTP
    /// model ships with this crate; any other name fails on first use.
    pub fn model_handle(&self) -> ModelHandle {
        if self.model == HTP_MODEL_NAME {
            return ModelHandle::harmonic();
        }
        let name = self.model.clone();
        ModelHandle::new(
            self.model.clone(),
            Box::new(move || {
                Err(IndexError::ModelUnavailable(format!("no bundled model named {:?}", name)))
            }),
        )
    }
}
