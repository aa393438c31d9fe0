//! Configuration module for vistrace
//!
//! This module handles analysis configuration:
//! - Per-stage settings (tracer, limits, filter, classifier, advisory)
//! - Loading/saving the TOML config file
//! - Platform-specific config and data directories
//!
//! # Locations
//!
//! - Config: `<config dir>/vistrace/config.toml`
//!   (`~/.config/vistrace/` on Linux)
//! - Data: `<data dir>/vistrace/` (`~/.local/share/vistrace/` on Linux),
//!   holding `last_analysis.json`
//!
//! # Example
//!
//! ```ignore
//! use vistrace::config::AnalysisConfig;
//!
//! let mut config = AnalysisConfig::load_or_default(None);
//! config.advisory.enabled = false;
//! config.save(AnalysisConfig::default_path().unwrap())?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, VisTraceError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config and data directories
pub const APP_ID: &str = "vistrace";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Filename of the persisted last analysis
pub const LAST_ANALYSIS_FILE: &str = "last_analysis.json";

// ==================== Directories ====================

/// Get the application config directory path
pub fn app_config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        VisTraceError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            VisTraceError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

// ==================== Analysis Config ====================

/// Complete configuration for one analysis
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub tracer: TracerSettings,

    #[serde(default)]
    pub limits: ExecutionLimits,

    #[serde(default)]
    pub filter: FilterSettings,

    #[serde(default)]
    pub classifier: ClassifierSettings,

    #[serde(default)]
    pub advisory: AdvisorySettings,
}

impl AnalysisConfig {
    /// Default config file path
    pub fn default_path() -> Option<PathBuf> {
        app_config_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Parse a config from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| VisTraceError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VisTraceError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::from_toml(&content).map_err(|e| e.with_context(format!("{:?}", path)))
    }

    /// Load from the given path or the default location, falling back to
    /// defaults if the file is missing or broken
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) if p.exists() => p,
                _ => return Self::default(),
            },
        };

        match Self::load(&path) {
            Ok(config) => {
                tracing::debug!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Render the config as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| VisTraceError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Save the config to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VisTraceError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        std::fs::write(path, self.to_toml()?).map_err(|e| {
            VisTraceError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}
