//! Persistence of the most recent analysis

use std::path::{Path, PathBuf};

use crate::analysis::AnalysisReport;
use crate::config::{app_data_dir, ensure_app_data_dir, LAST_ANALYSIS_FILE};
use crate::error::{Result, VisTraceError};

/// JSON file holding the last [`AnalysisReport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastAnalysisStore {
    path: PathBuf,
}

impl LastAnalysisStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in the application data directory, creating it if needed
    pub fn in_data_dir() -> Result<Self> {
        Ok(Self::new(ensure_app_data_dir()?.join(LAST_ANALYSIS_FILE)))
    }

    /// Default location without touching the filesystem
    pub fn default_path() -> Option<PathBuf> {
        app_data_dir().map(|dir| dir.join(LAST_ANALYSIS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the stored analysis
    pub fn save(&self, report: &AnalysisReport) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(report)
            .map_err(|e| VisTraceError::Serialization(format!("Failed to serialize analysis: {}", e)))?;
        std::fs::write(&self.path, content)?;

        tracing::debug!("Saved last analysis to {:?}", self.path);
        Ok(())
    }

    /// The stored analysis, or `None` if nothing has been saved yet
    pub fn load(&self) -> Result<Option<AnalysisReport>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let report = serde_json::from_str(&content).map_err(|e| {
            VisTraceError::Serialization(format!("Failed to parse {:?}: {}", self.path, e))
        })?;
        tracing::info!("Loaded last analysis from {:?}", self.path);
        Ok(Some(report))
    }

    /// Remove the stored analysis if there is one
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
