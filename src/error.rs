//! Error handling for vistrace
//!
//! This module defines the crate error type and a Result alias used
//! throughout tracing, filtering and classification.

use thiserror::Error;

use crate::tracer::snapshot::SnapshotError;

/// Main error type for vistrace operations
#[derive(Error, Debug)]
pub enum VisTraceError {
    /// The script could not be parsed at all
    #[error("Compile error{}: {message}", line.map(|l| format!(" at line {l}")).unwrap_or_default())]
    Compile { message: String, line: Option<usize> },

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// A value could not be turned into a snapshot
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// The advisory classifier could not be reached or refused the request
    #[error("Advisory error: {0}")]
    Advisory(String),

    /// The advisory reply did not contain a usable decision
    #[error("Advisory reply could not be parsed: {0}")]
    AdvisoryParse(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<VisTraceError>,
    },
}

impl VisTraceError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        VisTraceError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a compile error from a Rhai parse error
    pub fn from_parse_error(err: rhai::ParseError) -> Self {
        VisTraceError::Compile {
            line: err.position().line(),
            message: err.err_type().to_string(),
        }
    }
}

impl From<serde_json::Error> for VisTraceError {
    fn from(err: serde_json::Error) -> Self {
        VisTraceError::Serialization(err.to_string())
    }
}

/// Result type alias for vistrace operations
pub type Result<T> = std::result::Result<T, VisTraceError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VisTraceError::Advisory("service returned 503".to_string());
        assert_eq!(err.to_string(), "Advisory error: service returned 503");
    }

    #[test]
    fn test_error_with_context() {
        let err = VisTraceError::Config("missing section".to_string());
        let with_ctx = err.with_context("Failed to load config.toml");
        assert!(with_ctx.to_string().contains("Failed to load config.toml"));
        assert!(with_ctx.to_string().contains("missing section"));
    }

    #[test]
    fn test_compile_error_mentions_line() {
        let err = VisTraceError::Compile {
            message: "Expecting ';'".to_string(),
            line: Some(3),
        };
        assert_eq!(err.to_string(), "Compile error at line 3: Expecting ';'");

        let err = VisTraceError::Compile {
            message: "Unexpected end of input".to_string(),
            line: None,
        };
        assert_eq!(err.to_string(), "Compile error: Unexpected end of input");
    }

    #[test]
    fn test_result_context_is_lazy_on_success() {
        let ok: Result<u8> = Ok(7);
        let value = ok.with_context(|| panic!("context built for a success")).unwrap();
        assert_eq!(value, 7);

        let failed: Result<u8> = Err(VisTraceError::AdvisoryParse("no selection".to_string()));
        let err = failed.context("Reading advisory reply").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Reading advisory reply: Advisory reply could not be parsed: no selection"
        );
    }
}
