//! Common test utilities and helpers

#![allow(dead_code)]

pub mod builders;
pub mod mock_helpers;

use std::path::PathBuf;
use std::time::Duration;

use vistrace::config::AnalysisConfig;
use vistrace::Analyzer;

/// Default timeout for tests that wait on worker threads
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Helper to assert floating point values are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Path of a script under `tests/fixtures/scripts`
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("scripts")
        .join(name)
}

/// Source text of a fixture script
pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name))
        .unwrap_or_else(|e| panic!("missing fixture {}: {}", name, e))
}

/// Analyzer with defaults and no advisory classifier
pub fn offline_analyzer() -> Analyzer {
    Analyzer::new(AnalysisConfig::default())
}
