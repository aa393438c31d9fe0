//! Integration tests for configuration and persistence
//!
//! These tests validate:
//! - TOML config files changing tracer, filter and classifier behaviour
//! - Saving and reloading the config
//! - The last-analysis store

mod common;

use common::{fixture, offline_analyzer};
use vistrace::analysis::VisualizationType;
use vistrace::config::AnalysisConfig;
use vistrace::session::LastAnalysisStore;
use vistrace::Analyzer;

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vistrace").join("config.toml");

    let mut config = AnalysisConfig::default();
    config.classifier.density_threshold = 0.75;
    config.limits.max_operations = 1234;
    config.advisory.enabled = false;
    config.save(&path).unwrap();

    let loaded = AnalysisConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(AnalysisConfig::load_or_default(Some(path.as_path())), config);
}

#[test]
fn test_broken_config_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[classifier\ndensity_threshold = ").unwrap();

    assert!(AnalysisConfig::load(&path).is_err());
    assert_eq!(
        AnalysisConfig::load_or_default(Some(path.as_path())),
        AnalysisConfig::default()
    );
}

#[test]
fn test_thresholds_change_graph_decision() {
    let config = AnalysisConfig::from_toml(
        r#"
[classifier]
density_threshold = 0.6
max_out_degree = 5
"#,
    )
    .unwrap();

    let source = fixture("dense_graph.rhai");
    let relaxed = Analyzer::new(config).analyze(&source);
    assert_eq!(
        relaxed.visualizations.graphs.as_ref().unwrap().visualization_type,
        VisualizationType::ForceDirected
    );

    let strict = offline_analyzer().analyze(&source);
    assert_eq!(
        strict.visualizations.graphs.as_ref().unwrap().visualization_type,
        VisualizationType::AdjacencyMatrix
    );
}

#[test]
fn test_ignored_names_are_not_traced() {
    let config = AnalysisConfig::from_toml(
        r#"
[tracer.ignored_variables]
exact = ["b"]
"#,
    )
    .unwrap();

    let report = Analyzer::new(config).analyze(&fixture("two_arrays.rhai"));
    assert!(report
        .data_structures
        .sequences
        .iter()
        .all(|e| e.variable_name == "a"));
    assert_ne!(
        report.visualizations.sequences.as_ref().unwrap().visualization_type,
        VisualizationType::ArrayComparison
    );
}

#[test]
fn test_denylisted_locals_are_dropped() {
    let source = r#"fn make() { [1, 2] }
fn work() {
    let result = make();
    result
}
let done = work();
"#;

    let run = offline_analyzer().trace(source);
    assert!(run
        .log
        .data_structures
        .sequences
        .iter()
        .any(|e| e.variable_name == "result"));

    let report = offline_analyzer().analyze(source);
    let names: Vec<&str> = report
        .data_structures
        .sequences
        .iter()
        .map(|e| e.variable_name.as_str())
        .collect();
    assert!(!names.contains(&"result"), "{:?}", names);
    assert!(names.contains(&"done"));

    let config = AnalysisConfig::from_toml("[filter.denylist]\nexact = []\n").unwrap();
    let report = Analyzer::new(config).analyze(source);
    assert!(report
        .data_structures
        .sequences
        .iter()
        .any(|e| e.variable_name == "result"));
}

#[test]
fn test_last_analysis_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = LastAnalysisStore::new(dir.path().join("last_analysis.json"));
    assert!(store.load().unwrap().is_none());

    let first = offline_analyzer().analyze(&fixture("array_ops.rhai"));
    store.save(&first).unwrap();
    let second = offline_analyzer().analyze(&fixture("sparse_graph.rhai"));
    store.save(&second).unwrap();

    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded.code, second.code);
    assert_eq!(loaded.visualizations, second.visualizations);
    assert!(loaded.visualizations.sequences.is_none());
}
