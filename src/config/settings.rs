//! Per-stage settings that make up an [`AnalysisConfig`](super::AnalysisConfig)
//!
//! Every field has a serde default so a partial TOML file only needs to
//! mention what it changes.
//!
//! # Main Types
//!
//! - [`TracerSettings`] - Which bindings the recorder ignores and how deep snapshots go
//! - [`ExecutionLimits`] - Engine safety limits and the wall-clock deadline
//! - [`FilterSettings`] - Denylist and conventional names for the change filter
//! - [`ClassifierSettings`] - Thresholds for the visualization decision
//! - [`AdvisorySettings`] - External advisory classifier transport
//! - [`NamePolicy`] - Exact/prefix/substring name matching shared by the above

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ==================== Name Policy ====================

/// Matches variable names by exact name, prefix or substring
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NamePolicy {
    #[serde(default)]
    pub exact: Vec<String>,
    #[serde(default)]
    pub prefixes: Vec<String>,
    #[serde(default)]
    pub substrings: Vec<String>,
}

impl NamePolicy {
    pub fn matches(&self, name: &str) -> bool {
        self.exact.iter().any(|e| e == name)
            || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
            || self.substrings.iter().any(|s| name.contains(s.as_str()))
    }
}

// ==================== Tracer ====================

/// Settings for the trace recorder and canonicalizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracerSettings {
    /// Deepest tree/value nesting a snapshot may have
    #[serde(default = "default_max_snapshot_depth")]
    pub max_snapshot_depth: usize,

    /// Bindings never considered for recognition (loop counters, scratch names)
    #[serde(default = "default_ignored_variables")]
    pub ignored_variables: NamePolicy,
}

fn default_ignored_variables() -> NamePolicy {
    NamePolicy {
        exact: strings(&[
            "i", "j", "k", "x", "y", "z", "temp", "tmp", "count", "index", "key", "value", "len",
            "sum", "max", "min", "enumerate", "zip", "map", "filter", "range", "args", "kwargs",
            "self", "cls", "this",
        ]),
        prefixes: strings(&["_"]),
        substrings: Vec::new(),
    }
}

fn default_max_snapshot_depth() -> usize {
    64
}

impl Default for TracerSettings {
    fn default() -> Self {
        Self {
            max_snapshot_depth: default_max_snapshot_depth(),
            ignored_variables: default_ignored_variables(),
        }
    }
}

// ==================== Execution Limits ====================

/// Safety limits applied to every traced run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Maximum number of engine operations (0 = unlimited)
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,

    /// Maximum script function call depth
    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,

    /// Maximum expression nesting depth
    #[serde(default = "default_max_expr_depth")]
    pub max_expr_depth: usize,

    /// Maximum length of any string value
    #[serde(default = "default_max_string_size")]
    pub max_string_size: usize,

    /// Maximum length of any array
    #[serde(default = "default_max_collection_size")]
    pub max_array_size: usize,

    /// Maximum number of properties of any object map
    #[serde(default = "default_max_collection_size")]
    pub max_map_size: usize,

    /// Wall-clock deadline for one run in milliseconds (0 = none)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_operations() -> u64 {
    2_000_000
}

fn default_max_call_levels() -> usize {
    64
}

fn default_max_expr_depth() -> usize {
    64
}

fn default_max_string_size() -> usize {
    100_000
}

fn default_max_collection_size() -> usize {
    10_000
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl ExecutionLimits {
    /// Deadline as a duration, if one is configured
    pub fn deadline(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_operations: default_max_operations(),
            max_call_levels: default_max_call_levels(),
            max_expr_depth: default_max_expr_depth(),
            max_string_size: default_max_string_size(),
            max_array_size: default_max_collection_size(),
            max_map_size: default_max_collection_size(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

// ==================== Change Filter ====================

/// Names the change filter treats specially
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Tree variable that is always important
    #[serde(default = "default_tree_root_name")]
    pub tree_root_name: String,

    /// Traversal names allowed for trees even though they are denylisted
    #[serde(default = "default_tree_local_names")]
    pub tree_local_names: Vec<String>,

    /// Graph variable that is always important
    #[serde(default = "default_graph_container_name")]
    pub graph_container_name: String,

    /// Internal/iteration-style names dropped unless they carry a kept operation
    #[serde(default = "default_denylist")]
    pub denylist: NamePolicy,
}

fn default_denylist() -> NamePolicy {
    NamePolicy {
        exact: strings(&[
            "node",
            "result",
            "return_value",
            "event_data",
            "current",
            "temp_node",
            "child",
        ]),
        prefixes: strings(&["obj"]),
        substrings: strings(&["serialized"]),
    }
}

fn default_tree_root_name() -> String {
    "root".to_string()
}

fn default_tree_local_names() -> Vec<String> {
    strings(&["node", "current", "temp_node", "child"])
}

fn default_graph_container_name() -> String {
    "graph".to_string()
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            tree_root_name: default_tree_root_name(),
            tree_local_names: default_tree_local_names(),
            graph_container_name: default_graph_container_name(),
            denylist: default_denylist(),
        }
    }
}

// ==================== Visualization Classifier ====================

/// Thresholds for the deterministic visualization decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Graph density above which the matrix view is chosen
    #[serde(default = "default_density_threshold")]
    pub density_threshold: f64,

    /// Out-degree above which the matrix view is chosen
    #[serde(default = "default_max_out_degree")]
    pub max_out_degree: usize,

    /// Names that never count as a distinct sequence
    #[serde(default = "default_reserved_names")]
    pub reserved_sequence_names: NamePolicy,
}

fn default_density_threshold() -> f64 {
    0.25
}

fn default_max_out_degree() -> usize {
    3
}

fn default_reserved_names() -> NamePolicy {
    NamePolicy {
        exact: strings(&["node", "result", "return_value", "event_data"]),
        prefixes: strings(&["obj"]),
        substrings: strings(&["serialized"]),
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            density_threshold: default_density_threshold(),
            max_out_degree: default_max_out_degree(),
            reserved_sequence_names: default_reserved_names(),
        }
    }
}

// ==================== Advisory Classifier ====================

/// Transport settings for the advisory classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisorySettings {
    /// Whether the advisory classifier is consulted at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Chat completions endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model name sent with each request
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Longest snapshot excerpt embedded in a prompt
    #[serde(default = "default_max_excerpt_chars")]
    pub max_excerpt_chars: usize,
}

fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    "https://api.mistral.ai/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "mistral-small-latest".to_string()
}

fn default_api_key_env() -> String {
    "MISTRAL_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_max_excerpt_chars() -> usize {
    4_000
}

impl AdvisorySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for AdvisorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_excerpt_chars: default_max_excerpt_chars(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_policy_matching() {
        let policy = default_denylist();
        assert!(policy.matches("node"));
        assert!(policy.matches("obj_cache"));
        assert!(policy.matches("tree_serialized"));
        assert!(!policy.matches("nodes"));
        assert!(!policy.matches("root"));
        assert!(!policy.matches("value"));
    }

    #[test]
    fn test_ignored_variables_cover_loop_counters() {
        let settings = TracerSettings::default();
        assert!(settings.ignored_variables.matches("i"));
        assert!(settings.ignored_variables.matches("_hidden"));
        assert!(!settings.ignored_variables.matches("arr"));
    }

    #[test]
    fn test_limits_deadline() {
        let mut limits = ExecutionLimits::default();
        assert_eq!(limits.deadline(), Some(Duration::from_millis(5_000)));
        limits.timeout_ms = 0;
        assert_eq!(limits.deadline(), None);
    }
}
