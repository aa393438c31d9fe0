//! Analysis pipeline
//!
//! An [`Analyzer`] traces a script, filters the raw events and makes one
//! visualization decision per family:
//!
//! - [`filter`] - two-pass change filter
//! - [`classify`] - deterministic visualization rules
//! - [`advisory`] - optional confirmation by an external classifier
//! - [`mistral`] - HTTP transport for the advisory classifier
//! - [`batch`] - several scripts on worker threads

pub mod advisory;
pub mod batch;
pub mod classify;
pub mod filter;
pub mod mistral;

pub use advisory::{AdvisoryClassifier, AdvisoryRequest, AdvisoryStatus};
pub use batch::{analyze_batch, BatchJob, BatchOutcome};
pub use classify::{
    ClassificationDecision, GraphMetrics, VisualizationClassifier, VisualizationType, Visualizations,
};
pub use filter::ChangeFilter;
pub use mistral::MistralAdvisor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

use crate::config::AnalysisConfig;
use crate::error::{Result, VisTraceError};
use crate::scripting::ExecutionFault;
use crate::session::types::{CodeListing, FamilyCounts, FamilyEvents, TraceLog};
use crate::tracer::{TraceRun, Tracer};

/// Counters for one analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnalysisStats {
    /// Events recorded before filtering
    pub raw: FamilyCounts,
    /// Events left after filtering
    pub filtered: FamilyCounts,
    pub dropped_values: usize,
    pub hook_faults: usize,
    pub duration_ms: u64,
}

/// Everything produced for one script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub analyzed_at: DateTime<Utc>,
    pub code: CodeListing,
    /// Filtered events
    pub data_structures: FamilyEvents,
    pub visualizations: Visualizations,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionFault>,
    pub stats: AnalysisStats,
}

impl AnalysisReport {
    /// Filtered output document
    pub fn trace_log(&self) -> TraceLog {
        TraceLog::new(self.code.clone(), self.data_structures.clone())
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| VisTraceError::Serialization(format!("{:?}: {}", path, e)))
    }
}

/// Trace, filter and classify scripts with one configuration
pub struct Analyzer {
    config: AnalysisConfig,
    tracer: Tracer,
    filter: ChangeFilter,
    classifier: VisualizationClassifier,
    advisor: Option<Box<dyn AdvisoryClassifier>>,
}

impl Analyzer {
    /// Create an analyzer without an advisory classifier
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            tracer: Tracer::new(config.tracer.clone(), config.limits.clone()),
            filter: ChangeFilter::new(config.filter.clone()),
            classifier: VisualizationClassifier::new(config.classifier.clone()),
            advisor: None,
            config,
        }
    }

    /// Create an analyzer with the Mistral advisor when advisory is enabled
    pub fn from_config(config: AnalysisConfig) -> Result<Self> {
        let advisor = if config.advisory.enabled {
            Some(MistralAdvisor::from_env(&config.advisory)?)
        } else {
            None
        };
        let analyzer = Self::new(config);
        Ok(match advisor {
            Some(advisor) => analyzer.with_advisor(Box::new(advisor)),
            None => analyzer,
        })
    }

    pub fn with_advisor(mut self, advisor: Box<dyn AdvisoryClassifier>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn without_advisor(mut self) -> Self {
        self.advisor = None;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn has_advisor(&self) -> bool {
        self.advisor.is_some()
    }

    /// Trace a script without filtering or classification
    pub fn trace(&self, source: &str) -> TraceRun {
        self.tracer.trace(source)
    }

    /// Run the whole pipeline on a script
    pub fn analyze(&self, source: &str) -> AnalysisReport {
        let started = Instant::now();
        let analyzed_at = Utc::now();

        let run = self.tracer.trace(source);
        let raw = run.log.data_structures.counts();
        let filtered = self.filter.filter(&run.log.data_structures);
        let visualizations = self.classify(&filtered);

        let stats = AnalysisStats {
            raw,
            filtered: filtered.counts(),
            dropped_values: run.stats.dropped_values,
            hook_faults: run.stats.hook_faults,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            "Analysis finished in {} ms: {} raw events, {} kept{}",
            stats.duration_ms,
            stats.raw.total(),
            stats.filtered.total(),
            run.fault
                .as_ref()
                .map(|f| format!(", {}", f))
                .unwrap_or_default()
        );

        AnalysisReport {
            analyzed_at,
            code: run.log.code,
            data_structures: filtered,
            visualizations,
            error: run.fault,
            stats,
        }
    }

    /// Decide a visualization for every family with events
    pub fn classify(&self, events: &FamilyEvents) -> Visualizations {
        let mut visualizations = Visualizations::default();
        for classification in self.classifier.classify_all(events) {
            let family = classification.family;
            let decision = match &self.advisor {
                Some(advisor) => {
                    let request =
                        AdvisoryRequest::new(&classification, self.config.advisory.max_excerpt_chars);
                    tracing::debug!("Consulting {} about {}", advisor.name(), family);
                    advisory::reconcile(classification.decision, advisor.consult(&request))
                }
                None => classification.decision,
            };
            visualizations.set(family, decision);
        }
        visualizations
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("config", &self.config)
            .field("advisor", &self.advisor.as_ref().map(|a| a.name()))
            .finish()
    }
}
