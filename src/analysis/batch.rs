//! Batch analysis on worker threads
//!
//! Jobs go out over one channel and reports come back over another. Every
//! script gets its own engine, recorder and filter state; only the
//! [`Analyzer`] configuration is shared.

use crossbeam_channel::unbounded;
use std::path::Path;
use std::thread;

use crate::error::{Result, ResultExt, VisTraceError};

use super::{AnalysisReport, Analyzer};

/// One script to analyse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    /// Shown in logs and results, usually the file path
    pub label: String,
    pub source: String,
}

impl BatchJob {
    pub fn new(label: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(VisTraceError::from)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self::new(path.display().to_string(), source))
    }
}

/// Report for one job
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub label: String,
    pub report: AnalysisReport,
}

/// Analyse every job on up to `workers` threads; results keep job order
pub fn analyze_batch(analyzer: &Analyzer, jobs: Vec<BatchJob>, workers: usize) -> Vec<BatchOutcome> {
    let total = jobs.len();
    if total == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, total);

    let (job_tx, job_rx) = unbounded::<(usize, BatchJob)>();
    let (result_tx, result_rx) = unbounded::<(usize, BatchOutcome)>();
    for job in jobs.into_iter().enumerate() {
        // Receivers live until the scope ends
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    tracing::info!("Analysing {} scripts on {} workers", total, workers);
    thread::scope(|scope| {
        for worker in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for (index, job) in job_rx.iter() {
                    tracing::debug!("Worker {} analysing {}", worker, job.label);
                    let report = analyzer.analyze(&job.source);
                    let outcome = BatchOutcome {
                        label: job.label,
                        report,
                    };
                    if result_tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    let mut results: Vec<(usize, BatchOutcome)> = result_rx.iter().collect();
    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, outcome)| outcome).collect()
}
