//! Tracing of script runs
//!
//! A [`Tracer`] executes a script on a fresh [`ScriptEngine`] with the trace
//! hook attached and returns whatever the recorder saw, even when the script
//! fails part way.
//!
//! - [`shape`] recognizes sequences, tree nodes and graphs
//! - [`operation`] infers what a source line did to a variable
//! - [`snapshot`] turns runtime values into canonical JSON snapshots
//! - [`hook`] folds debugger steps into line, call and return events

pub mod hook;
pub mod operation;
pub mod shape;
pub mod snapshot;

pub use hook::{HookState, SharedHookState};
pub use operation::{OperationClassifier, PatternClassifier};
pub use shape::{Recognizer, Shape, ShapeProbe};
pub use snapshot::{Canonicalizer, GraphSnapshot, SnapshotError, StructureSnapshot, TreeSnapshot};

use rhai::Scope;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::{ExecutionLimits, TracerSettings};
use crate::scripting::{ExecutionFault, FaultKind, ScriptEngine};
use crate::session::recorder::TraceRecorder;
use crate::session::types::{CodeListing, TraceLog};

/// Counters describing one traced run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Bindings recognized as a structure across all scans
    pub recognized: usize,
    /// Events written to the log
    pub recorded: usize,
    /// Values that could not be canonicalized
    pub dropped_values: usize,
    /// Internal hook failures that were swallowed
    pub hook_faults: usize,
    pub duration_ms: u64,
}

/// Result of tracing one script
#[derive(Debug, Clone)]
pub struct TraceRun {
    pub log: TraceLog,
    pub fault: Option<ExecutionFault>,
    pub stats: RunStats,
}

impl TraceRun {
    fn failed(code: CodeListing, fault: ExecutionFault, started: Instant) -> Self {
        Self {
            log: TraceLog::new(code, Default::default()),
            fault: Some(fault),
            stats: RunStats {
                duration_ms: started.elapsed().as_millis() as u64,
                ..Default::default()
            },
        }
    }

    pub fn succeeded(&self) -> bool {
        self.fault.is_none()
    }
}

/// Runs scripts under the trace hook
#[derive(Debug, Clone, Default)]
pub struct Tracer {
    settings: TracerSettings,
    limits: ExecutionLimits,
}

impl Tracer {
    pub fn new(settings: TracerSettings, limits: ExecutionLimits) -> Self {
        Self { settings, limits }
    }

    /// Trace a script from start to finish
    pub fn trace(&self, source: &str) -> TraceRun {
        let started = Instant::now();
        let code = CodeListing::new(source);

        let mut engine = ScriptEngine::new(&self.limits);
        let ast = match engine.compile(source) {
            Ok(ast) => ast,
            Err(err) => {
                tracing::warn!("Script did not compile: {}", err);
                return TraceRun::failed(code, ExecutionFault::from_error(&err), started);
            }
        };

        let recorder = TraceRecorder::new(code.clone(), &self.settings);
        let state: SharedHookState = Arc::new(Mutex::new(HookState::new(recorder)));
        engine.install_hook(state.clone());

        let mut scope = Scope::new();
        let outcome = engine.run(&ast, &mut scope);
        drop(engine);

        let fault = outcome.err();
        if let Some(fault) = &fault {
            tracing::warn!("Traced script stopped early: {}", fault);
        }

        let hook = match Arc::try_unwrap(state) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()),
            Err(_) => {
                let fault = ExecutionFault::new(
                    FaultKind::Runtime,
                    "trace hook still registered after the run",
                    None,
                );
                return TraceRun::failed(code, fault, started);
            }
        };

        let (recorder, hook_faults) = hook.finish(&scope);
        let recorder_stats = recorder.stats();
        let stats = RunStats {
            recognized: recorder_stats.recognized,
            recorded: recorder_stats.recorded,
            dropped_values: recorder_stats.dropped_values,
            hook_faults,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::debug!(
            "Traced run: {} events, {} dropped values, {} hook faults",
            stats.recorded,
            stats.dropped_values,
            stats.hook_faults
        );

        TraceRun {
            log: recorder.into_log(),
            fault,
            stats,
        }
    }
}
