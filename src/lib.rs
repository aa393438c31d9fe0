//! # vistrace: data-structure tracing for Rhai scripts
//!
//! Runs a script under an execution hook, records how its sequences, trees
//! and graphs evolve, keeps the meaningful states and picks a visualization
//! for each structure family.
//!
//! ## Architecture
//!
//! - **Tracer**: per-run Rhai engine with a debugger hook, shape probing,
//!   regex operation classification and canonical snapshots
//! - **Session**: the change-detecting trace recorder and the trace log types
//! - **Analysis**: change filter, visualization classifier, advisory
//!   confirmation and batch runs on worker threads
//! - **Scripting**: engine setup, safety limits and the wall-clock deadline
//!
//! ## Configuration
//!
//! Settings are read from `config.toml` in the platform config directory
//! under `vistrace`; the last analysis is kept in the data directory:
//!
//! - **Linux**: `~/.config/vistrace/`, `~/.local/share/vistrace/`
//! - **macOS**: `~/Library/Application Support/vistrace/`
//! - **Windows**: `%APPDATA%\vistrace\`
//!
//! ## Example
//!
//! ```no_run
//! use vistrace::{AnalysisConfig, Analyzer};
//!
//! let analyzer = Analyzer::new(AnalysisConfig::load_or_default(None));
//! let report = analyzer.analyze("let arr = [5, 10, 15];\narr.push(20);\n");
//!
//! if let Some(decision) = &report.visualizations.sequences {
//!     println!("{} ({})", decision.visualization_type, decision.rationale);
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod scripting;
pub mod session;
pub mod tracer;
pub mod types;

// Re-export commonly used types
pub use analysis::{AnalysisReport, Analyzer, ClassificationDecision, VisualizationType};
pub use config::AnalysisConfig;
pub use error::{Result, VisTraceError};
pub use scripting::{ExecutionFault, FaultKind, ScriptEngine};
pub use session::{TraceEvent, TraceLog};
pub use tracer::{TraceRun, Tracer};
pub use types::{OperationTag, SourceLocation, StructureFamily};
