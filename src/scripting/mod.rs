//! Rhai engine hosting traced scripts
//!
//! Scripts are plain Rhai. Besides the standard library the engine registers
//! two constructors for the node shapes the tracer recognizes:
//!
//! - `binary_node(v)` - `#{value: v, left: (), right: ()}`
//! - `tree_node(v)` - `#{value: v, children: []}`
//!
//! `print` and `debug` output goes to the `vistrace::script` tracing target.
//!
//! ## Example Script
//!
//! ```rhai
//! let arr = [5, 10, 15];
//! arr.push(20);
//!
//! let root = binary_node(10);
//! root.left = binary_node(5);
//!
//! let graph = #{ A: ["B"], B: [] };
//! graph.A.push("C");
//! ```

mod engine;

pub use engine::ScriptEngine;

use rhai::EvalAltResult;
use serde::{Deserialize, Serialize};

use crate::error::VisTraceError;

/// How a run ended abnormally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// The script did not parse
    Compile,
    /// The script raised an error while running
    Runtime,
    /// A safety limit or the deadline stopped the script
    Terminated,
}

/// Abnormal end of a traced script, reported next to the partial log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFault {
    pub kind: FaultKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl ExecutionFault {
    pub fn new(kind: FaultKind, message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            kind,
            message: message.into(),
            line,
        }
    }

    /// Classify a Rhai evaluation error
    pub fn from_eval(err: &EvalAltResult) -> Self {
        let kind = match err {
            EvalAltResult::ErrorTerminated(..)
            | EvalAltResult::ErrorTooManyOperations(..)
            | EvalAltResult::ErrorStackOverflow(..)
            | EvalAltResult::ErrorDataTooLarge(..) => FaultKind::Terminated,
            _ => FaultKind::Runtime,
        };
        Self::new(kind, err.to_string(), err.position().line())
    }

    pub fn from_error(err: &VisTraceError) -> Self {
        match err {
            VisTraceError::Compile { message, line } => {
                Self::new(FaultKind::Compile, message.clone(), *line)
            }
            other => Self::new(FaultKind::Runtime, other.to_string(), None),
        }
    }
}

impl std::fmt::Display for ExecutionFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            FaultKind::Compile => "compile",
            FaultKind::Runtime => "runtime",
            FaultKind::Terminated => "terminated",
        };
        match self.line {
            Some(line) => write!(f, "{} fault at line {}: {}", kind, line, self.message),
            None => write!(f, "{} fault: {}", kind, self.message),
        }
    }
}
