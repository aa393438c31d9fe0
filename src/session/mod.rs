//! Trace recording and persistence
//!
//! This module turns hook events into the trace log and keeps the most
//! recent analysis on disk.
//!
//! # Features
//!
//! - Record change-detected snapshots with source line and timestamp
//! - Save and load trace logs as JSON
//! - Persist the last analysis report for the `last` command

pub mod recorder;
pub mod store;
pub mod types;

pub use recorder::{RecorderStats, RunTrackerState, TraceRecorder};
pub use store::LastAnalysisStore;
pub use types::{CodeListing, FamilyCounts, FamilyEvents, TraceEvent, TraceLog};
