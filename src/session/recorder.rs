//! Trace recorder for capturing structure changes during a run
//!
//! The recorder is driven by the execution hook. For every line, call and
//! return it scans the visible bindings, recognizes and canonicalizes the
//! structures among them, and appends an event when the state changed or
//! the operation is significant on its own.

use rhai::Dynamic;
use std::collections::HashMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::config::TracerSettings;
use crate::tracer::operation::{OperationClassifier, PatternClassifier};
use crate::tracer::shape::{Recognizer, ShapeProbe};
use crate::tracer::snapshot::{Canonicalizer, StructureSnapshot};
use crate::types::{OperationTag, StructureFamily};

use super::types::{CodeListing, FamilyEvents, TraceEvent, TraceLog};

/// Last serialized state per `(family, variable)` for one run
#[derive(Debug, Default)]
pub struct RunTrackerState {
    last_seen: HashMap<(StructureFamily, String), String>,
}

impl RunTrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest serialization, returning the previous one
    pub fn observe(
        &mut self,
        family: StructureFamily,
        name: &str,
        serialized: String,
    ) -> Option<String> {
        self.last_seen.insert((family, name.to_string()), serialized)
    }

    pub fn tracked_count(&self) -> usize {
        self.last_seen.len()
    }
}

/// Wall-clock start plus monotonic elapsed time
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    epoch_start: f64,
    started: Instant,
}

impl RunClock {
    pub fn start() -> Self {
        let epoch_start = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            epoch_start,
            started: Instant::now(),
        }
    }

    /// Seconds since the Unix epoch; never decreases within a run
    pub fn now(&self) -> f64 {
        self.epoch_start + self.started.elapsed().as_secs_f64()
    }
}

/// Counters describing one recording
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    /// Bindings recognized as a structure
    pub recognized: usize,
    /// Events appended to the log
    pub recorded: usize,
    /// Values dropped because they could not be canonicalized
    pub dropped_values: usize,
}

/// A name-to-value binding visible in the current frame
pub type Binding<'a> = (&'a str, &'a Dynamic);

/// Trace recorder for one analysis run
pub struct TraceRecorder {
    code: CodeListing,
    tracker: RunTrackerState,
    recognizer: Recognizer,
    classifier: Box<dyn OperationClassifier>,
    canonicalizer: Canonicalizer,
    clock: RunClock,
    events: FamilyEvents,
    stats: RecorderStats,
}

impl TraceRecorder {
    /// Create a recorder using the regex operation classifier
    pub fn new(code: CodeListing, settings: &TracerSettings) -> Self {
        Self::with_classifier(code, settings, Box::new(PatternClassifier::new()))
    }

    pub fn with_classifier(
        code: CodeListing,
        settings: &TracerSettings,
        classifier: Box<dyn OperationClassifier>,
    ) -> Self {
        Self {
            code,
            tracker: RunTrackerState::new(),
            recognizer: Recognizer::new(settings),
            classifier,
            canonicalizer: Canonicalizer::new(settings.max_snapshot_depth),
            clock: RunClock::start(),
            events: FamilyEvents::default(),
            stats: RecorderStats::default(),
        }
    }

    pub fn code(&self) -> &CodeListing {
        &self.code
    }

    pub fn events(&self) -> &FamilyEvents {
        &self.events
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    /// Handle a `line` event: the statement on `line` has just taken effect
    pub fn on_line(&mut self, line: usize, bindings: &[Binding<'_>]) {
        self.scan(line, bindings, None);
    }

    /// Handle a `call` event at the first line of a routine
    pub fn on_call(&mut self, line: usize, bindings: &[Binding<'_>]) {
        self.scan(line, bindings, None);
    }

    /// Handle a `return` event: record the returned value, then re-scan the
    /// frame before it is discarded
    pub fn on_return(
        &mut self,
        routine: &str,
        line: usize,
        value: Option<&Dynamic>,
        bindings: &[Binding<'_>],
    ) {
        if let Some(value) = value {
            let name = format!("{}_return", routine);
            // The synthetic name is always traced, even for `_`-prefixed routines
            if let Some(family) = value.probe_shape().family() {
                let line_text = self.code.line_text(line).to_string();
                self.capture(family, &name, value, Some(OperationTag::Return), line, &line_text);
            }
        }
        self.scan(line, bindings, None);
    }

    /// Record every recognized top-level binding as `final_state`
    pub fn finalize(&mut self, globals: &[Binding<'_>]) {
        let line = self.code.lines.len().max(1);
        self.scan(line, globals, Some(OperationTag::FinalState));
    }

    fn scan(&mut self, line: usize, bindings: &[Binding<'_>], hint: Option<OperationTag>) {
        // The end-of-run pass is not attributable to any statement
        let line_text = match hint {
            Some(OperationTag::FinalState) => String::new(),
            _ => self.code.line_text(line).to_string(),
        };
        for (name, value) in bindings {
            if let Some(family) = self.recognizer.recognize(name, value) {
                self.capture(family, name, value, hint, line, &line_text);
            }
        }
    }

    fn capture(
        &mut self,
        family: StructureFamily,
        name: &str,
        value: &Dynamic,
        hint: Option<OperationTag>,
        line: usize,
        line_text: &str,
    ) {
        self.stats.recognized += 1;
        match self.canonicalizer.canonicalize(family, value) {
            Ok(snapshot) => {
                self.record_with_text(name, snapshot, hint, line, line_text);
            }
            Err(e) => {
                self.stats.dropped_values += 1;
                tracing::debug!("Dropping {} {} at line {}: {}", family, name, line, e);
            }
        }
    }

    /// Append an event if the state changed or the operation is significant.
    /// The tracker always moves to the latest serialization.
    pub fn record(
        &mut self,
        name: &str,
        snapshot: StructureSnapshot,
        hint: Option<OperationTag>,
        line: usize,
    ) -> bool {
        let line_text = self.code.line_text(line).to_string();
        self.record_with_text(name, snapshot, hint, line, &line_text)
    }

    fn record_with_text(
        &mut self,
        name: &str,
        snapshot: StructureSnapshot,
        hint: Option<OperationTag>,
        line: usize,
        line_text: &str,
    ) -> bool {
        let family = snapshot.family();
        let operation =
            hint.unwrap_or_else(|| self.classifier.classify(line_text, name, family));

        let serialized = snapshot.canonical_json();
        let previous = self.tracker.observe(family, name, serialized.clone());
        let changed = previous.as_deref() != Some(serialized.as_str());

        if !changed && !operation.is_significant() {
            return false;
        }

        tracing::trace!("{} {} {} at line {}", family, name, operation, line);
        let event = TraceEvent::new(name, operation, snapshot, self.clock.now(), line, line_text);
        self.events.push(event);
        self.stats.recorded += 1;
        true
    }

    /// Finish the recording and produce the raw log
    pub fn into_log(self) -> TraceLog {
        TraceLog::new(self.code, self.events)
    }
}

impl std::fmt::Debug for TraceRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceRecorder")
            .field("lines", &self.code.lines.len())
            .field("tracked", &self.tracker.tracked_count())
            .field("stats", &self.stats)
            .finish()
    }
}
