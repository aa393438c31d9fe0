//! Execution hook built on the Rhai debugger interface
//!
//! Rhai reports individual statement and expression steps. [`HookState`]
//! folds them into the `line`, `call` and `return` events the recorder
//! understands:
//!
//! - a step at the same call level that lands on a new line, or revisits a
//!   position already stepped on the current line (a loop), completes the
//!   previous line at that level
//! - the first step at a deeper level is a call
//! - a function-exit event for a frame that stepped is a return; native
//!   functions never step, so their exits are ignored
//! - a level drop without an exit event closes the frame silently
//!
//! The hook never reports an error back to the engine. Panics inside the
//! recorder are caught and counted.

use regex::Regex;
use rhai::debugger::{DebuggerCommand, DebuggerEvent};
use rhai::{Dynamic, Engine, Position, Scope};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::session::recorder::{Binding, TraceRecorder};

/// Hook state shared with the engine for the duration of one run
pub type SharedHookState = Arc<Mutex<HookState>>;

/// Script function names and the lines that declare them
#[derive(Debug, Clone, Default)]
pub struct RoutineIndex {
    headers: Vec<(usize, String)>,
    call_site: Option<Regex>,
}

impl RoutineIndex {
    pub fn new(source: &str) -> Self {
        let header = Regex::new(r"^\s*(?:private\s+)?fn\s+([A-Za-z_]\w*)\s*\(").ok();
        let headers: Vec<(usize, String)> = match header {
            Some(header) => source
                .lines()
                .enumerate()
                .filter_map(|(i, line)| header.captures(line).map(|c| (i + 1, c[1].to_string())))
                .collect(),
            None => Vec::new(),
        };

        let mut names: Vec<&str> = headers.iter().map(|(_, name)| name.as_str()).collect();
        names.sort_by_key(|name| std::cmp::Reverse(name.len()));
        names.dedup();
        let call_site = (!names.is_empty())
            .then(|| {
                let alternation = names
                    .iter()
                    .map(|n| regex::escape(n))
                    .collect::<Vec<_>>()
                    .join("|");
                Regex::new(&format!(r"(?:^|\W)({})\s*\(", alternation)).ok()
            })
            .flatten();

        Self { headers, call_site }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.headers.iter().map(|(_, name)| name.as_str())
    }

    /// Leftmost script function called on a line
    pub fn called_on(&self, line_text: &str) -> Option<&str> {
        let captures = self.call_site.as_ref()?.captures(line_text)?;
        let name = captures.get(1)?.as_str();
        self.names().find(|n| *n == name)
    }

    /// Function whose header is the nearest one at or above `line`
    pub fn enclosing(&self, line: usize) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(header_line, _)| *header_line <= line)
            .map(|(_, name)| name.as_str())
    }
}

#[derive(Debug, Clone)]
struct FrameCursor {
    level: usize,
    routine: String,
    /// Line of the statement currently executing at this level
    current_line: Option<usize>,
    /// Columns stepped on `current_line` since it was entered
    visited: HashSet<usize>,
}

impl FrameCursor {
    fn new(level: usize, routine: impl Into<String>) -> Self {
        Self {
            level,
            routine: routine.into(),
            current_line: None,
            visited: HashSet::new(),
        }
    }

    /// Move to `(line, column)`, returning the line this step completes
    fn advance(&mut self, line: usize, column: usize) -> Option<usize> {
        if self.current_line == Some(line) && self.visited.insert(column) {
            return None;
        }
        self.visited.clear();
        self.visited.insert(column);
        self.current_line.replace(line)
    }
}

/// Step-to-event state machine feeding a [`TraceRecorder`]
#[derive(Debug)]
pub struct HookState {
    recorder: TraceRecorder,
    routines: RoutineIndex,
    frames: Vec<FrameCursor>,
    hook_faults: usize,
}

impl HookState {
    pub fn new(recorder: TraceRecorder) -> Self {
        let routines = RoutineIndex::new(&recorder.code().source);
        Self {
            recorder,
            routines,
            frames: vec![FrameCursor::new(0, "main")],
            hook_faults: 0,
        }
    }

    pub fn recorder(&self) -> &TraceRecorder {
        &self.recorder
    }

    pub fn hook_faults(&self) -> usize {
        self.hook_faults
    }

    /// Current call depth as seen by the hook
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Handle a statement or expression step at `level`
    pub fn on_step(&mut self, level: usize, pos: Position, scope: &Scope) {
        let Some(line) = pos.line() else {
            return;
        };
        let column = pos.position().unwrap_or(0);

        self.close_frames_above(level);

        let at_level = self.frames.last().is_some_and(|top| top.level == level);
        if !at_level {
            let routine = self.resolve_routine(line);
            tracing::trace!("call {} at line {} (level {})", routine, line, level);
            let mut frame = FrameCursor::new(level, routine);
            frame.advance(line, column);
            self.frames.push(frame);
            self.recorder.on_call(line, &visible_bindings(scope));
            return;
        }

        // Sub-expressions of one statement step at their own columns, often
        // left of the statement's position; only a revisit is a new pass.
        let completed = self.frames.last_mut().and_then(|top| top.advance(line, column));
        if let Some(completed) = completed {
            self.recorder.on_line(completed, &visible_bindings(scope));
        }
    }

    /// Handle a function exit at `level`
    pub fn on_exit(&mut self, level: usize, value: Option<&Dynamic>, pos: Position, scope: &Scope) {
        if level == 0 {
            return;
        }
        self.close_frames_above(level);

        if !self.frames.last().is_some_and(|top| top.level == level) {
            tracing::trace!("exit at level {} without a script frame ignored", level);
            return;
        }
        if let Some(frame) = self.frames.pop() {
            let line = frame.current_line.or(pos.line()).unwrap_or(0);
            tracing::trace!("return from {} at line {}", frame.routine, line);
            self.recorder.on_return(&frame.routine, line, value, &visible_bindings(scope));
        }
    }

    /// Flush the top-level frame and record the final state of the globals
    pub fn finish(mut self, scope: &Scope) -> (TraceRecorder, usize) {
        self.frames.truncate(1);
        let globals = visible_bindings(scope);
        if let Some(line) = self.frames.first().and_then(|top| top.current_line) {
            self.recorder.on_line(line, &globals);
        }
        self.recorder.finalize(&globals);
        (self.recorder, self.hook_faults)
    }

    fn close_frames_above(&mut self, level: usize) {
        while self.frames.len() > 1 && self.frames.last().is_some_and(|top| top.level > level) {
            if let Some(frame) = self.frames.pop() {
                tracing::trace!("frame {} closed without exit event", frame.routine);
            }
        }
    }

    fn resolve_routine(&self, callee_line: usize) -> String {
        let caller_line = self.frames.last().and_then(|f| f.current_line);
        if let Some(caller_line) = caller_line {
            let text = self.recorder.code().line_text(caller_line);
            if let Some(name) = self.routines.called_on(text) {
                return name.to_string();
            }
            if caller_line == callee_line {
                // Inline closure on the calling line
                return "anonymous".to_string();
            }
        }
        self.routines
            .enclosing(callee_line)
            .unwrap_or("anonymous")
            .to_string()
    }
}

/// Bindings visible in a scope, in declaration order; a shadowed name
/// resolves to its latest binding
pub fn visible_bindings<'s>(scope: &'s Scope<'_>) -> Vec<Binding<'s>> {
    // iter_raw yields the newest binding first
    let mut seen = HashSet::new();
    let mut visible: Vec<Binding<'s>> = scope
        .iter_raw()
        .map(|(name, _constant, value)| (name, value))
        .filter(|(name, _)| seen.insert(*name))
        .collect();
    visible.reverse();
    visible
}

/// Register the hook on an engine. It stays registered for the engine's
/// lifetime, so each run uses its own engine.
#[allow(deprecated)]
pub fn install(engine: &mut Engine, state: SharedHookState) {
    engine.register_debugger(
        |_engine, debugger| debugger,
        move |context, event, _node, _source, pos| {
            let level = context.call_level();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                let mut hook = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                match event {
                    DebuggerEvent::Step => hook.on_step(level, pos, context.scope()),
                    DebuggerEvent::FunctionExitWithValue(value) => {
                        hook.on_exit(level, Some(value), pos, context.scope())
                    }
                    DebuggerEvent::FunctionExitWithError(_) => {
                        hook.on_exit(level, None, pos, context.scope())
                    }
                    _ => {}
                }
            }));

            if outcome.is_err() {
                tracing::warn!("Trace hook fault at {:?}; event skipped", pos);
                let mut hook = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                hook.hook_faults += 1;
            }
            Ok(DebuggerCommand::StepInto)
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TracerSettings;
    use crate::session::types::CodeListing;
    use crate::types::OperationTag;
    use rhai::{Array, INT};

    const SCRIPT: &str = r#"fn build(n) {
    let items = [];
    items.push(n);
    items
}
let arr = [5, 10, 15];
arr.push(20);
let made = build(3);
"#;

    fn ints(items: &[INT]) -> Dynamic {
        Dynamic::from_array(items.iter().map(|&i| Dynamic::from(i)).collect::<Array>())
    }

    fn state() -> HookState {
        let recorder = TraceRecorder::new(CodeListing::new(SCRIPT), &TracerSettings::default());
        HookState::new(recorder)
    }

    fn at(line: usize, column: usize) -> Position {
        Position::new(line as u16, column as u16)
    }

    #[test]
    fn test_routine_index() {
        let index = RoutineIndex::new(SCRIPT);
        assert_eq!(index.names().collect::<Vec<_>>(), vec!["build"]);
        assert_eq!(index.called_on("let made = build(3);"), Some("build"));
        assert_eq!(index.called_on("let made = rebuild(3);"), None);
        assert_eq!(index.enclosing(3), Some("build"));
        assert_eq!(RoutineIndex::new("let a = 1;").enclosing(1), None);
    }

    #[test]
    fn test_line_events_attribute_previous_statement() {
        let mut hook = state();
        let mut scope = Scope::new();

        hook.on_step(0, at(6, 1), &scope);
        scope.push("arr", ints(&[5, 10, 15]));
        hook.on_step(0, at(7, 1), &scope);
        hook.on_step(0, at(7, 5), &scope);
        scope.set_value("arr", ints(&[5, 10, 15, 20]));
        hook.on_step(0, at(8, 1), &scope);

        let events = &hook.recorder().events().sequences;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].operation, OperationTag::Create);
        assert_eq!(events[0].source_location.line, 6);
        assert_eq!(events[1].operation, OperationTag::Append);
        assert_eq!(events[1].source_location.line, 7);
    }

    #[test]
    fn test_call_and_return() {
        let mut hook = state();
        let mut globals = Scope::new();
        globals.push("arr", ints(&[5, 10, 15, 20]));
        hook.on_step(0, at(8, 1), &globals);

        let mut frame = Scope::new();
        frame.push("n", 3 as INT);
        hook.on_step(1, at(2, 5), &frame);
        assert_eq!(hook.depth(), 2);

        frame.push("items", ints(&[]));
        hook.on_step(1, at(3, 5), &frame);
        frame.set_value("items", ints(&[3]));
        hook.on_step(1, at(4, 5), &frame);
        hook.on_exit(1, Some(&ints(&[3])), at(1, 1), &frame);
        assert_eq!(hook.depth(), 1);

        let names: Vec<(&str, OperationTag)> = hook
            .recorder()
            .events()
            .sequences
            .iter()
            .map(|e| (e.variable_name.as_str(), e.operation))
            .collect();
        assert!(names.contains(&("items", OperationTag::Create)));
        assert!(names.contains(&("items", OperationTag::Append)));
        assert!(names.contains(&("build_return", OperationTag::Return)));
    }

    #[test]
    fn test_level_drop_without_exit_closes_frame() {
        let mut hook = state();
        let scope = Scope::new();
        hook.on_step(0, at(8, 1), &scope);
        hook.on_step(1, at(2, 5), &scope);
        hook.on_step(2, at(2, 5), &scope);
        assert_eq!(hook.depth(), 3);
        hook.on_step(0, at(9, 1), &scope);
        assert_eq!(hook.depth(), 1);
    }

    #[test]
    fn test_loop_iteration_on_same_line_is_a_new_line_event() {
        let mut hook = state();
        let mut scope = Scope::new();
        scope.push("arr", ints(&[1]));
        hook.on_step(0, at(7, 1), &scope);
        hook.on_step(0, at(7, 9), &scope);
        scope.set_value("arr", ints(&[1, 2]));
        hook.on_step(0, at(7, 1), &scope);

        let events = &hook.recorder().events().sequences;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source_location.line, 7);
    }

    #[test]
    fn test_sub_expression_steps_do_not_split_a_statement() {
        let mut hook = state();
        let mut scope = Scope::new();
        hook.on_step(0, at(6, 1), &scope);
        scope.push("arr", ints(&[5, 10, 15]));

        // `arr.push(20)` steps the dot first, then its receiver to the left
        hook.on_step(0, at(7, 4), &scope);
        hook.on_step(0, at(7, 1), &scope);
        hook.on_step(0, at(7, 5), &scope);
        hook.on_step(0, at(7, 10), &scope);
        scope.set_value("arr", ints(&[5, 10, 15, 20]));
        hook.on_step(0, at(8, 1), &scope);

        let events = &hook.recorder().events().sequences;
        let appends: Vec<String> = events
            .iter()
            .filter(|e| e.operation == OperationTag::Append)
            .map(|e| e.snapshot.canonical_json())
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(appends, vec!["[5,10,15,20]"]);
    }

    #[test]
    fn test_single_line_while_loop_completes_each_pass() {
        let mut hook = state();
        let mut scope = Scope::new();
        scope.push("arr", ints(&[]));
        hook.on_step(0, at(7, 1), &scope);
        for pass in 1..=3 {
            hook.on_step(0, at(7, 7), &scope);
            hook.on_step(0, at(7, 18), &scope);
            hook.on_step(0, at(7, 15), &scope);
            let items: Vec<INT> = (1..=pass).collect();
            scope.set_value("arr", ints(&items));
        }

        let events = &hook.recorder().events().sequences;
        let states: Vec<String> = events.iter().map(|e| e.snapshot.canonical_json()).collect();
        assert_eq!(states, vec!["[1]", "[1,2]"]);
    }

    #[test]
    fn test_exit_without_script_frame_is_ignored() {
        let mut hook = state();
        let scope = Scope::new();
        hook.on_step(0, at(6, 1), &scope);

        // A native constructor exits one level down without stepping
        let mut node = rhai::Map::new();
        node.insert("value".into(), Dynamic::from(10 as INT));
        node.insert("left".into(), Dynamic::UNIT);
        node.insert("right".into(), Dynamic::UNIT);
        hook.on_exit(1, Some(&Dynamic::from_map(node)), at(6, 12), &scope);

        assert_eq!(hook.depth(), 1);
        assert!(hook.recorder().events().is_empty());
    }

    #[test]
    fn test_finish_records_final_state() {
        let mut hook = state();
        let mut scope = Scope::new();
        hook.on_step(0, at(6, 1), &scope);
        scope.push("arr", ints(&[5, 10, 15]));
        let (recorder, faults) = hook.finish(&scope);

        assert_eq!(faults, 0);
        let ops: Vec<OperationTag> = recorder
            .events()
            .sequences
            .iter()
            .map(|e| e.operation)
            .collect();
        assert_eq!(ops, vec![OperationTag::Create, OperationTag::FinalState]);
    }

    #[test]
    fn test_shadowed_names_resolve_to_latest() {
        let mut scope = Scope::new();
        scope.push("a", 1 as INT);
        scope.push("b", 2 as INT);
        scope.push("a", 3 as INT);
        let visible = visible_bindings(&scope);
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].0, "b");
        assert_eq!(visible[1].0, "a");
        assert_eq!(visible[1].1.as_int().unwrap(), 3);
    }
}
