//! Rhai Script Engine Implementation
//!
//! One [`ScriptEngine`] hosts one traced run. The trace hook and the
//! deadline are registered on the underlying engine, so neither outlives it.

use rhai::{Array, Dynamic, Engine, Map, Scope, AST};
use std::time::Instant;

use crate::config::ExecutionLimits;
use crate::error::{Result, VisTraceError};
use crate::scripting::ExecutionFault;
use crate::tracer::hook::{self, SharedHookState};

/// Engine wrapper applying the configured safety limits
pub struct ScriptEngine {
    engine: Engine,
    limits: ExecutionLimits,
    traced: bool,
}

impl ScriptEngine {
    /// Create a new script engine with the given limits
    pub fn new(limits: &ExecutionLimits) -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine, limits);

        Self {
            engine,
            limits: limits.clone(),
            traced: false,
        }
    }

    /// Configure the Rhai engine with node constructors and safety limits
    fn configure_engine(engine: &mut Engine, limits: &ExecutionLimits) {
        engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
        engine.set_max_call_levels(limits.max_call_levels);
        engine.set_max_operations(limits.max_operations);
        engine.set_max_string_size(limits.max_string_size);
        engine.set_max_array_size(limits.max_array_size);
        engine.set_max_map_size(limits.max_map_size);

        engine.on_print(|text| tracing::info!(target: "vistrace::script", "{}", text));
        engine.on_debug(|text, source, pos| match source {
            Some(source) => tracing::debug!(target: "vistrace::script", "{} {:?}: {}", source, pos, text),
            None => tracing::debug!(target: "vistrace::script", "{:?}: {}", pos, text),
        });

        engine.register_fn("binary_node", |value: Dynamic| -> Dynamic {
            let mut node = Map::new();
            node.insert("value".into(), value);
            node.insert("left".into(), Dynamic::UNIT);
            node.insert("right".into(), Dynamic::UNIT);
            Dynamic::from_map(node)
        });
        engine.register_fn("tree_node", |value: Dynamic| -> Dynamic {
            let mut node = Map::new();
            node.insert("value".into(), value);
            node.insert("children".into(), Dynamic::from_array(Array::new()));
            Dynamic::from_map(node)
        });
    }

    /// Compile a script
    pub fn compile(&self, source: &str) -> Result<AST> {
        self.engine
            .compile(source)
            .map_err(VisTraceError::from_parse_error)
    }

    /// Validate a script without executing it
    pub fn validate(&self, source: &str) -> Result<()> {
        self.compile(source).map(|_| ())
    }

    /// Attach the trace hook for the lifetime of this engine
    pub fn install_hook(&mut self, state: SharedHookState) {
        hook::install(&mut self.engine, state);
        self.traced = true;
    }

    /// Run a compiled script, enforcing the wall-clock deadline
    pub fn run(&mut self, ast: &AST, scope: &mut Scope) -> std::result::Result<(), ExecutionFault> {
        if let Some(deadline) = self.limits.deadline() {
            let started = Instant::now();
            self.engine.on_progress(move |_operations| {
                (started.elapsed() > deadline)
                    .then(|| Dynamic::from(format!("deadline of {:?} exceeded", deadline)))
            });
        }

        self.engine
            .run_ast_with_scope(scope, ast)
            .map_err(|err| ExecutionFault::from_eval(&err))
    }

    /// Get a reference to the underlying Rhai engine
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new(&ExecutionLimits::default())
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("limits", &self.limits)
            .field("traced", &self.traced)
            .finish()
    }
}
