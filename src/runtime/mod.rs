//! # Tracker Runtime
//!
//! Engine instance holding what the host keeps process-wide: the globals
//! catalogue, the special-function registry, weak collection entries,
//! async split points, the monotonic scope-id counter and the
//! tracker-callback cell with its arm/capture/abort protocol. Two
//! serializations running against distinct instances cannot
//! cross-contaminate.

use std::collections::HashMap;

use indexmap::IndexMap;
use log::debug;
use thiserror::Error;

use crate::heap::{
    Heap, ObjectId, ObjectKind, PropertyDescriptor, PropertyName, Prototype, ScopeSnapshot, Value,
};
use crate::instrument::{self, find_tracker_comment, InstrumentOptions};

#[cfg(test)]
mod tests;

/// Errors raised by the runtime half of the engine.
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    #[error("tracker callback armed twice; arm/capture/reset must alternate")]
    ReentrantArm,
    #[error("tracker invoked without an armed callback")]
    NotArmed,
    #[error("function is not instrumented (no tracker metadata in its source)")]
    NotInstrumented,
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Catalogue entry for a value reachable from `globalThis` or a built-in
/// module's exports.
#[derive(Debug, Clone)]
pub struct GlobalEntry {
    /// The containing value; `None` for roots (direct globals and module
    /// exports objects).
    pub parent: Option<Value>,
    /// Property key on the parent, or the global / module name for roots.
    pub key: String,
    /// Root entry is a built-in module's exports object.
    pub is_module: bool,
}

/// Special functions the value tracer must not serialize structurally.
#[derive(Debug, Clone)]
pub enum SpecialFunction {
    Bound {
        target: Value,
        this_arg: Value,
        args: Vec<Value>,
    },
    Promisified {
        inner: Value,
    },
    Callbackified {
        inner: Value,
    },
    Debuglog {
        set: String,
    },
    Require,
    SplitAsync {
        module: ObjectId,
    },
}

/// Outcome of re-instrumenting an `eval` body.
#[derive(Debug, Clone)]
pub enum EvalOutcome {
    /// Instrumented code ready for the host's native `eval`.
    Instrumented { code: String },
    /// Parse failed; the original text goes back to `eval` so the host
    /// raises the authentic `SyntaxError` (instrumentation frames elided).
    ShouldThrow { code: String },
}

/// One enclosing scope as described at a rewritten `eval` call site.
#[derive(Debug, Clone)]
pub struct EvalScopeDef {
    pub block_id: u32,
    pub var_names: Vec<String>,
    pub const_names: Vec<String>,
    pub scope_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackerState {
    Idle,
    Armed,
    Captured,
}

/// Hashable identity key for split-point memoization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ValueKey {
    Undefined,
    Null,
    Bool(bool),
    Number(u64),
    BigInt(String),
    Str(String),
    Object(ObjectId),
}

impl ValueKey {
    fn of(value: &Value) -> Self {
        match value {
            Value::Undefined => ValueKey::Undefined,
            Value::Null => ValueKey::Null,
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Number(n) => ValueKey::Number(n.to_bits()),
            Value::BigInt(s) => ValueKey::BigInt(s.clone()),
            Value::Str(s) => ValueKey::Str(s.clone()),
            Value::Object(id) => ValueKey::Object(*id),
        }
    }
}

/// An engine instance: one live heap plus the registries the serializer
/// consults.
#[derive(Debug, Default)]
pub struct Instance {
    pub heap: Heap,
    globals: IndexMap<ObjectId, GlobalEntry>,
    special_functions: HashMap<ObjectId, SpecialFunction>,
    split_points: HashMap<ValueKey, ObjectId>,
    next_scope_id: u32,
    tracker_state: Option<TrackerStateCell>,
    weak_shim_installed: bool,
}

#[derive(Debug)]
struct TrackerStateCell {
    state: TrackerState,
}

impl Instance {
    pub fn new() -> Self {
        Self {
            next_scope_id: 1,
            ..Self::default()
        }
    }

    /// Monotonic scope-id counter shared by every file's local copy.
    pub fn get_scope_id(&mut self) -> u32 {
        let id = self.next_scope_id;
        self.next_scope_id += 1;
        id
    }

    // Registries.

    pub fn register_global(&mut self, value: ObjectId, entry: GlobalEntry) {
        self.globals.insert(value, entry);
    }

    pub fn global_entry(&self, value: ObjectId) -> Option<&GlobalEntry> {
        self.globals.get(&value)
    }

    pub fn register_special(&mut self, function: ObjectId, special: SpecialFunction) {
        self.special_functions.insert(function, special);
    }

    pub fn special_function(&self, function: ObjectId) -> Option<&SpecialFunction> {
        self.special_functions.get(&function)
    }

    pub fn install_weak_shim(&mut self) {
        self.weak_shim_installed = true;
    }

    pub fn weak_shim_installed(&self) -> bool {
        self.weak_shim_installed
    }

    // Tracker state machine: arm, capture, abort, reset.

    /// Arms the capture callback. Re-entrant arming is a programming
    /// error.
    pub fn set_tracker_callback(&mut self) -> RuntimeResult<()> {
        if self.tracker_state.is_some() {
            return Err(RuntimeError::ReentrantArm);
        }
        self.tracker_state = Some(TrackerStateCell {
            state: TrackerState::Armed,
        });
        Ok(())
    }

    pub fn reset_tracker_callback(&mut self) {
        self.tracker_state = None;
    }

    /// "Invokes" a tracked function under the armed callback: the tracker
    /// guard observes the null scope id, reports the recorded snapshot and
    /// unwinds. A function whose source carries no tracker comment would
    /// have returned normally, which is fatal.
    pub fn invoke_for_capture(&mut self, function: ObjectId) -> RuntimeResult<Vec<ScopeSnapshot>> {
        let cell = self.tracker_state.as_mut().ok_or(RuntimeError::NotArmed)?;
        if cell.state != TrackerState::Armed {
            return Err(RuntimeError::NotArmed);
        }
        let data = self
            .heap
            .object(function)
            .function_data()
            .ok_or(RuntimeError::NotInstrumented)?;
        if find_tracker_comment(&data.source).is_none() {
            // Callback set but the function completed without calling the
            // tracker: it was never instrumented.
            return Err(RuntimeError::NotInstrumented);
        }
        let scopes = data.scopes.clone();
        cell.state = TrackerState::Captured;
        debug!(
            "captured {} scope(s) for function object {}",
            scopes.len(),
            function
        );
        Ok(scopes)
    }

    // Eval re-instrumentation.

    /// Handles a direct `eval` call site: re-instrument the body with a
    /// prefix number that cannot collide, wrapping in an aliasing IIFE
    /// when the number differs from the calling file's. Parse failures are
    /// swallowed; the host's `eval` rethrows the authentic syntax error.
    pub fn eval_direct(
        &mut self,
        code: &str,
        outer_prefix_number: u32,
        _scope_defs: &[EvalScopeDef],
        is_strict: bool,
        filename: &str,
    ) -> EvalOutcome {
        let inner_number = instrument::choose_prefix_number(code).max(outer_prefix_number);
        let options = InstrumentOptions {
            filename: format!("{filename}<eval>"),
            is_strict,
            eval: true,
            ..InstrumentOptions::default()
        };
        let parse_options = crate::parser::ParseOptions {
            filename: options.filename.clone(),
            source_type: crate::ast::SourceType::Script,
            jsx: false,
            strict: is_strict,
        };
        let instrumented = crate::parser::parse(code, &parse_options)
            .map_err(crate::instrument::InstrumentError::from)
            .and_then(|parsed| {
                let mut program = parsed.program;
                instrument::instrument_ast(
                    &mut program,
                    &options,
                    parsed.strict || is_strict,
                    inner_number,
                )?;
                Ok(crate::instrument::print_instrumented(&program))
            });
        match instrumented {
            Ok(body) => {
                let code = if inner_number != outer_prefix_number {
                    // The eval body declares identifiers that clash with
                    // the file's prefix: alias the outer tracker bindings
                    // under the fresh names.
                    format!(
                        "((livepack{n}_tracker, livepack{n}_getScopeId) => {{ {body} }})(livepack{o}_tracker, livepack{o}_getScopeId)",
                        n = inner_number,
                        o = outer_prefix_number,
                    )
                } else {
                    // Direct eval sees the calling scope, so the file's own
                    // tracker bindings resolve without a wrapper.
                    body
                };
                EvalOutcome::Instrumented { code }
            }
            Err(error) => {
                debug!("eval body parse failed, deferring to host eval: {error}");
                EvalOutcome::ShouldThrow {
                    code: code.to_string(),
                }
            }
        }
    }

    /// Indirect `eval` has no scope access; the body is instrumented as a
    /// standalone script.
    pub fn eval_indirect(&mut self, code: &str, filename: &str) -> EvalOutcome {
        self.eval_direct(code, 0, &[], false, filename)
    }

    // splitAsync.

    /// Returns a function value that resolves to a module-namespace-like
    /// object whose `default` is `value`. The same input value always maps
    /// to the same module object.
    pub fn split_async(&mut self, value: Value) -> Value {
        let key = ValueKey::of(&value);
        let module = match self.split_points.get(&key) {
            Some(&module) => module,
            None => {
                let module = self.alloc_split_module(value);
                self.split_points.insert(key, module);
                module
            }
        };
        let function = self.heap.alloc_function(crate::heap::FunctionData {
            source: String::new(),
            scopes: Vec::new(),
            name: String::new(),
            length: 0,
        });
        self.register_special(function, SpecialFunction::SplitAsync { module });
        Value::Object(function)
    }

    /// Builds the sealed namespace-like object: null prototype,
    /// non-extensible, `default` writable + enumerable but not
    /// configurable, `Symbol.toStringTag: "Module"`.
    fn alloc_split_module(&mut self, value: Value) -> ObjectId {
        let module = self.heap.alloc_plain();
        {
            let object = self.heap.object_mut(module);
            object.prototype = Prototype::Null;
            object.extensible = false;
        }
        self.heap.define_prop(
            module,
            PropertyName::str("default"),
            PropertyDescriptor {
                value: Some(value),
                get: None,
                set: None,
                writable: true,
                enumerable: true,
                configurable: false,
            },
        );
        let tag = self.heap.alloc_well_known_symbol("toStringTag");
        self.heap.define_prop(
            module,
            PropertyName::Symbol(tag),
            PropertyDescriptor {
                value: Some(Value::Str("Module".to_string())),
                get: None,
                set: None,
                writable: false,
                enumerable: false,
                configurable: false,
            },
        );
        module
    }

    /// Entries of a weak collection, available only when the host shim was
    /// installed before the collection was created.
    pub fn weak_map_entries(&self, id: ObjectId) -> Option<&[(Value, Value)]> {
        match &self.heap.object(id).kind {
            ObjectKind::WeakMap {
                entries: Some(entries),
            } if self.weak_shim_installed => Some(entries),
            _ => None,
        }
    }

    pub fn weak_set_entries(&self, id: ObjectId) -> Option<&[Value]> {
        match &self.heap.object(id).kind {
            ObjectKind::WeakSet {
                entries: Some(entries),
            } if self.weak_shim_installed => Some(entries),
            _ => None,
        }
    }
}
