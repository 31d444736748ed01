//! # revivify
//!
//! Serializes live, executing JavaScript values — closures, classes,
//! cyclic object graphs, typed buffers, boxed primitives, symbols and
//! bound functions included — back into self-contained, executable
//! JavaScript source. Evaluating the output in a fresh host reconstructs
//! a value observationally equivalent to the original, prototype chains,
//! property descriptors and closed-over lexical scopes intact.
//!
//! Two halves cooperate:
//!
//! - **Instrumentation** ([`instrument_code`]): rewrites source so every
//!   function carries a JSON metadata comment and a tracker guard that can
//!   reveal the live values it closes over.
//! - **Serialization** ([`serialize`]): walks the value graph recorded in
//!   an engine [`Instance`], deduplicates shared references, plans
//!   assignment fix-ups for cycles, rebuilds lexical scopes as synthetic
//!   factory closures, and prints the final program.
//!
//! ```no_run
//! use revivify::{instrument_code, InstrumentOptions};
//!
//! let out = instrument_code("let a = 1; const f = () => a;", &InstrumentOptions::default())?;
//! assert!(out.code.contains("livepack0_tracker"));
//! # Ok::<(), revivify::InstrumentError>(())
//! ```

pub mod ast;
pub mod cache;
pub mod heap;
pub mod instrument;
pub mod parser;
pub mod runtime;
pub mod serializer;
pub mod util;

pub use ast::printer::{PrintMode, PrintOptions};
pub use ast::{Program, SourceType};
pub use cache::{CacheEntry, CacheKey, RegisterCache};
pub use heap::{
    FunctionData, Heap, ObjectId, ObjectKind, PropertyDescriptor, PropertyName, Prototype,
    ScopeSnapshot, Value,
};
pub use instrument::{
    choose_prefix_number, find_tracker_comment, instrument_ast, instrument_code, InstrumentError,
    InstrumentOptions, InstrumentOutput, ScopeMeta, TrackerInfo,
};
pub use parser::{parse, ParseError, ParseOptions, ParseOutput};
pub use runtime::{
    EvalOutcome, EvalScopeDef, GlobalEntry, Instance, RuntimeError, SpecialFunction,
};
pub use serializer::{
    serialize, serialize_files, OutputFile, OutputFormat, SerializeError, SerializeOptions,
};
