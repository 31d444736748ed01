//! # Serializer
//!
//! Turns a live value graph into self-contained JavaScript source.
//! The value tracer walks the heap creating one record per distinct value,
//! the function serializer recovers tracked functions' metadata and
//! captured scopes, the block planner arranges captured scopes into
//! synthetic factory functions, and the output assembler orders records
//! and prints the final program.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::heap::Value;
use crate::parser::ParseError;
use crate::runtime::{Instance, RuntimeError};

pub mod blocks;
pub mod function;
pub mod output;
pub mod record;
pub mod trace;

#[cfg(test)]
mod tests;

/// Output wrapper format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Statements plus `module.exports = <root>;`.
    #[default]
    Cjs,
    /// Imports, statements, `export default <root>;`.
    Esm,
    /// A single expression, IIFE-wrapped when statements exist.
    Js,
    /// An IIFE that invokes the serialized root function.
    Exec,
}

/// Options for [`serialize`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializeOptions {
    pub format: OutputFormat,
    /// Collapse whitespace in the printed output.
    pub minify: bool,
    /// Use short mangled identifiers instead of readable names.
    pub mangle: bool,
    /// Splice single-use values into their one reference.
    pub inline: bool,
    /// Keep comments from serialized function sources. Parsed sources
    /// shed comments, so this currently only gates future annotation
    /// output.
    pub comments: bool,
    /// Emit a source map alongside the code in `files` mode.
    pub source_maps: bool,
    /// Emit multiple output files (`main.js` plus future assets) instead
    /// of a single string.
    pub files: bool,
    /// Name of the file emitted in `files` mode.
    pub filename: String,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Cjs,
            minify: false,
            mangle: false,
            inline: true,
            comments: false,
            source_maps: false,
            files: false,
            filename: "main.js".to_string(),
        }
    }
}

/// One emitted file in `files` mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub filename: String,
    pub content: String,
}

/// Errors raised during serialization. The trace string locates the value
/// from the root (`<root>.a[0]` and scope-variable hops).
#[derive(Error, Debug)]
pub enum SerializeError {
    #[error("function {name:?} is not instrumented (host-native or loaded without the loader) at {trace}")]
    NotInstrumentedFunction { name: String, trace: String },
    #[error("cannot serialize value at {trace}: {reason}")]
    UnsupportedValue { reason: String, trace: String },
    #[error("unresolvable dependency cycle at {trace}; this is a bug, please file an issue")]
    CircularUnresolvable { trace: String },
    #[error("Object.prototype.__defineSetter__ was replaced after instrumentation; `with` support is disabled")]
    WithProtoTampered,
    #[error("internal assertion failed: {message}; this is a bug, please file an issue")]
    InternalAssertion { message: String },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub type SerializeResult<T> = Result<T, SerializeError>;

/// Serializes `value` against `instance`, returning program text.
pub fn serialize(
    instance: &mut Instance,
    value: &Value,
    options: &SerializeOptions,
) -> SerializeResult<String> {
    let mut serializer = trace::Serializer::new(instance, options.clone());
    serializer.run(value)
}

/// Serializes into one or more named files.
pub fn serialize_files(
    instance: &mut Instance,
    value: &Value,
    options: &SerializeOptions,
) -> SerializeResult<Vec<OutputFile>> {
    let content = serialize(instance, value, options)?;
    Ok(vec![OutputFile {
        filename: options.filename.clone(),
        content,
    }])
}
