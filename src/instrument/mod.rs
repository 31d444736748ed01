//! # Instrumenter
//!
//! Rewrites parsed source so that at runtime every function can reveal its
//! lexical structure and the live values of the variables it closes over.
//!
//! The rewrite inserts, per file, a preamble binding a tracker callable and
//! a scope-id counter; per scope, a `const <prefix>scopeId_<n> =
//! <prefix>getScopeId();` identification statement; and per function, a
//! guard statement that is a no-op in normal execution but reports captured
//! scope values and aborts when the serializer has armed the tracker.
//! Function bodies additionally receive a JSON metadata comment that
//! survives `Function.prototype.toString()`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::printer::{print_program, PrintOptions, RawMapping};
use crate::ast::{Program, SourceType};
use crate::parser::source_maps::SourceMap;
use crate::parser::{self, ParseError, ParseOptions};

pub mod rewrite;
pub mod scopes;
pub mod special;

#[cfg(test)]
mod tests;

/// Marker that opens every tracker metadata comment.
pub const TRACKER_COMMENT_PREFIX: &str = "livepack_track:";

/// Base of every injected identifier; the prefix number is appended.
pub const IDENT_BASE: &str = "livepack";

/// Options for [`instrument_code`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentOptions {
    pub filename: String,
    pub source_type: SourceType,
    pub jsx: bool,
    /// Force strict-mode interpretation.
    pub is_strict: bool,
    /// Emit raw mappings alongside the code.
    pub source_maps: bool,
    /// Input source map carried through to the output unchanged.
    pub input_source_map: Option<SourceMap>,
    /// The source is a direct-`eval` body being re-instrumented at
    /// runtime; functions it defines are flagged `isEval`.
    pub eval: bool,
    /// Specifier the preamble imports the runtime from.
    pub runtime_specifier: String,
    pub print: PrintOptions,
}

impl Default for InstrumentOptions {
    fn default() -> Self {
        Self {
            filename: "<anonymous>".to_string(),
            source_type: SourceType::CommonJs,
            jsx: false,
            is_strict: false,
            source_maps: false,
            input_source_map: None,
            eval: false,
            runtime_specifier: "revivify/runtime".to_string(),
            print: PrintOptions::default(),
        }
    }
}

/// Errors raised while instrumenting.
#[derive(Error, Debug, Clone)]
pub enum InstrumentError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Instrumentation failed in {filename}: {message}")]
    Rewrite { filename: String, message: String },
}

/// Result alias for instrumenter operations.
pub type InstrumentResult<T> = Result<T, InstrumentError>;

/// Output of [`instrument_code`].
#[derive(Debug, Clone)]
pub struct InstrumentOutput {
    pub code: String,
    pub map: Option<SourceMap>,
    pub raw_mappings: Option<Vec<RawMapping>>,
}

/// Per-scope entry of the tracker metadata comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeMeta {
    pub block_id: u32,
    /// Captured variable names, declaration order.
    pub var_names: Vec<String>,
    /// Subset of `var_names` bound as `const` (or otherwise immutable).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub const_names: Vec<String>,
    /// Parameter names, present when this scope originates `arguments` and
    /// the parameters are therefore conservatively treated as mutable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_name: Option<String>,
}

/// JSON payload of the `/*livepack_track:…*/` comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerInfo {
    pub id: u32,
    /// Enclosing scopes providing captured variables, outermost first.
    pub scopes: Vec<ScopeMeta>,
    pub filename: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_method: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_proto_method: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_var_name: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_strict: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_eval: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_super_class: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub contains_eval: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub returns_super: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_super_statement_index: Option<u32>,
}

impl TrackerInfo {
    /// Renders the comment body (`livepack_track:<json>`), escaping any
    /// `*/` sequence inside JSON strings so the comment cannot terminate
    /// early.
    pub fn to_comment(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        format!("{TRACKER_COMMENT_PREFIX}{}", json.replace("*/", "*\\/"))
    }

    /// Parses the payload of a tracker comment body.
    pub fn from_comment(body: &str) -> Option<Self> {
        let json = body.strip_prefix(TRACKER_COMMENT_PREFIX)?;
        serde_json::from_str(json).ok()
    }
}

/// Finds the first tracker comment in a piece of source text and parses
/// its payload. Used by the function serializer on `toString()` output.
pub fn find_tracker_comment(source: &str) -> Option<TrackerInfo> {
    let open = format!("/*{TRACKER_COMMENT_PREFIX}");
    let start = source.find(&open)?;
    let rest = &source[start + 2..];
    let end = rest.find("*/")?;
    TrackerInfo::from_comment(&rest[..end])
}

/// Picks the prefix number: the smallest `n` such that `livepack<n>_` never
/// occurs in the source. Scanning raw text over-approximates the set of
/// identifiers, which can only push `n` higher, never produce a collision.
pub fn choose_prefix_number(source: &str) -> u32 {
    let mut taken = std::collections::HashSet::new();
    let bytes = source.as_bytes();
    let needle = IDENT_BASE.as_bytes();
    let mut i = 0;
    while i + needle.len() <= bytes.len() {
        if &bytes[i..i + needle.len()] == needle {
            let mut j = i + needle.len();
            let digits_start = j;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j < bytes.len() && bytes[j] == b'_' {
                let n = if j == digits_start {
                    0
                } else {
                    source[digits_start..j].parse().unwrap_or(0)
                };
                taken.insert(n);
            }
            i = j;
        } else {
            i += 1;
        }
    }
    let mut n = 0;
    while taken.contains(&n) {
        n += 1;
    }
    n
}

/// Instruments source text, returning printed code.
pub fn instrument_code(
    source: &str,
    options: &InstrumentOptions,
) -> InstrumentResult<InstrumentOutput> {
    let parse_options = ParseOptions {
        filename: options.filename.clone(),
        source_type: options.source_type,
        jsx: options.jsx,
        strict: options.is_strict,
    };
    let parsed = parser::parse(source, &parse_options)?;
    if rewrite::is_instrumented(&parsed.program) {
        // Already carries a preamble; reprinting would lose the tracker
        // comments, so the text passes through untouched.
        return Ok(InstrumentOutput {
            code: source.to_string(),
            map: options.input_source_map.clone().or(parsed.source_map),
            raw_mappings: None,
        });
    }
    let prefix_number = choose_prefix_number(source);
    let mut program = parsed.program;
    instrument_ast(&mut program, options, parsed.strict, prefix_number)?;

    let mut print_options = options.print.clone();
    print_options.mappings = options.source_maps;
    let mut printer = crate::ast::printer::Printer::new(print_options);
    printer.program(&program);
    let (code, raw_mappings) = printer.finish();

    let map = options
        .input_source_map
        .clone()
        .or(parsed.source_map.clone());

    Ok(InstrumentOutput {
        code,
        map,
        raw_mappings: if options.source_maps {
            Some(raw_mappings)
        } else {
            None
        },
    })
}

/// Instruments a parsed program in place.
///
/// The rewrite is idempotent: a program that already carries the preamble
/// is returned unchanged.
pub fn instrument_ast(
    program: &mut Program,
    options: &InstrumentOptions,
    is_strict: bool,
    prefix_number: u32,
) -> InstrumentResult<()> {
    if rewrite::is_instrumented(program) {
        return Ok(());
    }
    let mut pass = rewrite::Rewriter::new(options, is_strict, prefix_number);
    pass.run(program)
}

/// Convenience used by the serializer and tests: print a program with
/// default options.
pub fn print_instrumented(program: &Program) -> String {
    print_program(program, &PrintOptions::default())
}
