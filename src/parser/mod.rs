//! # Parser Adapter
//!
//! Converts JavaScript source into the crate's owned AST using the OXC
//! parser, and extracts `//# sourceMappingURL` comments so the instrumenter
//! can remap locations to original files. All OXC usage lives in this
//! module; the rest of the crate only sees [`crate::ast`] types.

use oxc_allocator::Allocator;
use oxc_parser::Parser;
use oxc_span::SourceType as OxcSourceType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::{Program, SourceType};

mod convert;
pub mod source_maps;

#[cfg(test)]
mod tests;

/// Configuration for a parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Filename used in error messages and tracker metadata.
    pub filename: String,
    pub source_type: SourceType,
    /// Allow JSX syntax. Parsed files containing actual JSX elements are
    /// still rejected by the AST conversion.
    pub jsx: bool,
    /// Treat the source as strict regardless of a `"use strict"` directive.
    pub strict: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            filename: "<anonymous>".to_string(),
            source_type: SourceType::CommonJs,
            jsx: false,
            strict: false,
        }
    }
}

/// Errors produced while parsing or converting source text.
#[derive(Error, Debug, Clone)]
pub enum ParseError {
    #[error("Syntax error in {filename} at offset {offset}: {message}")]
    SyntaxError {
        filename: String,
        offset: u32,
        message: String,
    },
    #[error("Unsupported syntax in {filename}: {node_type}")]
    UnsupportedSyntax { filename: String, node_type: String },
    #[error("Invalid source map: {message}")]
    InvalidSourceMap { message: String },
}

/// Result alias for parser operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Successful parse output.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub program: Program,
    /// Parsed input source map, when the source carried one.
    pub source_map: Option<source_maps::SourceMap>,
    /// Whether the program's top level is strict (module, or a
    /// `"use strict"` prologue, or forced by options).
    pub strict: bool,
}

/// Parses `source` into the owned AST.
///
/// Any `//# sourceMappingURL` comment is detected, stripped from the text
/// handed to OXC, and returned decoded when it is an inline data URL.
pub fn parse(source: &str, options: &ParseOptions) -> ParseResult<ParseOutput> {
    let (clean_source, source_map) = source_maps::extract(source)?;

    let mut source_type = OxcSourceType::default();
    if options.source_type == SourceType::Module {
        source_type = source_type.with_module(true);
    }
    if options.jsx {
        source_type = source_type.with_jsx(true);
    }

    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, &clean_source, source_type).parse();

    if let Some(error) = ret.errors.first() {
        let offset = error
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map(|label| label.offset() as u32)
            .unwrap_or(0);
        return Err(ParseError::SyntaxError {
            filename: options.filename.clone(),
            offset,
            message: format!("{error:?}"),
        });
    }

    let mut program = convert::convert_program(&ret.program, &options.filename)?;
    program.source_type = options.source_type;

    let strict = options.strict
        || options.source_type == SourceType::Module
        || has_use_strict_directive(&program);

    Ok(ParseOutput {
        program,
        source_map,
        strict,
    })
}

/// Whether the program body starts with a `"use strict"` prologue.
pub fn has_use_strict_directive(program: &Program) -> bool {
    use crate::ast::{Expression, Literal, Statement};
    for stmt in &program.body {
        match stmt {
            Statement::ExpressionStatement {
                expression: Expression::Literal(Literal::String(value)),
            } => {
                if value == "use strict" {
                    return true;
                }
            }
            _ => break,
        }
    }
    false
}
