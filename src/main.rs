//! # revivify CLI
//!
//! Developer utility over the instrumenter: reads a JavaScript file,
//! injects the tracker preamble, scope-id constants and metadata comments,
//! and prints (or writes) the instrumented source. The loader and build
//! tooling drive [`revivify::instrument_code`] the same way.

use std::path::PathBuf;
use std::process;

use clap::{Arg, Command};

use revivify::ast::printer::{PrintMode, PrintOptions};
use revivify::{instrument_code, InstrumentOptions, SourceType};

const APP_NAME: &str = "revivify";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parsed CLI configuration.
#[derive(Debug, Clone)]
struct CliConfig {
    input_file: PathBuf,
    output_file: Option<PathBuf>,
    esm: bool,
    jsx: bool,
    compact: bool,
    verbose: bool,
}

/// CLI error type.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Read error: {0}")]
    Read(#[from] std::io::Error),
    #[error(transparent)]
    Instrument(#[from] revivify::InstrumentError),
}

type CliResult<T> = Result<T, CliError>;

fn main() {
    env_logger::init();
    if let Err(error) = run() {
        eprintln!("❌ {error}");
        process::exit(1);
    }
}

fn run() -> CliResult<()> {
    let config = parse_command_line_arguments();
    if config.verbose {
        display_verbose_info(&config);
    }
    instrument_file(&config)
}

fn parse_command_line_arguments() -> CliConfig {
    let matches = Command::new(APP_NAME)
        .version(VERSION)
        .about("Instruments JavaScript files for live-value serialization")
        .long_about(
            "Rewrites a JavaScript source file so that every function can \n\
             reveal its lexical structure and captured variables to the \n\
             revivify serializer at runtime.",
        )
        .arg(
            Arg::new("input")
                .help("JavaScript file to instrument")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Write instrumented code to this file instead of stdout")
                .value_name("OUT")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("esm")
                .long("esm")
                .action(clap::ArgAction::SetTrue)
                .help("Treat the input as an ES module"),
        )
        .arg(
            Arg::new("jsx")
                .long("jsx")
                .action(clap::ArgAction::SetTrue)
                .help("Allow JSX syntax"),
        )
        .arg(
            Arg::new("compact")
                .long("compact")
                .action(clap::ArgAction::SetTrue)
                .help("Print the instrumented code on a single line"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::SetTrue)
                .help("Enable verbose output"),
        )
        .get_matches();

    CliConfig {
        input_file: matches
            .get_one::<PathBuf>("input")
            .cloned()
            .unwrap_or_default(),
        output_file: matches.get_one::<PathBuf>("output").cloned(),
        esm: matches.get_flag("esm"),
        jsx: matches.get_flag("jsx"),
        compact: matches.get_flag("compact"),
        verbose: matches.get_flag("verbose"),
    }
}

fn display_verbose_info(config: &CliConfig) {
    println!("📋 Configuration:");
    println!("   📁 Input file: {}", config.input_file.display());
    println!("   📘 Source type: {}", if config.esm { "module" } else { "commonjs" });
    println!("   🔧 JSX: {}", config.jsx);
}

fn instrument_file(config: &CliConfig) -> CliResult<()> {
    if !config.input_file.exists() {
        return Err(CliError::FileNotFound(config.input_file.clone()));
    }
    let source = std::fs::read_to_string(&config.input_file)?;
    if config.verbose {
        println!("📄 Read {} bytes", source.len());
    }

    let options = InstrumentOptions {
        filename: config.input_file.to_string_lossy().into_owned(),
        source_type: if config.esm {
            SourceType::Module
        } else {
            SourceType::CommonJs
        },
        jsx: config.jsx,
        print: PrintOptions {
            mode: if config.compact {
                PrintMode::Compact
            } else {
                PrintMode::Pretty
            },
            mappings: false,
        },
        ..InstrumentOptions::default()
    };
    let output = instrument_code(&source, &options)?;

    match &config.output_file {
        Some(path) => {
            std::fs::write(path, output.code.as_bytes())?;
            if config.verbose {
                println!("✅ Wrote {}", path.display());
            }
        }
        None => println!("{}", output.code),
    }
    Ok(())
}
