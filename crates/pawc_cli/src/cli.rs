//! Command-line interface for the `pawc` compiler driver.
//!
//! `pawc [OPTIONS] <INPUT>` compiles one entry file (plus its import
//! closure) to an executable by default, or to textual IR / an object file
//! with the `--emit-*` flags. Exit code 0 means success; every
//! user-visible failure (unknown flag, missing file, parse or lowering
//! error, linker failure) exits 1.

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::Parser;
use pawc_base::{Diagnostic, Reporter, Span};
use pawc_compile::{compile_entry, CompileOptions};

use crate::config::Manifest;

#[derive(Parser, Debug)]
#[command(name = "pawc")]
#[command(about = "The Paw compiler", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Input source file (the entry module)
    pub input: PathBuf,

    /// Write output to <FILE>
    #[arg(short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Emit textual LLIR instead of an executable
    #[arg(long)]
    pub emit_llvm: bool,

    /// Emit an object file instead of an executable
    #[arg(long)]
    pub emit_obj: bool,

    /// Print the parsed AST
    #[arg(long)]
    pub print_ast: bool,

    /// Print the generated IR to stdout
    #[arg(long)]
    pub print_ir: bool,

    /// Reject non-exhaustive 'match' expressions
    #[arg(long)]
    pub strict_match: bool,
}

/// Entry point; returns the process exit code.
pub fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help/--version are not failures.
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            return code;
        }
    };

    let mut reporter = Reporter::new().with_color(std::io::stderr().is_terminal());

    if !cli.input.is_file() {
        reporter.report(&Diagnostic::error(
            format!("cannot open input file '{}'", cli.input.display()),
            String::new(),
            Span::default(),
        ));
        return 1;
    }

    let project_dir = cli
        .input
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let manifest = match Manifest::load(&project_dir) {
        Ok(manifest) => manifest,
        Err(message) => {
            reporter.report(&Diagnostic::error(message, String::new(), Span::default()));
            return 1;
        }
    };

    let options = CompileOptions {
        output: cli.output,
        emit_llvm: cli.emit_llvm,
        // Library projects have no entry point to link.
        emit_obj: cli.emit_obj || manifest.is_library(),
        print_ast: cli.print_ast,
        print_ir: cli.print_ir,
        strict_match: cli.strict_match,
        stdlib_root: stdlib_root(),
        cc: std::env::var("PAWC_CC").unwrap_or_else(|_| pawc_compile::link::DEFAULT_CC.to_string()),
        link_args: manifest.link_args(),
    };

    let success = compile_entry(&cli.input, &options, &mut reporter);
    reporter.print_summary();
    if success {
        0
    } else {
        1
    }
}

/// The standard-library search root: `$PAWC_STDLIB`, else `~/.pawc/stdlib`,
/// else a `stdlib` directory beside the working directory.
fn stdlib_root() -> PathBuf {
    if let Ok(root) = std::env::var("PAWC_STDLIB") {
        return PathBuf::from(root);
    }
    dirs::home_dir()
        .map(|home| home.join(".pawc").join("stdlib"))
        .unwrap_or_else(|| PathBuf::from("stdlib"))
}
