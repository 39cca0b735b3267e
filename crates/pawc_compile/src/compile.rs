//! The end-to-end compilation pipeline.
//!
//! ```text
//! entry.paw
//!     │
//!     ▼
//! ┌───────────────────┐
//! │  ModuleLoader     │ parse entry + import closure, topological order
//! └─────────┬─────────┘
//!           ▼
//! ┌───────────────────┐
//! │  Lowerer (× N)    │ one LLIR module per source module, shared symbols
//! └─────────┬─────────┘
//!           ▼
//! ┌───────────────────┐
//! │  link driver      │ write artifacts, invoke the external toolchain
//! └───────────────────┘
//! ```
//!
//! Modules are lowered strictly in dependency order, so by the time a
//! module is lowered everything it imports has already registered its
//! public symbols. All diagnostics flow through the caller's [`Reporter`].

use std::path::{Path, PathBuf};

use pawc_base::{Diagnostic, Reporter};
use pawc_llir::Module;

use crate::link;
use crate::loader::ModuleLoader;
use crate::lower::Lowerer;
use crate::symbols::SymbolTable;

/// Knobs for one compilation run, mirroring the CLI surface.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Output path; defaults to `a.out` / `output.ll` / `output.o`
    /// depending on the emission mode.
    pub output: Option<PathBuf>,
    /// Write textual IR instead of an executable.
    pub emit_llvm: bool,
    /// Write an object file instead of an executable.
    pub emit_obj: bool,
    /// Dump the parsed AST of every module.
    pub print_ast: bool,
    /// Dump the generated IR of every module to stdout.
    pub print_ir: bool,
    /// Reject non-exhaustive `match` instead of materializing a zero.
    pub strict_match: bool,
    /// Standard-library root searched before the entry file's directory.
    pub stdlib_root: PathBuf,
    /// External compiler driver for object emission and linking.
    pub cc: String,
    /// Extra driver arguments from project configuration.
    pub link_args: Vec<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            output: None,
            emit_llvm: false,
            emit_obj: false,
            print_ast: false,
            print_ir: false,
            strict_match: false,
            stdlib_root: PathBuf::from("stdlib"),
            cc: link::DEFAULT_CC.to_string(),
            link_args: Vec::new(),
        }
    }
}

/// Compiles `entry` and everything it imports. Every diagnostic goes
/// through `reporter`; the return value says whether the run succeeded.
pub fn compile_entry(entry: &Path, options: &CompileOptions, reporter: &mut Reporter) -> bool {
    let base_dir = entry.parent().unwrap_or_else(|| Path::new("."));
    let loader = ModuleLoader::new(base_dir, &options.stdlib_root);

    let (order, modules) = match loader.load(entry) {
        Ok(loaded) => loaded,
        Err(diagnostics) => {
            for diagnostic in &diagnostics {
                reporter.report(diagnostic);
            }
            return false;
        }
    };

    for info in modules.values() {
        reporter.add_source(info.path.display().to_string(), &info.source);
    }

    if options.print_ast {
        for name in &order {
            let info = &modules[name];
            println!("=== AST: {} ===", info.name);
            println!("{:#?}", info.program);
        }
    }

    // The entry module must define `main` when we produce an executable.
    let linking = !options.emit_llvm && !options.emit_obj;
    if linking {
        let entry_info = &modules[order.last().expect("at least the entry module")];
        let has_main = entry_info.program.statements.iter().any(|stmt| {
            matches!(
                &stmt.kind,
                pawc_syntax::ast::StmtKind::Function(f) if f.name == "main"
            )
        });
        if !has_main {
            reporter.report(&Diagnostic::error(
                "no 'main' function in the entry module",
                entry_info.path.display().to_string(),
                pawc_base::Span::default(),
            ));
            return false;
        }
    }

    // Lower each module in dependency order against the shared table.
    let mut symbols = SymbolTable::new();
    let mut compiled: Vec<(String, Module)> = Vec::new();
    for name in &order {
        let info = &modules[name];
        let mut lowerer = Lowerer::new(info.short_name(), &mut symbols, options.strict_match);
        if let Err(error) = lowerer.lower_program(&info.program) {
            reporter.report(&Diagnostic::from_error(
                error,
                info.path.display().to_string(),
            ));
            return false;
        }
        compiled.push((info.path.display().to_string(), lowerer.finish()));
    }

    if options.print_ir {
        for (_, module) in &compiled {
            println!("=== IR: {} ===", module.name());
            println!("{}", module.print_ir());
        }
    }

    if options.emit_llvm {
        let output = options
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from("output.ll"));
        for (file, module) in &compiled {
            let path = per_module_path(&output, module.name(), compiled.len());
            if let Err(io_err) = module.write_ir(&path) {
                reporter.report(&Diagnostic::error(
                    format!("cannot write '{}': {io_err}", path.display()),
                    file.clone(),
                    pawc_base::Span::default(),
                ));
                return false;
            }
        }
        return true;
    }

    if options.emit_obj {
        let output = options
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from("output.o"));
        for (file, module) in &compiled {
            let path = per_module_path(&output, module.name(), compiled.len());
            if let Err(error) = link::emit_object(module, &path, &options.cc, &options.link_args)
            {
                reporter.report(&Diagnostic::from_error(error, file.clone()));
                return false;
            }
        }
        return true;
    }

    let output = options
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from("a.out"));
    let modules_only: Vec<Module> = compiled.into_iter().map(|(_, m)| m).collect();
    if let Err(error) =
        link::link_modules(&modules_only, &output, &options.cc, &options.link_args)
    {
        reporter.report(&Diagnostic::from_error(error, String::new()));
        return false;
    }
    true
}

/// Single-module builds write straight to `output`; multi-module builds
/// write one file per module next to it.
fn per_module_path(output: &Path, module_name: &str, module_count: usize) -> PathBuf {
    if module_count == 1 {
        return output.to_path_buf();
    }
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let ext = output.extension().and_then(|s| s.to_str()).unwrap_or("ll");
    output.with_file_name(format!("{stem}_{module_name}.{ext}"))
}
