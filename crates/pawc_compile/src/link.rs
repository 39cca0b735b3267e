//! Backend glue: per-module IR artifacts and the external link driver.
//!
//! The LLIR library stops at textual IR; turning that into machine code is
//! the external toolchain's job. This module writes one artifact per
//! backend module into the current working directory, hands them to the
//! configured compiler driver (`clang` by default, overridable), and
//! removes the artifacts once the driver returns, success or failure.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use pawc_base::{CompileError, Result, Span};
use pawc_llir::Module;

/// Default compiler driver used for object emission and linking.
pub const DEFAULT_CC: &str = "clang";

fn io_error(message: String) -> CompileError {
    CompileError::new(message, Span::default())
}

/// Artifact path for one module of a build: `<stem>_module_<i>.ll` in the
/// working directory, keyed by the output stem so concurrent builds do not
/// trample each other.
fn artifact_path(output: &Path, index: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("paw_out");
    PathBuf::from(format!("{stem}_module_{index}.ll"))
}

/// Links every module into a single executable at `output`. `extra_args`
/// carries driver flags derived from project configuration (`-O2`, `-g`,
/// `--target=…`).
pub fn link_modules(
    modules: &[Module],
    output: &Path,
    cc: &str,
    extra_args: &[String],
) -> Result<()> {
    let mut artifacts: Vec<PathBuf> = Vec::new();
    let result = write_and_link(modules, output, cc, extra_args, &mut artifacts);
    // Temporary artifacts go away even when the link fails.
    for path in &artifacts {
        let _ = fs::remove_file(path);
    }
    result
}

fn write_and_link(
    modules: &[Module],
    output: &Path,
    cc: &str,
    extra_args: &[String],
    artifacts: &mut Vec<PathBuf>,
) -> Result<()> {
    for (index, module) in modules.iter().enumerate() {
        let path = artifact_path(output, index);
        module
            .write_ir(&path)
            .map_err(|e| io_error(format!("cannot write '{}': {e}", path.display())))?;
        artifacts.push(path);
    }

    let status = Command::new(cc)
        .args(artifacts.iter())
        .args(extra_args)
        .arg("-o")
        .arg(output)
        .status()
        .map_err(|e| io_error(format!("cannot run linker '{cc}': {e}")))?;

    if !status.success() {
        return Err(io_error(format!(
            "linker '{cc}' exited with status {}",
            status.code().map_or_else(|| "unknown".to_string(), |c| c.to_string())
        )));
    }
    Ok(())
}

/// Compiles one module to an object file via `cc -c`.
pub fn emit_object(
    module: &Module,
    output: &Path,
    cc: &str,
    extra_args: &[String],
) -> Result<()> {
    let ir_path = artifact_path(output, 0);
    module
        .write_ir(&ir_path)
        .map_err(|e| io_error(format!("cannot write '{}': {e}", ir_path.display())))?;

    let status = Command::new(cc)
        .arg("-c")
        .arg(&ir_path)
        .args(extra_args)
        .arg("-o")
        .arg(output)
        .status();
    let _ = fs::remove_file(&ir_path);

    let status =
        status.map_err(|e| io_error(format!("cannot run compiler '{cc}': {e}")))?;
    if !status.success() {
        return Err(io_error(format!(
            "object emission failed with status {}",
            status.code().map_or_else(|| "unknown".to_string(), |c| c.to_string())
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawc_llir::{Linkage, Ty, Value};
    use tempfile::tempdir;

    fn trivial_module() -> Module {
        let mut module = Module::new("t");
        let main = module.declare_function("main", vec![], Ty::I32, false, Linkage::External);
        let entry = module.append_block(main, "entry");
        module.position_at_end(main, entry);
        module.build_ret(Value::const_int(Ty::I32, 0));
        module
    }

    #[test]
    fn missing_linker_reports_error() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("missing_cc_out");
        let err =
            link_modules(&[trivial_module()], &output, "pawc-nonexistent-cc", &[]).unwrap_err();
        assert!(err.message.contains("cannot run linker"));
    }

    #[test]
    fn artifacts_are_removed_on_failure() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("cleanup_check");
        // `false` accepts any arguments and exits non-zero.
        let err = link_modules(&[trivial_module()], &output, "false", &[]).unwrap_err();
        assert!(err.message.contains("exited with status"));
        assert!(
            !artifact_path(&output, 0).exists(),
            "artifact must be removed after a failed link"
        );
    }

    #[test]
    fn artifact_names_are_keyed_by_output_stem() {
        let a = artifact_path(Path::new("/tmp/prog"), 0);
        let b = artifact_path(Path::new("/tmp/other"), 0);
        assert_ne!(a, b);
        assert!(a.to_str().unwrap().ends_with("prog_module_0.ll"));
    }
}
