//! Core orchestration for the Aria compiler pipeline.
//!
//! This crate is the thin layer that wires the frontend crates together and
//! hands their output to the platform linker. It mirrors the teacher's
//! `core/inference` crate shape: a small `lib.rs` exposing one pipeline
//! entry point, delegating everything else to the specialized crates named
//! in its `Cargo.toml`.
//!
//! ## Pipeline
//!
//! ```text
//! source files -> lex -> parse -> resolve -> check -> emit IR -> ld
//! ```
//!
//! Each arrow is a stage barrier: the next stage does not run if the
//! previous one's [`DiagnosticEngine`] has errors. The whole compilation
//! shares one `DiagnosticEngine` so diagnostics from every stage are
//! rendered together, in emission order.
//!
//! Compilation is whole-program: there is no separate-compilation or
//! persisted-metadata story, so `import "path"` resolves only among the
//! files given to [`compile`] in this invocation, keyed by the path string
//! exactly as it was passed on the command line.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use aria_codegen::TypedProgram;
use aria_diagnostics::DiagnosticEngine;
use aria_span::{SrcManager, SrcfileId};
use inkwell::context::Context;
use rustc_hash::FxHashMap;

/// Where the prebuilt runtime-support object is found, absent an
/// `ARIA_RUNTIME_OBJ` override. Mirrors the teacher CLI's reliance on
/// prebuilt `inf-llc`/`rust-lld` binaries under `external/bin/` next to the
/// compiler — this compiler expects its own runtime object under
/// `external/runtime/<host-triple>.o` next to the `aria` executable.
const RUNTIME_OBJ_ENV: &str = "ARIA_RUNTIME_OBJ";

/// The outcome of one [`compile`] call, carrying everything the CLI needs
/// to compute spec section 6's exit code: the number of errors emitted, or
/// a distinct signal for the two ways the linker step itself can fail.
#[derive(Debug)]
pub enum CompileOutcome {
    /// Every stage succeeded and the linker produced the output binary.
    Success,
    /// The frontend (lex/parse/resolve/check) reported one or more errors;
    /// diagnostics have already been printed. Carries the error count.
    FrontendErrors(usize),
    /// `ld` could not be spawned at all (e.g. not installed).
    LinkerNotFound(io::Error),
    /// `ld` ran and exited with a nonzero status; its stderr has already
    /// been passed through.
    LinkerFailed,
}

/// Reads, lexes, parses, resolves, type-checks, and links `inputs` into
/// `output`. Diagnostics are rendered to stderr as soon as a stage barrier
/// trips; the function never panics on a user-facing condition (bad
/// source, missing `ld`) — those become [`CompileOutcome`] variants or
/// `Err` for conditions the user cannot fix by changing their program
/// (unreadable input file, codegen failure).
///
/// # Errors
/// Returns `Err` if an input file cannot be read, or if IR emission or
/// object-file writing fails — both internal-compiler-error territory per
/// spec section 4.6, since a program that passed type checking should
/// never fail to lower.
pub fn compile(inputs: &[PathBuf], output: &Path) -> anyhow::Result<CompileOutcome> {
    let mut srcs = SrcManager::new();
    let mut import_index: FxHashMap<String, SrcfileId> = FxHashMap::default();
    let mut file_ids = Vec::with_capacity(inputs.len());

    for path in inputs {
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
        let id = srcs.add(path.clone(), contents);
        // Index both the literal argv string and the bare file name, so
        // `import "lib.aria"` binds whether inputs were passed as plain
        // relative names or as full paths from another directory. There is
        // no search path beyond the files given on this invocation.
        import_index.insert(path.to_string_lossy().into_owned(), id);
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            import_index.entry(name.to_string()).or_insert(id);
        }
        file_ids.push(id);
    }

    let mut diags = DiagnosticEngine::new();

    let mut tokens_by_file = Vec::with_capacity(file_ids.len());
    for &id in &file_ids {
        tokens_by_file.push((id, aria_lexer::lex(srcs.get(id), id, &mut diags)));
    }
    if let Some(outcome) = barrier(&diags, &srcs) {
        return Ok(outcome);
    }

    let mut files = Vec::with_capacity(file_ids.len());
    let mut next_id = 1;
    for (id, tokens) in tokens_by_file {
        let parsed = aria_parser::parse_source_file(id, tokens, &mut diags, next_id);
        next_id = parsed.next_id;
        files.push((id, parsed.source_file));
    }
    if let Some(outcome) = barrier(&diags, &srcs) {
        return Ok(outcome);
    }

    let resolved = aria_resolver::resolve(&files, &import_index, &mut diags);
    if let Some(outcome) = barrier(&diags, &srcs) {
        return Ok(outcome);
    }

    let table = aria_ast::TypespecTable::new();
    let decl_types = aria_sema::check(&files, &resolved, &table, &mut diags);
    if let Some(outcome) = barrier(&diags, &srcs) {
        return Ok(outcome);
    }

    let program = TypedProgram {
        files: &files,
        resolved: &resolved,
        decl_types: &decl_types,
        table: &table,
    };

    let module_name = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("aria_module");
    let context = Context::create();
    let module = aria_codegen::emit_module(&context, module_name, &program);

    let tmp = tempfile::Builder::new()
        .prefix("ariac-")
        .tempdir()
        .map_err(|e| anyhow::anyhow!("failed to create temporary build directory: {e}"))?;
    let obj_path = tmp.path().join(format!("{module_name}.o"));
    aria_codegen::emit_object_file(&module, &obj_path)?;

    link(&obj_path, output)
    // `tmp` drops here on every path above, recursively removing the
    // directory whether linking succeeded, failed, or never started.
}

/// Checks the shared engine for errors, prints diagnostics and returns a
/// [`CompileOutcome`] if so. `None` means the caller should proceed.
fn barrier(diags: &DiagnosticEngine, srcs: &SrcManager) -> Option<CompileOutcome> {
    if diags.has_errors() {
        diags.print(srcs);
        Some(CompileOutcome::FrontendErrors(diags.error_count()))
    } else {
        None
    }
}

/// Invokes `ld -o <output> <obj> <runtime-support-obj>`, letting the
/// child's stdout/stderr pass straight through per spec section 6.
fn link(obj_path: &Path, output: &Path) -> anyhow::Result<CompileOutcome> {
    let runtime_obj = runtime_support_object()?;
    let status = Command::new("ld")
        .arg("-o")
        .arg(output)
        .arg(obj_path)
        .arg(&runtime_obj)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status();

    let status = match status {
        Ok(status) => status,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(CompileOutcome::LinkerNotFound(e));
        }
        Err(e) => return Err(anyhow::anyhow!("failed to run linker: {e}")),
    };

    if status.success() {
        Ok(CompileOutcome::Success)
    } else {
        eprintln!("aborting due to previous linker error");
        Ok(CompileOutcome::LinkerFailed)
    }
}

/// Locates the prebuilt runtime-support object bundled with the compiler.
/// Resolution order: `ARIA_RUNTIME_OBJ` env override (used in tests and
/// packaging), else `external/runtime/<host-triple>.o` next to the running
/// executable.
fn runtime_support_object() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var(RUNTIME_OBJ_ENV) {
        return Ok(PathBuf::from(path));
    }
    let exe = std::env::current_exe()
        .map_err(|e| anyhow::anyhow!("cannot locate running executable: {e}"))?;
    let dir = exe
        .parent()
        .ok_or_else(|| anyhow::anyhow!("running executable has no parent directory"))?;
    let triple = inkwell::targets::TargetMachine::get_default_triple();
    Ok(dir
        .join("external")
        .join("runtime")
        .join(format!("{triple}.o")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.aria");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn reports_frontend_errors_without_touching_the_linker() {
        let (_dir, path) = write_tmp("fn main() i32 { return \"oops\"; }");
        let out = path.with_extension("out");
        let outcome = compile(&[path], &out).unwrap();
        match outcome {
            CompileOutcome::FrontendErrors(n) => assert!(n > 0),
            other => panic!("expected FrontendErrors, got {other:?}"),
        }
        assert!(!out.exists());
    }

    #[test]
    fn missing_input_file_is_an_error() {
        let result = compile(
            &[PathBuf::from("does-not-exist.aria")],
            &PathBuf::from("a.out"),
        );
        assert!(result.is_err());
    }

    /// `import "path"` must resolve against another input file's path
    /// exactly as it was passed to `compile`, since whole-program
    /// compilation has no search path to fall back on.
    #[test]
    fn import_resolves_among_the_given_input_files() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib.aria");
        let main = dir.path().join("main.aria");
        fs::write(&lib, "fn helper() i32 { return 1; }").unwrap();
        fs::write(
            &main,
            "import \"lib.aria\";\nfn main() i32 { return lib.helper(); }",
        )
        .unwrap();
        std::env::set_var(RUNTIME_OBJ_ENV, "/nonexistent/runtime.o");
        let outcome = compile(&[main, lib], &dir.path().join("a.out"));
        std::env::remove_var(RUNTIME_OBJ_ENV);
        // The import bound, so the frontend reaches the linker stage
        // instead of failing resolution — `ld` then rejects the bogus
        // runtime object path one way or another depending on whether
        // `ld` itself is installed in the environment running this test.
        assert!(matches!(
            outcome,
            Ok(CompileOutcome::LinkerNotFound(_)) | Ok(CompileOutcome::LinkerFailed)
        ));
    }
}
