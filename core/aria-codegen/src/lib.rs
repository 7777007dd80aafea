//! LLVM IR emission for the typed Aria AST — the IR emitter half of spec
//! section 4.6. This crate is a thin interface over [`inkwell`]: it expects
//! a fully typed, fully resolved program (no diagnostic engine is threaded
//! through it, because a failure here is an internal-compiler-error, never
//! a user-facing diagnostic) and lowers it to one LLVM [`Module`] per
//! compilation, then to one native object file per module.
//!
//! Mirrors the teacher's `wasm-codegen` crate shape: a small `lib.rs` entry
//! point plus a `compiler.rs` that owns the actual `inkwell::builder`
//! traversal, swapping WebAssembly-target WASM bytecode emission for
//! native-target object-file emission (this compiler links with the host
//! platform's `ld`, per spec section 6, rather than bundling a WASM
//! runtime).

mod compiler;

use std::path::Path;
use std::rc::Rc;

use aria_ast::{Arena, Typespec, TypespecTable};
use aria_resolver::ResolvedProgram;
use aria_span::SrcfileId;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::targets::{CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine};
use inkwell::OptimizationLevel;
use rustc_hash::FxHashMap;

pub use compiler::Compiler;

/// Everything [`check`](aria_sema::check) produced, bundled for the
/// emitter: the resolved program (bindings, arena, import table), the
/// per-file ASTs it resolved, the declaration-type table `check` returned,
/// and the shared primitive [`TypespecTable`]. The emitter needs all four —
/// expression nodes carry their own type, but function/global/param/field
/// types live in `decl_types` (spec 4.6: "it needs, per node: the
/// typespec... No further type-checking should be required in the
/// backend").
pub struct TypedProgram<'a> {
    pub files: &'a [(SrcfileId, Rc<aria_ast::SourceFile>)],
    pub resolved: &'a ResolvedProgram,
    pub decl_types: &'a FxHashMap<u32, Rc<Typespec>>,
    pub table: &'a TypespecTable,
}

impl<'a> TypedProgram<'a> {
    #[must_use]
    pub fn arena(&self) -> &Arena {
        &self.resolved.arena
    }
}

/// Emits one LLVM module named `module_name` for the whole program. Every
/// `Srcfile` in `program.files` contributes its top-level declarations to
/// the same module — the frontend's "whole-program" in "whole-program
/// ahead-of-time compiler" means there is exactly one translation unit by
/// the time IR emission starts, not one per source file.
pub fn emit_module<'ctx>(context: &'ctx Context, module_name: &str, program: &TypedProgram<'_>) -> Module<'ctx> {
    let mut compiler = Compiler::new(context, module_name, program);
    compiler.emit_program();
    compiler.into_module()
}

/// Compiles `module` to a native object file at `out_path`, targeting the
/// host triple. Per spec section 6, the frontend never inspects the
/// resulting object format — it is handed to `ld` by path and nothing
/// else.
///
/// # Errors
/// Returns an error if the host target cannot be initialized, if no target
/// machine can be created for the host triple, or if `inkwell` fails to
/// write the object file.
pub fn emit_object_file(module: &Module, out_path: &Path) -> anyhow::Result<()> {
    Target::initialize_native(&InitializationConfig::default())
        .map_err(|e| anyhow::anyhow!("failed to initialize native codegen target: {e}"))?;
    let triple = TargetMachine::get_default_triple();
    let target = Target::from_triple(&triple)
        .map_err(|e| anyhow::anyhow!("no target registered for triple {triple}: {e}"))?;
    let cpu = TargetMachine::get_host_cpu_name();
    let features = TargetMachine::get_host_cpu_features();
    let machine = target
        .create_target_machine(
            &triple,
            cpu.to_str().unwrap_or("generic"),
            features.to_str().unwrap_or(""),
            OptimizationLevel::None,
            RelocMode::PIC,
            CodeModel::Default,
        )
        .ok_or_else(|| anyhow::anyhow!("failed to create a target machine for {triple}"))?;
    module.set_triple(&triple);
    module.set_data_layout(&machine.get_target_data().get_data_layout());
    machine
        .write_to_file(module, FileType::Object, out_path)
        .map_err(|e| anyhow::anyhow!("failed to write object file {}: {e}", out_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_diagnostics::DiagnosticEngine;
    use aria_lexer::lex;
    use aria_parser::parse_source_file;
    use aria_span::SrcManager;
    use rustc_hash::FxHashMap as Map;

    fn build(src: &str) -> (Context, FxHashMap<u32, Rc<Typespec>>, ResolvedProgram, Vec<(SrcfileId, Rc<aria_ast::SourceFile>)>, TypespecTable) {
        let mut mgr = SrcManager::new();
        let id = mgr.add("t.aria".into(), src.to_string());
        let mut diags = DiagnosticEngine::new();
        let tokens = lex(mgr.get(id), id, &mut diags);
        let parsed = parse_source_file(id, tokens, &mut diags, 1);
        let files = vec![(id, parsed.source_file)];
        let import_index = Map::default();
        let resolved = aria_resolver::resolve(&files, &import_index, &mut diags);
        let table = TypespecTable::new();
        let decl_types = aria_sema::check(&files, &resolved, &table, &mut diags);
        assert!(!diags.has_errors(), "fixture failed to typecheck");
        let context = Context::create();
        (context, decl_types, resolved, files, table)
    }

    #[test]
    fn emits_a_module_for_a_trivial_main() {
        let (context, decl_types, resolved, files, table) = build("fn main() i32 { return 0; }");
        let program = TypedProgram { files: &files, resolved: &resolved, decl_types: &decl_types, table: &table };
        let module = emit_module(&context, "t", &program);
        assert!(module.get_function("main").is_some());
        assert!(module.verify().is_ok());
    }

    #[test]
    fn emits_arithmetic_and_control_flow() {
        let (context, decl_types, resolved, files, table) = build(
            "fn add(x: i32, y: i32) i32 { if x < y { return y; } else { return x + y; } }",
        );
        let program = TypedProgram { files: &files, resolved: &resolved, decl_types: &decl_types, table: &table };
        let module = emit_module(&context, "t", &program);
        assert!(module.verify().is_ok());
    }
}
