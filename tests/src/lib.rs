//! End-to-end tests driving the whole frontend pipeline (and, where
//! relevant, IR emission) directly through the `aria-*` crates rather than
//! spawning the `aria` binary — `apps/ariac/tests` owns the process-level
//! CLI contract, this crate owns the pipeline's own contract.

mod utils;

#[cfg(test)]
mod general_tests {
    use super::utils::{check_source, read_example};
    use aria_ast::Typespec;
    use inkwell::context::Context;

    #[test]
    fn example_program_clears_every_frontend_stage() {
        let src = read_example("example.aria");
        let checked = check_source(&src);
        assert!(
            !checked.diags.has_errors(),
            "example.aria should type-check cleanly"
        );
        // `main`'s declared return type should have made it into the
        // declaration-type table the IR emitter relies on.
        let main_id = checked
            .resolved
            .arena
            .function_defs()
            .iter()
            .find(|f| f.header.name == "main")
            .map(|f| f.id)
            .expect("example.aria declares fn main");
        let main_ty = checked.decl_types.get(&main_id).expect("main has a type");
        assert!(matches!(main_ty.as_ref(), Typespec::Func { .. }));
    }

    /// spec.md concrete scenario 5: a `while` with a value-carrying `break`
    /// and no `else` is an error; adding a bare (non-block) `else 0` fixes
    /// it and the loop's type is `{integer}`, fitting the declared `i32`.
    #[test]
    fn loop_with_value_break_needs_else_bare_expression_fixes_it() {
        let missing_else = check_source("fn k() i32 { while true { break 1; } }");
        assert!(missing_else.diags.has_errors());

        let with_bare_else = check_source("fn k() i32 { while true { break 1; } else 0 }");
        assert!(!with_bare_else.diags.has_errors());
    }

    /// A pointer's own `immutable` flag governs writes through it; the
    /// reassignability of the variable holding that pointer does not.
    #[test]
    fn write_through_mut_pointer_held_by_imm_binding_is_allowed() {
        let checked = check_source(
            "fn k() void { mut x: u32 = 0; imm p: *mut u32 = &x; p.* = 5; }",
        );
        assert!(
            !checked.diags.has_errors(),
            "writing through a `*mut u32` should be legal even when the \
             pointer variable itself is declared `imm`"
        );
    }

    /// The symmetric negative case: the pointer's own flag still rejects a
    /// write, regardless of the holding variable's mutability.
    #[test]
    fn write_through_const_pointer_held_by_mut_binding_is_rejected() {
        let checked = check_source(
            "fn k() void { mut x: u32 = 0; mut p: *imm u32 = &x; p.* = 5; }",
        );
        assert!(
            checked.diags.has_errors(),
            "writing through a `*imm u32` (const pointee) should be rejected \
             even when the pointer variable itself is `mut`"
        );
    }

    #[test]
    fn type_error_example_is_rejected_with_a_located_diagnostic() {
        let src = read_example("type_error.aria");
        let checked = check_source(&src);
        assert!(checked.diags.has_errors());
        assert!(
            checked.diags.first_span().is_some(),
            "the reported error should point at a location in the source"
        );
    }

    /// The example program should not just type-check but lower to valid
    /// LLVM IR — the property the CLI's linker stage depends on.
    #[test]
    fn example_program_lowers_to_verifiable_ir() {
        let src = read_example("example.aria");
        let checked = check_source(&src);
        assert!(!checked.diags.has_errors());

        let program = aria_codegen::TypedProgram {
            files: &checked.files,
            resolved: &checked.resolved,
            decl_types: &checked.decl_types,
            table: &checked.table,
        };
        let context = Context::create();
        let module = aria_codegen::emit_module(&context, "example", &program);
        assert!(module.verify().is_ok());
        assert!(module.get_function("add").is_some());
        assert!(module.get_function("main").is_some());
    }

    #[test]
    fn importing_a_sibling_file_resolves_across_the_whole_program() {
        let checked = multi_file_check(&[
            ("lib.aria", "fn double(x: i32) i32 { return x + x; }"),
            (
                "main.aria",
                "import \"lib.aria\";\nfn main() i32 { return lib.double(21); }",
            ),
        ]);
        assert!(!checked.1.has_errors());
    }

    fn multi_file_check(
        sources: &[(&str, &str)],
    ) -> (
        aria_ast::Arena,
        aria_diagnostics::DiagnosticEngine,
    ) {
        use rustc_hash::FxHashMap;

        let mut srcs = aria_span::SrcManager::new();
        let mut diags = aria_diagnostics::DiagnosticEngine::new();
        let mut import_index = FxHashMap::default();
        let mut ids = Vec::new();
        for (name, src) in sources {
            let id = srcs.add((*name).into(), (*src).to_string());
            import_index.insert((*name).to_string(), id);
            ids.push(id);
        }

        let mut files = Vec::new();
        let mut next_id = 1;
        for &id in &ids {
            let tokens = aria_lexer::lex(srcs.get(id), id, &mut diags);
            let parsed = aria_parser::parse_source_file(id, tokens, &mut diags, next_id);
            next_id = parsed.next_id;
            files.push((id, parsed.source_file));
        }

        let resolved = aria_resolver::resolve(&files, &import_index, &mut diags);
        if !diags.has_errors() {
            let table = aria_ast::TypespecTable::new();
            aria_sema::check(&files, &resolved, &table, &mut diags);
        }
        (resolved.arena, diags)
    }
}
