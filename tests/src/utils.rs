use std::path::PathBuf;
use std::rc::Rc;

use aria_ast::{Typespec, TypespecTable};
use aria_diagnostics::DiagnosticEngine;
use aria_resolver::ResolvedProgram;
use aria_span::{SrcManager, SrcfileId};
use rustc_hash::FxHashMap;

pub(crate) fn get_test_data_path() -> std::path::PathBuf {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::current_dir().unwrap());
    manifest_dir.join("test_data").join("aria")
}

/// Result of running every frontend stage over one or more in-memory
/// sources, bundled so a test can inspect diagnostics and (if the program
/// type-checked) the resolved/typed program together.
pub(crate) struct Checked {
    pub srcs: SrcManager,
    pub diags: DiagnosticEngine,
    pub files: Vec<(SrcfileId, Rc<aria_ast::SourceFile>)>,
    pub resolved: ResolvedProgram,
    pub table: TypespecTable,
    pub decl_types: FxHashMap<u32, Rc<Typespec>>,
}

/// Lexes, parses, resolves and type-checks a single-file program, stopping
/// at whichever stage first reports an error.
pub(crate) fn check_source(src: &str) -> Checked {
    let mut srcs = SrcManager::new();
    let id = srcs.add("t.aria".into(), src.to_string());
    let mut diags = DiagnosticEngine::new();

    let tokens = aria_lexer::lex(srcs.get(id), id, &mut diags);
    let parsed = aria_parser::parse_source_file(id, tokens, &mut diags, 1);
    let files = vec![(id, parsed.source_file)];

    let import_index = FxHashMap::default();
    let resolved = aria_resolver::resolve(&files, &import_index, &mut diags);
    let table = TypespecTable::new();
    let decl_types = if diags.has_errors() {
        FxHashMap::default()
    } else {
        aria_sema::check(&files, &resolved, &table, &mut diags)
    };

    Checked { srcs, diags, files, resolved, table, decl_types }
}

pub(crate) fn read_example(name: &str) -> String {
    std::fs::read_to_string(get_test_data_path().join(name))
        .unwrap_or_else(|e| panic!("failed to read test_data/aria/{name}: {e}"))
}
