//! Lexical scoping, forward declarations and symbol-reference binding.
//!
//! Two ordered passes over every `Srcfile` together, so declarations are
//! order-independent within a file and across imports:
//!
//! - **Pass 1 (declare):** bind every top-level name (function, extern
//!   function, struct, global variable, extern variable, import) into its
//!   file's module scope. Redeclarations are errors.
//! - **Pass 2 (resolve):** descend into function bodies, global
//!   initializers and typespec nodes, binding every [`SymbolExpr`] to the
//!   declaration it names and every module-qualified [`AccessExpr`] to the
//!   name it selects inside that module.

use std::rc::Rc;

use aria_ast::nodes::*;
use aria_ast::{Arena, AstNode};
use aria_diagnostics::{DiagnosticEngine, Msg};
use aria_span::SrcfileId;
use rustc_hash::FxHashMap;

use crate::binding::Binding;

type ScopeMap = FxHashMap<String, u32>;

/// Everything the type checker needs from name resolution: the id-keyed
/// binding table, each file's module scope (so the checker can resolve
/// type-level names like struct/import identifiers the same way), the
/// import target table, and an [`Arena`] pre-populated with every
/// top-level declaration (and every local variable declaration) so the
/// checker can iterate functions/structs across files and fetch a
/// declaration node back from a `sym_ref` id.
pub struct ResolvedProgram {
    pub bindings: FxHashMap<u32, Binding>,
    pub module_scopes: FxHashMap<SrcfileId, ScopeMap>,
    pub import_targets: FxHashMap<u32, SrcfileId>,
    pub arena: Arena,
}

impl ResolvedProgram {
    #[must_use]
    pub fn binding(&self, id: u32) -> Option<&Binding> {
        self.bindings.get(&id)
    }

    /// Looks up `name` in `file`'s module scope, the entry point sema uses
    /// to turn a bare type-name (`MyStruct`, an imported module) into a
    /// `Typespec` once it's established the name isn't a builtin primitive.
    #[must_use]
    pub fn lookup_module_name(&self, file: SrcfileId, name: &str) -> Option<&Binding> {
        let id = self.module_scopes.get(&file)?.get(name)?;
        self.bindings.get(id)
    }
}

pub fn resolve(
    files: &[(SrcfileId, Rc<SourceFile>)],
    import_index: &FxHashMap<String, SrcfileId>,
    diags: &mut DiagnosticEngine,
) -> ResolvedProgram {
    let mut r = Resolver {
        bindings: FxHashMap::default(),
        module_scopes: FxHashMap::default(),
        import_targets: FxHashMap::default(),
        arena: Arena::new(),
        scopes: Vec::new(),
        fn_scope_start: 0,
        diags,
    };
    for (file_id, source_file) in files {
        r.arena.add_node(AstNode::Ast(Ast::SourceFile(source_file.clone())), 0);
        r.module_scopes.insert(*file_id, ScopeMap::default());
    }
    for (file_id, source_file) in files {
        r.declare_file(*file_id, source_file, import_index);
    }
    for (file_id, source_file) in files {
        r.resolve_file(*file_id, source_file);
    }
    ResolvedProgram {
        bindings: r.bindings,
        module_scopes: r.module_scopes,
        import_targets: r.import_targets,
        arena: r.arena,
    }
}

struct Resolver<'d> {
    bindings: FxHashMap<u32, Binding>,
    module_scopes: FxHashMap<SrcfileId, ScopeMap>,
    import_targets: FxHashMap<u32, SrcfileId>,
    arena: Arena,
    /// Local scope stack, active only while resolving one function body or
    /// one global initializer at a time.
    scopes: Vec<ScopeMap>,
    /// Index into `scopes` where the current function's parameter scope
    /// starts; shadow warnings only look at scopes at or above this index,
    /// never at module scope.
    fn_scope_start: usize,
    diags: &'d mut DiagnosticEngine,
}

impl<'d> Resolver<'d> {
    // ---- pass 1: declare -------------------------------------------------

    fn declare_file(
        &mut self,
        file_id: SrcfileId,
        source_file: &Rc<SourceFile>,
        import_index: &FxHashMap<String, SrcfileId>,
    ) {
        for decl in &source_file.decls {
            self.arena.add_node(AstNode::Decl(decl.clone()), source_file.id);
            self.bindings
                .insert(decl.id(), Binding::Node(AstNode::Decl(decl.clone())));
            let (name, span) = match decl {
                Decl::VariableDecl(v) => (v.name.clone(), v.span),
                Decl::ExternVariableDecl(v) => (v.name.clone(), v.span),
                Decl::FunctionDef(f) => (f.header.name.clone(), f.header.span),
                Decl::ExternFunctionDef(f) => (f.header.name.clone(), f.header.span),
                Decl::StructDef(s) => (s.name.clone(), s.span),
                Decl::TypeAliasDecl(t) => (t.name.clone(), t.span),
                Decl::Import(i) => {
                    if let Some(&target) = import_index.get(&i.path) {
                        self.import_targets.insert(i.id, target);
                    } else {
                        self.diags.emit(Msg::error(
                            format!("cannot find imported module `{}`", i.path),
                            i.span,
                        ));
                    }
                    (i.binding.clone(), i.span)
                }
            };
            self.declare_top_level(file_id, name, span, decl.id());
        }
    }

    fn declare_top_level(&mut self, file_id: SrcfileId, name: String, span: Span, id: u32) {
        let scope = self.module_scopes.get_mut(&file_id).expect("module scope exists");
        if let Some(&prev_id) = scope.get(&name) {
            let prev_span = self.bindings.get(&prev_id).map(Binding::span);
            let mut msg = Msg::error(format!("redeclaration of `{name}`"), span);
            if let Some(prev_span) = prev_span {
                msg = msg.with_fat("previously declared here", prev_span);
            }
            self.diags.emit(msg);
            return;
        }
        scope.insert(name, id);
    }

    // ---- pass 2: resolve bodies -------------------------------------------

    fn resolve_file(&mut self, file_id: SrcfileId, source_file: &Rc<SourceFile>) {
        for decl in &source_file.decls {
            match decl {
                Decl::VariableDecl(v) => {
                    self.scopes.clear();
                    self.fn_scope_start = 0;
                    if let Some(init) = &v.initializer {
                        self.resolve_expr(init, file_id);
                    }
                    if let Some(ann) = &v.annotation {
                        self.resolve_typespec(ann, file_id);
                    }
                }
                Decl::ExternVariableDecl(v) => {
                    self.resolve_typespec(&v.annotation, file_id);
                }
                Decl::FunctionDef(f) => self.resolve_function(f, file_id),
                Decl::ExternFunctionDef(f) => {
                    for p in &f.header.params {
                        self.resolve_typespec(&p.annotation, file_id);
                    }
                    if let Some(ret) = &f.header.ret {
                        self.resolve_typespec(ret, file_id);
                    }
                }
                Decl::StructDef(s) => {
                    for field in &s.fields {
                        self.resolve_typespec(&field.annotation, file_id);
                    }
                }
                Decl::TypeAliasDecl(t) => self.resolve_typespec(&t.annotation, file_id),
                Decl::Import(_) => {}
            }
        }
    }

    fn resolve_function(&mut self, f: &Rc<FunctionDef>, file_id: SrcfileId) {
        self.scopes.clear();
        self.fn_scope_start = 0;
        let mut params_scope = ScopeMap::default();
        for p in &f.header.params {
            self.resolve_typespec(&p.annotation, file_id);
            if params_scope.insert(p.name.clone(), p.id).is_some() {
                self.diags.emit(Msg::error(
                    format!("duplicate parameter `{}`", p.name),
                    p.span,
                ));
            } else {
                self.bindings.insert(p.id, Binding::Param(p.clone()));
            }
        }
        if let Some(ret) = &f.header.ret {
            self.resolve_typespec(ret, file_id);
        }
        self.scopes.push(params_scope);
        self.resolve_block(&f.body, file_id);
        self.scopes.pop();
    }

    fn resolve_block(&mut self, block: &Rc<BlockExpr>, file_id: SrcfileId) {
        self.scopes.push(ScopeMap::default());
        for stmt in &block.statements {
            self.resolve_statement(stmt, file_id);
        }
        if let Some(trailing) = &block.trailing {
            self.resolve_expr(trailing, file_id);
        }
        self.scopes.pop();
    }

    fn resolve_statement(&mut self, stmt: &Statement, file_id: SrcfileId) {
        match stmt {
            Statement::VariableDecl(v) => {
                if let Some(init) = &v.initializer {
                    self.resolve_expr(init, file_id);
                }
                if let Some(ann) = &v.annotation {
                    self.resolve_typespec(ann, file_id);
                }
                self.declare_local(v);
            }
            Statement::ExpressionStatement(e) => self.resolve_expr(&e.expression, file_id),
        }
    }

    fn declare_local(&mut self, v: &Rc<VariableDeclStmt>) {
        let innermost = self.scopes.last_mut().expect("inside a block scope");
        if innermost.contains_key(&v.name) {
            self.diags.emit(Msg::error(
                format!("redeclaration of `{}` in the same block", v.name),
                v.span,
            ));
            return;
        }
        if self.shadows_outer_local(&v.name) {
            self.diags.emit(Msg::warning(
                format!("`{}` shadows a local from an enclosing scope", v.name),
                v.span,
            ));
        }
        self.bindings.insert(
            v.id,
            Binding::Node(AstNode::Statement(Statement::VariableDecl(v.clone()))),
        );
        self.scopes
            .last_mut()
            .expect("inside a block scope")
            .insert(v.name.clone(), v.id);
    }

    /// Outer scopes of the *same function* only — params and enclosing
    /// blocks, never module scope, matching spec section 4.4's "warning
    /// when a local shadows a symbol visible through an outer scope of the
    /// same function (not when shadowing module-level names)".
    fn shadows_outer_local(&self, name: &str) -> bool {
        let outer_end = self.scopes.len().saturating_sub(1);
        self.scopes[self.fn_scope_start..outer_end]
            .iter()
            .any(|s| s.contains_key(name))
    }

    fn lookup(&self, file_id: SrcfileId, name: &str) -> Option<u32> {
        for scope in self.scopes.iter().rev() {
            if let Some(&id) = scope.get(name) {
                return Some(id);
            }
        }
        self.module_scopes.get(&file_id)?.get(name).copied()
    }

    // ---- expressions -------------------------------------------------------

    fn resolve_expr(&mut self, expr: &Expression, file_id: SrcfileId) {
        match expr {
            Expression::IntegerLiteral(_)
            | Expression::StringLiteral(_)
            | Expression::CharLiteral(_)
            | Expression::BuiltinSymbol(_)
            | Expression::Continue(_) => {}
            Expression::ArrayLiteral(a) => {
                if let Some(ty) = &a.element_type {
                    self.resolve_typespec(ty, file_id);
                }
                for el in &a.elements {
                    self.resolve_expr(el, file_id);
                }
            }
            Expression::TupleLiteral(t) => {
                for el in &t.elements {
                    self.resolve_expr(el, file_id);
                }
            }
            Expression::AggregateLiteral(a) => {
                self.resolve_typespec(&a.struct_name, file_id);
                for (_, _, value) in &a.fields {
                    self.resolve_expr(value, file_id);
                }
            }
            Expression::Symbol(sym) => match self.lookup(file_id, &sym.name) {
                Some(id) => *sym.sym_ref.borrow_mut() = Some(id),
                None => {
                    self.diags
                        .emit(Msg::error(format!("undeclared symbol `{}`", sym.name), sym.span));
                }
            },
            Expression::Unary(u) => self.resolve_expr(&u.operand, file_id),
            Expression::Deref(d) => self.resolve_expr(&d.operand, file_id),
            Expression::Index(i) => {
                self.resolve_expr(&i.base, file_id);
                self.resolve_expr(&i.index, file_id);
            }
            Expression::Access(a) => {
                self.resolve_expr(&a.base, file_id);
                self.resolve_module_access(a);
            }
            Expression::ArithmeticBinop(b) => {
                self.resolve_expr(&b.left, file_id);
                self.resolve_expr(&b.right, file_id);
            }
            Expression::BooleanBinop(b) => {
                self.resolve_expr(&b.left, file_id);
                self.resolve_expr(&b.right, file_id);
            }
            Expression::ComparisonBinop(b) => {
                self.resolve_expr(&b.left, file_id);
                self.resolve_expr(&b.right, file_id);
            }
            Expression::Assign(a) => {
                self.resolve_expr(&a.target, file_id);
                self.resolve_expr(&a.value, file_id);
            }
            Expression::Cast(c) => {
                self.resolve_expr(&c.operand, file_id);
                self.resolve_typespec(&c.target, file_id);
            }
            Expression::Call(c) => {
                self.resolve_expr(&c.callee, file_id);
                for arg in &c.args {
                    self.resolve_expr(arg, file_id);
                }
            }
            Expression::Block(b) => self.resolve_block(b, file_id),
            Expression::If(i) => {
                self.resolve_expr(&i.condition, file_id);
                self.resolve_block(&i.then_branch, file_id);
                if let Some(e) = &i.else_branch {
                    self.resolve_expr(e, file_id);
                }
            }
            Expression::While(w) => {
                self.resolve_expr(&w.condition, file_id);
                self.resolve_block(&w.body, file_id);
                if let Some(e) = &w.else_branch {
                    self.resolve_expr(e, file_id);
                }
            }
            Expression::For(f) => {
                self.scopes.push(ScopeMap::default());
                for stmt in &f.init {
                    self.resolve_statement(stmt, file_id);
                }
                if let Some(cond) = &f.condition {
                    self.resolve_expr(cond, file_id);
                }
                for stmt in &f.step {
                    self.resolve_statement(stmt, file_id);
                }
                self.resolve_block(&f.body, file_id);
                if let Some(e) = &f.else_branch {
                    self.resolve_expr(e, file_id);
                }
                self.scopes.pop();
            }
            Expression::Break(b) => {
                if let Some(v) = &b.value {
                    self.resolve_expr(v, file_id);
                }
            }
            Expression::Return(r) => {
                if let Some(v) = &r.value {
                    self.resolve_expr(v, file_id);
                }
            }
            Expression::Typespec(t) => self.resolve_typespec(t, file_id),
        }
    }

    /// If `access.base` is a bare symbol bound to an `import`, this is a
    /// module-qualified name (`foo.bar`) and resolvable now, without typing:
    /// look `access.name` up in the imported file's module scope and record
    /// it on `acc_resolved`. Anything else (struct field, slice `.ptr`/`.len`)
    /// needs the base's type and is left for the checker.
    fn resolve_module_access(&mut self, access: &Rc<AccessExpr>) {
        let Expression::Symbol(base_sym) = &access.base else {
            return;
        };
        let Some(base_id) = *base_sym.sym_ref.borrow() else {
            return;
        };
        let Some(binding) = self.bindings.get(&base_id) else {
            return;
        };
        if !binding.is_import() {
            return;
        }
        let Some(&target_file) = self.import_targets.get(&base_id) else {
            return;
        };
        match self.module_scopes.get(&target_file).and_then(|s| s.get(&access.name)) {
            Some(&id) => *access.acc_resolved.borrow_mut() = Some(id),
            None => {
                self.diags.emit(Msg::error(
                    format!("module has no member `{}`", access.name),
                    access.span,
                ));
            }
        }
    }

    // ---- typespec syntax -----------------------------------------------------

    fn resolve_typespec(&mut self, ts: &TypespecSyntax, file_id: SrcfileId) {
        match ts {
            TypespecSyntax::PrimRef(_) => {}
            TypespecSyntax::Pointer(p) => self.resolve_typespec(&p.child, file_id),
            TypespecSyntax::MultiPointer(p) => self.resolve_typespec(&p.child, file_id),
            TypespecSyntax::Slice(s) => self.resolve_typespec(&s.child, file_id),
            TypespecSyntax::Array(a) => {
                self.resolve_expr(&a.size, file_id);
                self.resolve_typespec(&a.child, file_id);
            }
            TypespecSyntax::Func(f) => {
                for p in &f.params {
                    self.resolve_typespec(p, file_id);
                }
                if let Some(ret) = &f.ret {
                    self.resolve_typespec(ret, file_id);
                }
            }
            TypespecSyntax::Tuple(t) => {
                for el in &t.elements {
                    self.resolve_typespec(el, file_id);
                }
            }
            TypespecSyntax::GenericApp(g) => {
                self.resolve_typespec(&g.base, file_id);
                for arg in &g.args {
                    self.resolve_typespec(arg, file_id);
                }
            }
        }
    }
}
