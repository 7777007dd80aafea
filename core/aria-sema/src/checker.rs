//! The bidirectional type checker.
//!
//! Three passes over every file, per the top-level checking order: Prec 1
//! installs placeholder typespecs for structs (nominal identity needs no
//! field information up front); Prec 2 resolves every annotated type
//! (variables, extern declarations, function headers, struct fields); the
//! body pass walks every function definition and global initializer with
//! full expression typing, maintaining the loop/function stacks that
//! `break`/`continue`/`return` thread back-pointers through.

use std::rc::Rc;

use aria_ast::nodes::*;
use aria_ast::typespec::PrimIntKind;
use aria_ast::{AcceptKind, PrimKind, Typespec, TypespecTable};
use aria_bigint::BigInt;
use aria_diagnostics::{DiagnosticEngine, Msg};
use aria_resolver::{Binding, ResolvedProgram};
use aria_span::{SrcfileId, Span};
use rustc_hash::FxHashMap;

use crate::assign::{assign, exact_eq, AssignResult};

/// Runs all three checking passes (Prec 1, Prec 2, body pass) and returns
/// the declaration-type table the pass built: every struct, global,
/// function (its whole `Func` type), extern declaration, parameter and
/// struct field's resolved `Typespec`, keyed by node id. Expression nodes
/// record their own type on themselves (`node.typespec()`); this table is
/// the only way to recover types for nodes that aren't expressions, which
/// the IR emitter needs for function signatures and struct layouts.
pub fn check(
    files: &[(SrcfileId, Rc<SourceFile>)],
    resolved: &ResolvedProgram,
    table: &TypespecTable,
    diags: &mut DiagnosticEngine,
) -> FxHashMap<u32, Rc<Typespec>> {
    let mut c = Checker {
        table,
        resolved,
        diags,
        type_cache: FxHashMap::default(),
        loop_stack: Vec::new(),
        func_stack: Vec::new(),
    };
    c.prec1();
    c.prec2(files);
    c.body_pass(files);
    c.type_cache
}

struct LoopCtx {
    id: u32,
    breaks: Vec<(Rc<Typespec>, Span)>,
}

struct FuncCtx {
    id: u32,
    ret: Rc<Typespec>,
}

struct Checker<'a> {
    table: &'a TypespecTable,
    resolved: &'a ResolvedProgram,
    diags: &'a mut DiagnosticEngine,
    /// Resolved typespecs keyed by the declaring node's own id: struct defs,
    /// type aliases, function defs (their whole `Func` type), params,
    /// global/local variables, extern variables, struct fields. Node ids are
    /// unique across the whole compilation, so one flat map suffices.
    type_cache: FxHashMap<u32, Rc<Typespec>>,
    loop_stack: Vec<LoopCtx>,
    func_stack: Vec<FuncCtx>,
}

impl<'a> Checker<'a> {
    // ---- Prec 1: struct names -------------------------------------------

    fn prec1(&mut self) {
        for s in self.resolved.arena.struct_defs() {
            self.type_cache
                .entry(s.id)
                .or_insert_with(|| Rc::new(Typespec::Struct { decl: s.id }));
        }
    }

    // ---- Prec 2: annotated types -----------------------------------------

    fn prec2(&mut self, files: &[(SrcfileId, Rc<SourceFile>)]) {
        for (file_id, source_file) in files {
            for decl in &source_file.decls {
                self.prec2_decl(decl, *file_id);
            }
        }
    }

    fn prec2_decl(&mut self, decl: &Decl, file_id: SrcfileId) {
        match decl {
            Decl::VariableDecl(v) => {
                if let Some(ann) = &v.annotation {
                    if let Some(ty) = self.resolve_typespec_syntax(ann, file_id) {
                        self.type_cache.insert(v.id, ty);
                    }
                }
            }
            Decl::ExternVariableDecl(v) => {
                if let Some(ty) = self.resolve_typespec_syntax(&v.annotation, file_id) {
                    self.type_cache.insert(v.id, ty);
                }
            }
            Decl::FunctionDef(f) => {
                let ty = self.resolve_function_header(&f.header, file_id);
                self.type_cache.insert(f.id, ty);
            }
            Decl::ExternFunctionDef(f) => {
                let ty = self.resolve_function_header(&f.header, file_id);
                self.type_cache.insert(f.id, ty);
            }
            Decl::StructDef(s) => {
                for field in &s.fields {
                    if let Some(ty) = self.resolve_typespec_syntax(&field.annotation, file_id) {
                        self.type_cache.insert(field.id, ty);
                    }
                }
            }
            Decl::TypeAliasDecl(t) => {
                if !self.type_cache.contains_key(&t.id) {
                    if let Some(ty) = self.resolve_typespec_syntax(&t.annotation, file_id) {
                        self.type_cache.insert(t.id, ty);
                    }
                }
            }
            Decl::Import(_) => {}
        }
    }

    fn resolve_function_header(&mut self, header: &Rc<FunctionHeader>, file_id: SrcfileId) -> Rc<Typespec> {
        let mut params = Vec::with_capacity(header.params.len());
        for p in &header.params {
            let ty = self
                .resolve_typespec_syntax(&p.annotation, file_id)
                .unwrap_or_else(|| self.table.void());
            self.type_cache.insert(p.id, Rc::clone(&ty));
            params.push(ty);
        }
        let ret = match &header.ret {
            Some(r) => self
                .resolve_typespec_syntax(r, file_id)
                .unwrap_or_else(|| self.table.void()),
            None => self.table.void(),
        };
        Rc::new(Typespec::Func { params, ret })
    }

    // ---- body pass ----------------------------------------------------------

    fn body_pass(&mut self, files: &[(SrcfileId, Rc<SourceFile>)]) {
        for (file_id, source_file) in files {
            for decl in &source_file.decls {
                match decl {
                    Decl::VariableDecl(v) => self.check_global_var(v, *file_id),
                    Decl::FunctionDef(f) => self.check_function(f, *file_id),
                    _ => {}
                }
            }
        }
    }

    fn check_global_var(&mut self, v: &Rc<VariableDeclStmt>, file_id: SrcfileId) {
        let target = self.type_cache.get(&v.id).cloned();
        let Some(init) = &v.initializer else { return };
        let Some(ty) = self.check_expr(init, target.as_ref(), file_id) else {
            return;
        };
        if ty.accept_kind() != AcceptKind::Comptime {
            self.diags.emit(Msg::error(
                "global initializer must be a compile-time constant",
                init.span(),
            ));
        }
        if target.is_none() {
            self.type_cache.insert(v.id, ty);
        }
    }

    fn check_function(&mut self, f: &Rc<FunctionDef>, file_id: SrcfileId) {
        let ret = match self.type_cache.get(&f.id).map(Rc::as_ref) {
            Some(Typespec::Func { ret, .. }) => Rc::clone(ret),
            _ => self.table.void(),
        };
        self.func_stack.push(FuncCtx { id: f.id, ret });
        self.check_block(&f.body, None, file_id);
        self.func_stack.pop();
    }

    // ---- blocks & statements -------------------------------------------------

    fn check_block(&mut self, block: &Rc<BlockExpr>, target: Option<&Rc<Typespec>>, file_id: SrcfileId) -> Rc<Typespec> {
        let mut diverged = false;
        for stmt in &block.statements {
            if diverged {
                self.diags.emit(Msg::error("unreachable code", stmt.span()));
            }
            if self.check_statement(stmt, file_id) {
                diverged = true;
            }
        }
        let result = if let Some(trailing) = &block.trailing {
            if diverged {
                self.diags.emit(Msg::error("unreachable code", trailing.span()));
            }
            let ty = self
                .check_expr(trailing, target, file_id)
                .unwrap_or_else(|| self.table.void());
            if matches!(ty.as_ref(), Typespec::Noreturn) {
                diverged = true;
            }
            ty
        } else if diverged {
            self.table.noreturn()
        } else {
            self.table.void()
        };
        block.set_typespec(Rc::clone(&result));
        result
    }

    /// Returns whether this statement diverges (its expression's type is
    /// `noreturn`), so the block can flag subsequent statements as
    /// unreachable.
    fn check_statement(&mut self, stmt: &Statement, file_id: SrcfileId) -> bool {
        match stmt {
            Statement::VariableDecl(v) => {
                let annotated = v
                    .annotation
                    .as_ref()
                    .and_then(|a| self.resolve_typespec_syntax(a, file_id));
                let init_ty = v
                    .initializer
                    .as_ref()
                    .and_then(|init| self.check_expr(init, annotated.as_ref(), file_id));
                let final_ty = annotated.or(init_ty).unwrap_or_else(|| self.table.void());
                v.set_typespec(Rc::clone(&final_ty));
                self.type_cache.insert(v.id, final_ty);
                false
            }
            Statement::ExpressionStatement(e) => {
                let ty = self.check_expr(&e.expression, None, file_id);
                matches!(ty.as_deref(), Some(Typespec::Noreturn))
            }
        }
    }

    // ---- expressions -------------------------------------------------------

    fn check_expr(&mut self, expr: &Expression, target: Option<&Rc<Typespec>>, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        if let Expression::Typespec(ts) = expr {
            // Shares its node with the typespec-syntax view (an `@inner_enum`
            // variant); the typespec already recorded by `resolve_typespec_syntax`
            // below *is* this expression's type, so no re-wrapping/re-recording.
            return self.resolve_typespec_syntax(ts, file_id);
        }
        let ty = match expr {
            Expression::IntegerLiteral(n) => Some(self.table.comptime_integer(n.value.clone())),
            Expression::StringLiteral(n) => {
                let len = BigInt::from_u64(n.value.len() as u64);
                Some(Rc::new(Typespec::Ptr {
                    immutable: true,
                    child: Rc::new(Typespec::Array { size: len, child: self.table.int(PrimIntKind::U8) }),
                }))
            }
            Expression::CharLiteral(n) => Some(self.table.comptime_integer(BigInt::from_u64(u64::from(n.value)))),
            Expression::ArrayLiteral(a) => self.check_array_literal(a, target, file_id),
            Expression::TupleLiteral(t) => {
                for el in &t.elements {
                    self.check_expr(el, None, file_id);
                }
                self.diags.emit(Msg::error("tuple values are not supported", t.span));
                None
            }
            Expression::AggregateLiteral(a) => self.check_aggregate_literal(a, file_id),
            Expression::Symbol(sym) => self.check_symbol(sym),
            Expression::BuiltinSymbol(b) => self.check_builtin_symbol(b),
            Expression::Unary(u) => self.check_unary(u, file_id),
            Expression::Deref(d) => self.check_deref(d, file_id),
            Expression::Index(i) => self.check_index(i, file_id),
            Expression::Access(a) => self.check_access(a, file_id),
            Expression::ArithmeticBinop(b) => self.check_arith_binop(b, file_id),
            Expression::BooleanBinop(b) => self.check_bool_binop(b, file_id),
            Expression::ComparisonBinop(b) => self.check_cmp_binop(b, file_id),
            Expression::Assign(a) => self.check_assign_expr(a, file_id),
            Expression::Cast(c) => self.check_cast(c, file_id),
            Expression::Call(c) => self.check_call(c, file_id),
            Expression::Block(b) => Some(self.check_block(b, target, file_id)),
            Expression::If(i) => self.check_if(i, target, file_id),
            Expression::While(w) => self.check_while(w, target, file_id),
            Expression::For(f) => self.check_for(f, target, file_id),
            Expression::Break(b) => self.check_break(b, file_id),
            Expression::Continue(c) => self.check_continue(c),
            Expression::Return(r) => self.check_return(r, file_id),
            Expression::Typespec(_) => unreachable!("handled above"),
        };
        if let Some(ty) = &ty {
            record(expr, Rc::clone(ty));
        }
        ty
    }

    fn check_array_literal(&mut self, a: &Rc<ArrayLiteralExpr>, target: Option<&Rc<Typespec>>, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        let explicit_elem = a.element_type.as_ref().and_then(|ts| self.resolve_typespec_syntax(ts, file_id));
        let target_elem = target.and_then(|t| match t.as_ref() {
            Typespec::Array { child, .. } => Some(Rc::clone(child)),
            _ => None,
        });
        let mut elem_ty = explicit_elem.clone().or_else(|| target_elem.clone());

        if a.elements.is_empty() {
            return match elem_ty {
                Some(t) => Some(Rc::new(Typespec::Array { size: BigInt::zero(), child: t })),
                None => {
                    self.diags.emit(Msg::error(
                        "empty array literal needs an explicit element type or target type",
                        a.span,
                    ));
                    None
                }
            };
        }

        let mut all_comptime = true;
        for el in &a.elements {
            let want = elem_ty.clone();
            let Some(ty) = self.check_expr(el, want.as_ref(), file_id) else {
                continue;
            };
            if ty.accept_kind() != AcceptKind::Comptime {
                all_comptime = false;
            }
            match elem_ty.clone() {
                None => elem_ty = Some(ty),
                Some(want_ty) => match assign(self.diags, el.span(), &ty, &want_ty, true) {
                    AssignResult::Ok(t) => elem_ty = Some(t),
                    AssignResult::Mismatch => {
                        self.diags.emit(Msg::error(
                            format!("type mismatch: {} and {}", ty.display(), want_ty.display()),
                            el.span(),
                        ));
                    }
                    AssignResult::ConstViolation => {
                        self.diags.emit(
                            Msg::error(
                                format!("type mismatch: {} and {}", ty.display(), want_ty.display()),
                                el.span(),
                            )
                            .with_thin("type mismatch due to change in immutability"),
                        );
                    }
                    AssignResult::Reported => {}
                },
            }
        }
        if all_comptime && explicit_elem.is_none() && target_elem.is_none() {
            self.diags.emit(Msg::error("elements are unsized and no type annotation provided", a.span));
            return None;
        }
        let elem_ty = elem_ty?;
        Some(Rc::new(Typespec::Array { size: BigInt::from_u64(a.elements.len() as u64), child: elem_ty }))
    }

    fn check_aggregate_literal(&mut self, a: &Rc<AggregateLiteralExpr>, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        let struct_ty = self.resolve_typespec_syntax(&a.struct_name, file_id)?;
        let decl_id = match struct_ty.as_ref() {
            Typespec::Struct { decl } => *decl,
            _ => {
                self.diags.emit(Msg::error(
                    format!("`{}` is not a struct type", struct_ty.display()),
                    a.struct_name.span(),
                ));
                return None;
            }
        };
        let Some(AstNode::Decl(Decl::StructDef(s))) = self.resolved.arena.find_node(decl_id) else {
            return None;
        };
        let s = Rc::clone(s);
        for (name, span, value) in &a.fields {
            match s.fields.iter().find(|f| &f.name == name) {
                Some(f) => {
                    let want = self.type_cache.get(&f.id).cloned();
                    self.check_expr(value, want.as_ref(), file_id);
                }
                None => {
                    self.diags.emit(Msg::error(format!("struct has no field `{name}`"), *span));
                    self.check_expr(value, None, file_id);
                }
            }
        }
        Some(struct_ty)
    }

    fn check_symbol(&mut self, sym: &Rc<SymbolExpr>) -> Option<Rc<Typespec>> {
        let id = (*sym.sym_ref.borrow())?;
        let binding = self.resolved.binding(id)?;
        self.type_of_binding(binding, id)
    }

    fn check_builtin_symbol(&mut self, b: &Rc<BuiltinSymbolExpr>) -> Option<Rc<Typespec>> {
        match b.kind {
            BuiltinSymbolKind::True | BuiltinSymbolKind::False => Some(self.table.bool_()),
            BuiltinSymbolKind::Void => Some(Rc::new(Typespec::Type { inner: self.table.void() })),
            BuiltinSymbolKind::Noreturn => Some(Rc::new(Typespec::Type { inner: self.table.noreturn() })),
            BuiltinSymbolKind::PrimType => match self.table.by_name(&b.name) {
                Some(p) => Some(Rc::new(Typespec::Type { inner: p })),
                None => {
                    self.diags.emit(Msg::error(format!("unknown primitive type `{}`", b.name), b.span));
                    None
                }
            },
        }
    }

    fn type_of_binding(&mut self, binding: &Binding, id: u32) -> Option<Rc<Typespec>> {
        match binding {
            Binding::Param(p) => self.type_cache.get(&p.id).cloned(),
            Binding::Node(AstNode::Decl(Decl::Import(i))) => {
                let target = *self.resolved.import_targets.get(&i.id)?;
                Some(Rc::new(Typespec::Module { srcfile: target }))
            }
            Binding::Node(_) => self.type_cache.get(&id).cloned(),
        }
    }

    fn check_unary(&mut self, u: &Rc<UnaryExpr>, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        match u.op {
            UnaryOp::Neg => {
                let ty = self.check_expr(&u.operand, None, file_id)?;
                match ty.as_ref() {
                    Typespec::Prim(PrimKind::ComptimeInteger(v)) => Some(self.table.comptime_integer(v.neg())),
                    Typespec::Prim(PrimKind::Int(k)) if k.signed() => Some(Rc::clone(&ty)),
                    _ => {
                        self.diags.emit(Msg::error("unary `-` requires a signed integer", u.operand.span()));
                        None
                    }
                }
            }
            UnaryOp::Not => {
                let ty = self.check_expr(&u.operand, None, file_id)?;
                if !matches!(ty.as_ref(), Typespec::Prim(PrimKind::Bool)) {
                    self.diags.emit(Msg::error("unary `!` requires bool", u.operand.span()));
                    return None;
                }
                Some(self.table.bool_())
            }
            UnaryOp::AddrOf => {
                let ty = self.check_expr(&u.operand, None, file_id)?;
                match self.lvalue_immutability(&u.operand) {
                    Some(immutable) => Some(Rc::new(Typespec::Ptr { immutable, child: ty })),
                    None => {
                        self.diags.emit(Msg::error("cannot take the address of a non-l-value", u.operand.span()));
                        None
                    }
                }
            }
        }
    }

    fn check_deref(&mut self, d: &Rc<DerefExpr>, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        let ty = self.check_expr(&d.operand, None, file_id)?;
        match ty.as_ref() {
            Typespec::Ptr { child, .. } => Some(Rc::clone(child)),
            _ => {
                self.diags.emit(Msg::error("cannot dereference a non-pointer type", d.operand.span()));
                None
            }
        }
    }

    fn check_index(&mut self, i: &Rc<IndexExpr>, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        let base_ty = self.check_expr(&i.base, None, file_id)?;
        let elem = match base_ty.as_ref() {
            Typespec::MultiPtr { child, .. } | Typespec::Slice { child, .. } | Typespec::Array { child, .. } => {
                Rc::clone(child)
            }
            Typespec::Ptr { child, .. } if matches!(child.as_ref(), Typespec::Array { .. }) => {
                let Typespec::Array { child, .. } = child.as_ref() else { unreachable!() };
                Rc::clone(child)
            }
            _ => {
                self.diags.emit(Msg::error("cannot index this type", i.base.span()));
                return None;
            }
        };
        let idx_ty = self.check_expr(&i.index, None, file_id)?;
        let ok = match idx_ty.as_ref() {
            Typespec::Prim(PrimKind::ComptimeInteger(v)) => !v.is_negative(),
            Typespec::Prim(PrimKind::Int(k)) => !k.signed(),
            _ => false,
        };
        if !ok {
            self.diags.emit(Msg::error("array index must be an unsigned-compatible integer", i.index.span()));
            return None;
        }
        Some(elem)
    }

    fn check_access(&mut self, a: &Rc<AccessExpr>, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        if let Some(resolved_id) = *a.acc_resolved.borrow() {
            let binding = self.resolved.binding(resolved_id)?;
            return self.type_of_binding(binding, resolved_id);
        }
        let base_ty = self.check_expr(&a.base, None, file_id)?;
        match base_ty.as_ref() {
            Typespec::Struct { decl } => self.struct_field_type(*decl, a),
            Typespec::Ptr { child, .. } if matches!(child.as_ref(), Typespec::Struct { .. }) => {
                let Typespec::Struct { decl } = child.as_ref() else { unreachable!() };
                self.struct_field_type(*decl, a)
            }
            Typespec::Slice { immutable, child } => match a.name.as_str() {
                "ptr" => Some(Rc::new(Typespec::MultiPtr { immutable: *immutable, child: Rc::clone(child) })),
                "len" => Some(self.table.int(PrimIntKind::U64)),
                other => {
                    self.diags.emit(Msg::error(format!("slice has no field `{other}`"), a.span));
                    None
                }
            },
            Typespec::Module { srcfile } => {
                let target = *srcfile;
                match self.resolved.lookup_module_name(target, &a.name) {
                    Some(binding) => {
                        let member_id = binding.id();
                        self.type_of_binding(binding, member_id)
                    }
                    None => {
                        self.diags.emit(Msg::error(format!("module has no member `{}`", a.name), a.span));
                        None
                    }
                }
            }
            _ => {
                self.diags.emit(Msg::error(format!("`{}` has no fields", base_ty.display()), a.base.span()));
                None
            }
        }
    }

    fn struct_field_type(&mut self, decl: u32, a: &Rc<AccessExpr>) -> Option<Rc<Typespec>> {
        let Some(AstNode::Decl(Decl::StructDef(s))) = self.resolved.arena.find_node(decl) else {
            return None;
        };
        let s = Rc::clone(s);
        match s.fields.iter().position(|f| f.name == a.name) {
            Some(idx) => {
                *a.field_index.borrow_mut() = Some(idx as u32);
                self.type_cache.get(&s.fields[idx].id).cloned()
            }
            None => {
                self.diags.emit(Msg::error(format!("struct has no field `{}`", a.name), a.span));
                None
            }
        }
    }

    fn check_arith_binop(&mut self, b: &Rc<ArithBinopExpr>, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        let lt = self.check_expr(&b.left, None, file_id)?;
        let rt = self.check_expr(&b.right, None, file_id)?;
        let l_ct = lt.is_comptime_integer();
        let r_ct = rt.is_comptime_integer();
        if l_ct && r_ct {
            let (Typespec::Prim(PrimKind::ComptimeInteger(lv)), Typespec::Prim(PrimKind::ComptimeInteger(rv))) =
                (lt.as_ref(), rt.as_ref())
            else {
                unreachable!()
            };
            return self.fold_comptime(b.op, lv, rv, b.span);
        }
        if l_ct != r_ct {
            let (from, to, span) = if l_ct { (&lt, &rt, b.left.span()) } else { (&rt, &lt, b.right.span()) };
            return match assign(self.diags, span, from, to, false) {
                AssignResult::Ok(t) => {
                    if matches!(t.as_ref(), Typespec::Prim(PrimKind::Int(_))) {
                        Some(t)
                    } else {
                        self.diags.emit(Msg::error("arithmetic requires integer operands", b.span));
                        None
                    }
                }
                _ => None,
            };
        }
        match (lt.as_ref(), rt.as_ref()) {
            (Typespec::Prim(PrimKind::Int(_)), Typespec::Prim(PrimKind::Int(_))) => {
                match assign(self.diags, b.span, &lt, &rt, true) {
                    AssignResult::Ok(t) => Some(t),
                    AssignResult::Mismatch => {
                        self.diags.emit(Msg::error(
                            format!("type mismatch: {} and {}", lt.display(), rt.display()),
                            b.span,
                        ));
                        None
                    }
                    _ => None,
                }
            }
            _ => {
                self.diags.emit(Msg::error("arithmetic requires integer operands", b.span));
                None
            }
        }
    }

    fn fold_comptime(&mut self, op: ArithOp, l: &BigInt, r: &BigInt, span: Span) -> Option<Rc<Typespec>> {
        let result = match op {
            ArithOp::Add => Ok(l.add(r)),
            ArithOp::Sub => Ok(l.sub(r)),
            ArithOp::Mul => Ok(l.mul(r)),
            ArithOp::Div => l.div(r),
            ArithOp::Mod => l.rem(r),
        };
        match result {
            Ok(v) => Some(self.table.comptime_integer(v)),
            Err(_) => {
                self.diags.emit(Msg::error("division by zero", span));
                None
            }
        }
    }

    fn check_bool_binop(&mut self, b: &Rc<BoolBinopExpr>, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        let lt = self.check_expr(&b.left, None, file_id)?;
        let rt = self.check_expr(&b.right, None, file_id)?;
        if !matches!(lt.as_ref(), Typespec::Prim(PrimKind::Bool)) {
            self.diags.emit(Msg::error("boolean operator requires bool operands", b.left.span()));
            return None;
        }
        if !matches!(rt.as_ref(), Typespec::Prim(PrimKind::Bool)) {
            self.diags.emit(Msg::error("boolean operator requires bool operands", b.right.span()));
            return None;
        }
        Some(self.table.bool_())
    }

    fn check_cmp_binop(&mut self, b: &Rc<CmpBinopExpr>, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        let lt = self.check_expr(&b.left, None, file_id)?;
        let rt = self.check_expr(&b.right, None, file_id)?;
        let is_int = |t: &Typespec| matches!(t, Typespec::Prim(PrimKind::Int(_)) | Typespec::Prim(PrimKind::ComptimeInteger(_)));
        let ordering = matches!(b.op, CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge);
        let ok = if ordering {
            is_int(&lt) && is_int(&rt)
        } else {
            let both_bool = matches!(lt.as_ref(), Typespec::Prim(PrimKind::Bool)) && matches!(rt.as_ref(), Typespec::Prim(PrimKind::Bool));
            let both_ptr = matches!(lt.as_ref(), Typespec::Ptr { .. } | Typespec::MultiPtr { .. }) && exact_eq(&lt, &rt);
            both_bool || (is_int(&lt) && is_int(&rt)) || both_ptr
        };
        if !ok {
            let what = if ordering { "ordering" } else { "equality" };
            self.diags.emit(Msg::error(format!("{what} comparison requires matching comparable operands"), b.span));
            return None;
        }
        let peer = match assign(self.diags, b.span, &lt, &rt, true) {
            AssignResult::Ok(t) => t,
            _ => Rc::clone(&rt),
        };
        *b.operand_typespec.borrow_mut() = Some(peer);
        Some(self.table.bool_())
    }

    fn check_assign_expr(&mut self, a: &Rc<AssignExpr>, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        let target_ty = self.check_expr(&a.target, None, file_id)?;
        match self.lvalue_immutability(&a.target) {
            Some(true) => {
                let mut msg = Msg::error("cannot assign to immutable", a.target.span());
                if let Some(decl_span) = self.lvalue_decl_span(&a.target) {
                    msg = msg.with_fat("declared here", decl_span);
                }
                self.diags.emit(msg);
                return None;
            }
            Some(false) => {}
            None => {
                self.diags.emit(Msg::error("assignment target is not an l-value", a.target.span()));
                return None;
            }
        }
        let value_ty = self.check_expr(&a.value, Some(&target_ty), file_id)?;
        match assign(self.diags, a.value.span(), &value_ty, &target_ty, false) {
            AssignResult::Ok(_) => {}
            AssignResult::Mismatch => {
                self.diags.emit(Msg::error(
                    format!("cannot convert to {} from {}", target_ty.display(), value_ty.display()),
                    a.value.span(),
                ));
            }
            AssignResult::ConstViolation => {
                self.diags.emit(
                    Msg::error(
                        format!("cannot convert to {} from {}", target_ty.display(), value_ty.display()),
                        a.value.span(),
                    )
                    .with_thin("type mismatch due to change in immutability"),
                );
            }
            AssignResult::Reported => {}
        }
        if matches!(value_ty.as_ref(), Typespec::Noreturn) {
            Some(self.table.noreturn())
        } else {
            Some(self.table.void())
        }
    }

    /// Mutability classification for `&`/assignment targets (spec 4.5.6).
    /// A path that indirects through a pointer or slice takes its
    /// mutability from that pointer/slice's own `immutable` flag alone —
    /// whether the *variable holding the pointer* is itself reassignable is
    /// irrelevant to whether a write through it is legal. A path that stays
    /// on the original aggregate (fixed array, struct by value) with no
    /// pointer indirection inherits the base l-value's mutability instead.
    fn lvalue_immutability(&mut self, expr: &Expression) -> Option<bool> {
        match expr {
            Expression::Symbol(sym) => {
                let id = (*sym.sym_ref.borrow())?;
                let binding = self.resolved.binding(id)?;
                binding.is_mutable_lvalue().map(|m| !m)
            }
            Expression::Deref(d) => match d.operand.typespec()?.as_ref() {
                Typespec::Ptr { immutable, .. } => Some(*immutable),
                _ => None,
            },
            Expression::Index(i) => match i.base.typespec()?.as_ref() {
                Typespec::MultiPtr { immutable, .. } | Typespec::Slice { immutable, .. } => Some(*immutable),
                Typespec::Array { .. } => {
                    let base_imm = self.lvalue_immutability(&i.base).unwrap_or(false);
                    Some(base_imm)
                }
                _ => None,
            },
            Expression::Access(a) => match a.base.typespec()?.as_ref() {
                Typespec::Ptr { immutable, child } if matches!(child.as_ref(), Typespec::Struct { .. }) => {
                    Some(*immutable)
                }
                Typespec::Slice { immutable, .. } => Some(*immutable),
                Typespec::Struct { .. } => {
                    let base_imm = self.lvalue_immutability(&a.base).unwrap_or(false);
                    Some(base_imm)
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn lvalue_decl_span(&self, expr: &Expression) -> Option<Span> {
        match expr {
            Expression::Symbol(sym) => {
                let id = (*sym.sym_ref.borrow())?;
                self.resolved.binding(id).map(Binding::span)
            }
            Expression::Deref(d) => self.lvalue_decl_span(&d.operand),
            Expression::Index(i) => self.lvalue_decl_span(&i.base),
            Expression::Access(a) => self.lvalue_decl_span(&a.base),
            _ => None,
        }
    }

    fn check_cast(&mut self, c: &Rc<CastExpr>, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        let from = self.check_expr(&c.operand, None, file_id)?;
        let to = self.resolve_typespec_syntax(&c.target, file_id)?;
        if cast_allowed(&from, &to) {
            Some(to)
        } else {
            self.diags.emit(Msg::error(
                format!("invalid cast from {} to {}", from.display(), to.display()),
                c.span,
            ));
            None
        }
    }

    fn check_call(&mut self, c: &Rc<CallExpr>, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        let callee_ty = self.check_expr(&c.callee, None, file_id)?;
        let (params, ret) = match callee_ty.as_ref() {
            Typespec::Func { params, ret } => (params.clone(), Rc::clone(ret)),
            Typespec::Ptr { child, .. } if matches!(child.as_ref(), Typespec::Func { .. }) => {
                let Typespec::Func { params, ret } = child.as_ref() else { unreachable!() };
                (params.clone(), Rc::clone(ret))
            }
            _ => {
                self.diags.emit(Msg::error("callee is not callable", c.callee.span()));
                return None;
            }
        };
        if c.args.len() < params.len() {
            self.diags.emit(Msg::error(
                format!("missing arguments: expected {}, got {}", params.len(), c.args.len()),
                c.span,
            ));
        } else if c.args.len() > params.len() {
            self.diags.emit(Msg::error(
                format!("too many arguments: expected {}, got {}", params.len(), c.args.len()),
                c.args[params.len()].span(),
            ));
        }
        for (arg, param_ty) in c.args.iter().zip(params.iter()) {
            let Some(arg_ty) = self.check_expr(arg, Some(param_ty), file_id) else {
                continue;
            };
            match assign(self.diags, arg.span(), &arg_ty, param_ty, false) {
                AssignResult::Ok(_) => {}
                AssignResult::Mismatch => {
                    self.diags.emit(Msg::error(
                        format!("cannot convert to {} from {}", param_ty.display(), arg_ty.display()),
                        arg.span(),
                    ));
                }
                AssignResult::ConstViolation => {
                    self.diags.emit(
                        Msg::error(
                            format!("cannot convert to {} from {}", param_ty.display(), arg_ty.display()),
                            arg.span(),
                        )
                        .with_thin("type mismatch due to change in immutability"),
                    );
                }
                AssignResult::Reported => {}
            }
        }
        for extra in c.args.iter().skip(params.len()) {
            self.check_expr(extra, None, file_id);
        }
        Some(ret)
    }

    fn check_if(&mut self, i: &Rc<IfExpr>, target: Option<&Rc<Typespec>>, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        let bool_ty = self.table.bool_();
        if let Some(ct) = self.check_expr(&i.condition, Some(&bool_ty), file_id) {
            if !matches!(ct.as_ref(), Typespec::Prim(PrimKind::Bool)) {
                self.diags.emit(Msg::error("`if` condition must be bool", i.condition.span()));
            }
        }
        let then_ty = self.check_block(&i.then_branch, target, file_id);
        match &i.else_branch {
            Some(else_expr) => {
                let want = target.cloned().unwrap_or_else(|| Rc::clone(&then_ty));
                let else_ty = self.check_expr(else_expr, Some(&want), file_id)?;
                match assign(self.diags, else_expr.span(), &else_ty, &then_ty, true) {
                    AssignResult::Ok(t) => Some(t),
                    AssignResult::Mismatch => {
                        self.diags.emit(Msg::error(
                            format!("type mismatch: {} and {}", then_ty.display(), else_ty.display()),
                            i.span,
                        ));
                        None
                    }
                    AssignResult::ConstViolation => {
                        self.diags.emit(
                            Msg::error(
                                format!("type mismatch: {} and {}", then_ty.display(), else_ty.display()),
                                i.span,
                            )
                            .with_thin("type mismatch due to change in immutability"),
                        );
                        None
                    }
                    AssignResult::Reported => None,
                }
            }
            None => {
                if matches!(then_ty.as_ref(), Typespec::Void | Typespec::Noreturn) {
                    Some(then_ty)
                } else {
                    let value_span = i.then_branch.trailing.as_ref().map_or(i.then_branch.span, |e| e.span());
                    self.diags.emit(
                        Msg::error("`else` clause required when `if` yields a value", i.span)
                            .with_fat("value produced here", value_span),
                    );
                    None
                }
            }
        }
    }

    fn check_while(&mut self, w: &Rc<WhileExpr>, target: Option<&Rc<Typespec>>, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        let bool_ty = self.table.bool_();
        if let Some(ct) = self.check_expr(&w.condition, Some(&bool_ty), file_id) {
            if !matches!(ct.as_ref(), Typespec::Prim(PrimKind::Bool)) {
                self.diags.emit(Msg::error("`while` condition must be bool", w.condition.span()));
            }
        }
        self.loop_stack.push(LoopCtx { id: w.id, breaks: Vec::new() });
        let body_ty = self.check_block(&w.body, None, file_id);
        if !matches!(body_ty.as_ref(), Typespec::Void | Typespec::Noreturn) {
            self.diags.emit(Msg::error("loop body cannot yield a value; use `break` instead", w.body.span));
        }
        let ctx = self.loop_stack.pop().expect("pushed above");
        self.finish_loop(ctx, target, w.else_branch.as_ref(), w.span, file_id)
    }

    fn check_for(&mut self, f: &Rc<ForExpr>, target: Option<&Rc<Typespec>>, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        for stmt in &f.init {
            self.check_statement(stmt, file_id);
        }
        if let Some(cond) = &f.condition {
            let bool_ty = self.table.bool_();
            if let Some(ct) = self.check_expr(cond, Some(&bool_ty), file_id) {
                if !matches!(ct.as_ref(), Typespec::Prim(PrimKind::Bool)) {
                    self.diags.emit(Msg::error("`for` condition must be bool", cond.span()));
                }
            }
        }
        for stmt in &f.step {
            self.check_statement(stmt, file_id);
        }
        self.loop_stack.push(LoopCtx { id: f.id, breaks: Vec::new() });
        let body_ty = self.check_block(&f.body, None, file_id);
        if !matches!(body_ty.as_ref(), Typespec::Void | Typespec::Noreturn) {
            self.diags.emit(Msg::error("loop body cannot yield a value; use `break` instead", f.body.span));
        }
        let ctx = self.loop_stack.pop().expect("pushed above");
        self.finish_loop(ctx, target, f.else_branch.as_ref(), f.span, file_id)
    }

    fn finish_loop(
        &mut self,
        ctx: LoopCtx,
        target: Option<&Rc<Typespec>>,
        else_branch: Option<&Expression>,
        span: Span,
        file_id: SrcfileId,
    ) -> Option<Rc<Typespec>> {
        if ctx.breaks.is_empty() {
            return Some(self.table.void());
        }
        let Some(else_expr) = else_branch else {
            self.diags.emit(Msg::error(
                "loop needs an `else` clause providing a value because it has a value-carrying `break`",
                span,
            ));
            return None;
        };
        let mut result = target.cloned().unwrap_or_else(|| Rc::clone(&ctx.breaks[0].0));
        for (ty, bspan) in &ctx.breaks {
            match assign(self.diags, *bspan, ty, &result, true) {
                AssignResult::Ok(t) => result = t,
                AssignResult::Mismatch => {
                    self.diags.emit(Msg::error(
                        format!("type mismatch: {} and {}", ty.display(), result.display()),
                        *bspan,
                    ));
                }
                AssignResult::ConstViolation => {
                    self.diags.emit(
                        Msg::error(format!("type mismatch: {} and {}", ty.display(), result.display()), *bspan)
                            .with_thin("type mismatch due to change in immutability"),
                    );
                }
                AssignResult::Reported => {}
            }
        }
        let else_ty = self.check_expr(else_expr, Some(&result), file_id)?;
        match assign(self.diags, else_expr.span(), &else_ty, &result, true) {
            AssignResult::Ok(t) => Some(t),
            AssignResult::Mismatch => {
                self.diags.emit(Msg::error(
                    format!("type mismatch: {} and {}", result.display(), else_ty.display()),
                    else_expr.span(),
                ));
                None
            }
            AssignResult::ConstViolation => {
                self.diags.emit(
                    Msg::error(
                        format!("type mismatch: {} and {}", result.display(), else_ty.display()),
                        else_expr.span(),
                    )
                    .with_thin("type mismatch due to change in immutability"),
                );
                None
            }
            AssignResult::Reported => None,
        }
    }

    fn check_break(&mut self, b: &Rc<BreakExpr>, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        let loop_id = match self.loop_stack.last() {
            Some(ctx) => ctx.id,
            None => {
                self.diags.emit(Msg::error("`break` used outside a loop", b.span));
                return None;
            }
        };
        b.loopref.set(Some(loop_id));
        if let Some(v) = &b.value {
            if let Some(ty) = self.check_expr(v, None, file_id) {
                if let Some(top) = self.loop_stack.last_mut() {
                    top.breaks.push((ty, v.span()));
                }
            }
        }
        Some(self.table.noreturn())
    }

    fn check_continue(&mut self, c: &Rc<ContinueExpr>) -> Option<Rc<Typespec>> {
        match self.loop_stack.last() {
            Some(ctx) => {
                c.loopref.set(Some(ctx.id));
                Some(self.table.noreturn())
            }
            None => {
                self.diags.emit(Msg::error("`continue` used outside a loop", c.span));
                None
            }
        }
    }

    fn check_return(&mut self, r: &Rc<ReturnExpr>, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        let (func_id, ret) = match self.func_stack.last() {
            Some(ctx) => (ctx.id, Rc::clone(&ctx.ret)),
            None => {
                self.diags.emit(Msg::error("`return` used outside a function", r.span));
                return None;
            }
        };
        r.func_ref.set(Some(func_id));
        if matches!(ret.as_ref(), Typespec::Noreturn) {
            self.diags.emit(Msg::error("`return` used in a `noreturn` function", r.span));
            return None;
        }
        match (&r.value, ret.as_ref()) {
            (None, Typespec::Void) => {}
            (None, _) => {
                self.diags.emit(Msg::error("missing return value", r.span));
            }
            (Some(v), Typespec::Void) => {
                self.check_expr(v, None, file_id);
                self.diags.emit(Msg::error("`return` in void function carries a value", v.span()));
            }
            (Some(v), _) => {
                if let Some(vt) = self.check_expr(v, Some(&ret), file_id) {
                    match assign(self.diags, v.span(), &vt, &ret, false) {
                        AssignResult::Ok(_) => {}
                        AssignResult::Mismatch => {
                            self.diags.emit(Msg::error(
                                format!("cannot convert to {} from {}", ret.display(), vt.display()),
                                v.span(),
                            ));
                        }
                        AssignResult::ConstViolation => {
                            self.diags.emit(
                                Msg::error(
                                    format!("cannot convert to {} from {}", ret.display(), vt.display()),
                                    v.span(),
                                )
                                .with_thin("type mismatch due to change in immutability"),
                            );
                        }
                        AssignResult::Reported => {}
                    }
                }
            }
        }
        Some(self.table.noreturn())
    }

    // ---- typespec syntax ---------------------------------------------------

    fn resolve_typespec_syntax(&mut self, ts: &TypespecSyntax, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        let ty = match ts {
            TypespecSyntax::PrimRef(p) => self.resolve_type_name(&p.name, p.span, file_id)?,
            TypespecSyntax::Pointer(p) => {
                let child = self.resolve_typespec_syntax(&p.child, file_id)?;
                Rc::new(Typespec::Ptr { immutable: p.mutability == Mutability::Imm, child })
            }
            TypespecSyntax::MultiPointer(p) => {
                let child = self.resolve_typespec_syntax(&p.child, file_id)?;
                Rc::new(Typespec::MultiPtr { immutable: p.mutability == Mutability::Imm, child })
            }
            TypespecSyntax::Slice(s) => {
                let child = self.resolve_typespec_syntax(&s.child, file_id)?;
                Rc::new(Typespec::Slice { immutable: s.mutability == Mutability::Imm, child })
            }
            TypespecSyntax::Array(a) => {
                let child = self.resolve_typespec_syntax(&a.child, file_id)?;
                let size_ty = self.check_expr(&a.size, None, file_id)?;
                let size = match size_ty.as_ref() {
                    Typespec::Prim(PrimKind::ComptimeInteger(v)) => v.clone(),
                    _ => {
                        self.diags.emit(Msg::error("array size must be a compile-time integer", a.size.span()));
                        return None;
                    }
                };
                Rc::new(Typespec::Array { size, child })
            }
            TypespecSyntax::Func(f) => {
                let mut params = Vec::with_capacity(f.params.len());
                for p in &f.params {
                    params.push(self.resolve_typespec_syntax(p, file_id)?);
                }
                let ret = match &f.ret {
                    Some(r) => self.resolve_typespec_syntax(r, file_id)?,
                    None => self.table.void(),
                };
                Rc::new(Typespec::Func { params, ret })
            }
            TypespecSyntax::Tuple(t) => {
                self.diags.emit(Msg::error("tuple types are not supported", t.span));
                return None;
            }
            TypespecSyntax::GenericApp(g) => {
                self.diags.emit(Msg::error("generic types are not supported", g.span));
                return None;
            }
        };
        record_typespec(ts, Rc::clone(&ty));
        Some(ty)
    }

    fn resolve_type_name(&mut self, name: &str, span: Span, file_id: SrcfileId) -> Option<Rc<Typespec>> {
        if let Some(p) = self.table.by_name(name) {
            return Some(p);
        }
        match self.resolved.lookup_module_name(file_id, name) {
            Some(Binding::Node(AstNode::Decl(Decl::StructDef(s)))) => {
                let id = s.id;
                Some(Rc::clone(
                    self.type_cache.entry(id).or_insert_with(|| Rc::new(Typespec::Struct { decl: id })),
                ))
            }
            Some(Binding::Node(AstNode::Decl(Decl::TypeAliasDecl(t)))) => {
                let id = t.id;
                if let Some(ty) = self.type_cache.get(&id) {
                    return Some(Rc::clone(ty));
                }
                let ann = t.annotation.clone();
                let ty = self.resolve_typespec_syntax(&ann, file_id)?;
                self.type_cache.insert(id, Rc::clone(&ty));
                Some(ty)
            }
            _ => {
                self.diags.emit(Msg::error(format!("undeclared type `{name}`"), span));
                None
            }
        }
    }
}

fn cast_allowed(from: &Typespec, to: &Typespec) -> bool {
    match (from, to) {
        (Typespec::Prim(_), Typespec::Prim(_)) => true,
        (Typespec::Ptr { .. } | Typespec::MultiPtr { .. }, Typespec::Prim(PrimKind::Int(_))) => true,
        (Typespec::Prim(PrimKind::Int(_) | PrimKind::ComptimeInteger(_)), Typespec::Ptr { .. } | Typespec::MultiPtr { .. }) => true,
        (Typespec::Ptr { immutable: imm_f, .. }, Typespec::Ptr { immutable: imm_t, .. }) => !*imm_f || *imm_t,
        (
            Typespec::Ptr { immutable: imm_f, child },
            Typespec::MultiPtr { immutable: imm_t, child: ct } | Typespec::Slice { immutable: imm_t, child: ct },
        ) => match child.as_ref() {
            Typespec::Array { child: ac, .. } => exact_eq(ac, ct) && (!*imm_f || *imm_t),
            _ => false,
        },
        (Typespec::Array { size: sf, child: cf }, Typespec::Array { size: st, child: ct }) => {
            sf == st && exact_eq(cf, ct)
        }
        (Typespec::Struct { decl: df }, Typespec::Struct { decl: dt }) => df == dt,
        _ => false,
    }
}

fn record(expr: &Expression, ty: Rc<Typespec>) {
    match expr {
        Expression::IntegerLiteral(n) => n.set_typespec(ty),
        Expression::StringLiteral(n) => n.set_typespec(ty),
        Expression::CharLiteral(n) => n.set_typespec(ty),
        Expression::ArrayLiteral(n) => n.set_typespec(ty),
        Expression::TupleLiteral(n) => n.set_typespec(ty),
        Expression::AggregateLiteral(n) => n.set_typespec(ty),
        Expression::Symbol(n) => n.set_typespec(ty),
        Expression::BuiltinSymbol(n) => n.set_typespec(ty),
        Expression::Unary(n) => n.set_typespec(ty),
        Expression::Deref(n) => n.set_typespec(ty),
        Expression::Index(n) => n.set_typespec(ty),
        Expression::Access(n) => n.set_typespec(ty),
        Expression::ArithmeticBinop(n) => n.set_typespec(ty),
        Expression::BooleanBinop(n) => n.set_typespec(ty),
        Expression::ComparisonBinop(n) => n.set_typespec(ty),
        Expression::Assign(n) => n.set_typespec(ty),
        Expression::Cast(n) => n.set_typespec(ty),
        Expression::Call(n) => n.set_typespec(ty),
        Expression::Block(n) => n.set_typespec(ty),
        Expression::If(n) => n.set_typespec(ty),
        Expression::While(n) => n.set_typespec(ty),
        Expression::For(n) => n.set_typespec(ty),
        Expression::Break(n) => n.set_typespec(ty),
        Expression::Continue(n) => n.set_typespec(ty),
        Expression::Return(n) => n.set_typespec(ty),
        Expression::Typespec(ts) => record_typespec(ts, ty),
    }
}

fn record_typespec(ts: &TypespecSyntax, ty: Rc<Typespec>) {
    match ts {
        TypespecSyntax::PrimRef(n) => n.set_typespec(ty),
        TypespecSyntax::Pointer(n) => n.set_typespec(ty),
        TypespecSyntax::MultiPointer(n) => n.set_typespec(ty),
        TypespecSyntax::Slice(n) => n.set_typespec(ty),
        TypespecSyntax::Array(n) => n.set_typespec(ty),
        TypespecSyntax::Func(n) => n.set_typespec(ty),
        TypespecSyntax::Tuple(n) => n.set_typespec(ty),
        TypespecSyntax::GenericApp(n) => n.set_typespec(ty),
    }
}
