//! Typed-AST to LLVM IR lowering.
//!
//! By the time this runs, `aria-sema` has already rejected every program
//! that doesn't type-check, so every `.expect`/`.unwrap` below is an
//! internal-compiler-error backstop, not a user-facing failure path (spec
//! section 4.6: "no further type-checking should be required in the
//! backend; any failure there is an internal-compiler-error"). Control flow
//! that can yield a value (`if`, `while`'s `else`, blocks) is lowered with
//! an alloca'd result slot rather than phi nodes — mem2reg-style promotion
//! is the kind of optimization pass spec section 1 calls a non-goal, so the
//! naive, always-correct lowering is the right target for this crate.

use std::rc::Rc;

use aria_ast::nodes::*;
use aria_ast::{AcceptKind, PrimKind, Typespec};
use aria_resolver::Binding;
use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, StructType};
use inkwell::values::{BasicValue, BasicValueEnum, FunctionValue, PointerValue};
use inkwell::{AddressSpace, IntPredicate};
use rustc_hash::FxHashMap;

use crate::TypedProgram;

struct LoopCx<'ctx> {
    loop_id: u32,
    /// Where `continue` branches to: the condition check for `while`, the
    /// step block for `for`.
    continue_target: BasicBlock<'ctx>,
    merge: BasicBlock<'ctx>,
    result_slot: Option<(PointerValue<'ctx>, BasicTypeEnum<'ctx>)>,
}

pub struct Compiler<'ctx, 'a> {
    context: &'ctx Context,
    module: Module<'ctx>,
    builder: Builder<'ctx>,
    program: &'a TypedProgram<'a>,
    functions: FxHashMap<u32, FunctionValue<'ctx>>,
    globals: FxHashMap<u32, PointerValue<'ctx>>,
    struct_types: FxHashMap<u32, StructType<'ctx>>,
    locals: FxHashMap<u32, (PointerValue<'ctx>, BasicTypeEnum<'ctx>)>,
    loop_stack: Vec<LoopCx<'ctx>>,
    cur_fn: Option<FunctionValue<'ctx>>,
}

impl<'ctx, 'a> Compiler<'ctx, 'a> {
    pub fn new(context: &'ctx Context, module_name: &str, program: &'a TypedProgram<'a>) -> Self {
        Self {
            context,
            module: context.create_module(module_name),
            builder: context.create_builder(),
            program,
            functions: FxHashMap::default(),
            globals: FxHashMap::default(),
            struct_types: FxHashMap::default(),
            locals: FxHashMap::default(),
            loop_stack: Vec::new(),
            cur_fn: None,
        }
    }

    #[must_use]
    pub fn into_module(self) -> Module<'ctx> {
        self.module
    }

    /// Emits the whole program into `self.module`: struct layouts first (so
    /// mutually recursive structs through pointers resolve), then function
    /// and global declarations (so forward calls resolve), then every
    /// function body and global initializer.
    pub fn emit_program(&mut self) {
        for s in self.program.arena().struct_defs() {
            self.declare_struct_type(s.id);
        }
        for s in self.program.arena().struct_defs() {
            self.fill_struct_body(s.id, s);
        }
        for (_, source_file) in self.program.files {
            for decl in &source_file.decls {
                self.declare_decl(decl);
            }
        }
        for (_, source_file) in self.program.files {
            for decl in &source_file.decls {
                self.define_decl(decl);
            }
        }
    }

    // ---- types --------------------------------------------------------------

    fn decl_type(&self, id: u32) -> Rc<Typespec> {
        Rc::clone(
            self.program
                .decl_types
                .get(&id)
                .expect("ICE: declaration has no resolved typespec"),
        )
    }

    fn declare_struct_type(&mut self, id: u32) {
        self.struct_types
            .entry(id)
            .or_insert_with(|| self.context.opaque_struct_type(&format!("struct.{id}")));
    }

    fn fill_struct_body(&mut self, id: u32, decl: &StructDef) {
        let field_types: Vec<BasicTypeEnum<'ctx>> = decl
            .fields
            .iter()
            .map(|f| self.llvm_type(&self.decl_type(f.id)))
            .collect();
        self.struct_types[&id].set_body(&field_types, false);
    }

    /// The LLVM representation of a runtime (or comptime-fallback) type.
    /// `void`/`noreturn` never reach here — callers handle those
    /// positions (function return type, block statement position)
    /// separately.
    fn llvm_type(&self, ty: &Typespec) -> BasicTypeEnum<'ctx> {
        match ty {
            Typespec::Prim(PrimKind::Int(k)) => self.int_type(k.bytes()).into(),
            Typespec::Prim(PrimKind::Bool) => self.context.bool_type().into(),
            // Only reachable for a global whose declared type was left
            // comptime (no annotation, integer literal initializer); the
            // register-size range check already performed by sema means
            // i64 always fits.
            Typespec::Prim(PrimKind::ComptimeInteger(_)) => self.context.i64_type().into(),
            Typespec::Ptr { .. } | Typespec::MultiPtr { .. } => {
                self.context.ptr_type(AddressSpace::default()).into()
            }
            Typespec::Slice { .. } => self.slice_type().into(),
            Typespec::Array { size, child } => {
                let len = size.to_u64().expect("ICE: array size out of range") as u32;
                self.llvm_type(child).array_type(len).into()
            }
            Typespec::Func { .. } => self.context.ptr_type(AddressSpace::default()).into(),
            Typespec::Struct { decl } => (*self
                .struct_types
                .get(decl)
                .expect("ICE: struct type not predeclared"))
            .into(),
            Typespec::Void | Typespec::Noreturn | Typespec::Type { .. } | Typespec::Module { .. } => {
                unreachable!("ICE: {} has no runtime representation", ty.display())
            }
        }
    }

    fn slice_type(&self) -> StructType<'ctx> {
        self.context.struct_type(
            &[
                self.context.ptr_type(AddressSpace::default()).into(),
                self.context.i64_type().into(),
            ],
            false,
        )
    }

    fn int_type(&self, bytes: u32) -> inkwell::types::IntType<'ctx> {
        match bytes {
            1 => self.context.i8_type(),
            2 => self.context.i16_type(),
            4 => self.context.i32_type(),
            8 => self.context.i64_type(),
            _ => unreachable!("ICE: unsupported integer width {bytes}"),
        }
    }

    fn fn_type(&self, ty: &Typespec) -> inkwell::types::FunctionType<'ctx> {
        let Typespec::Func { params, ret } = ty else {
            unreachable!("ICE: function header typespec is not Func")
        };
        let param_types: Vec<BasicMetadataTypeEnum> =
            params.iter().map(|p| self.llvm_type(p).into()).collect();
        match ret.as_ref() {
            Typespec::Void => self.context.void_type().fn_type(&param_types, false),
            Typespec::Noreturn => self.context.void_type().fn_type(&param_types, false),
            _ => self.llvm_type(ret).fn_type(&param_types, false),
        }
    }

    // ---- declarations ---------------------------------------------------

    fn declare_decl(&mut self, decl: &Decl) {
        match decl {
            Decl::FunctionDef(f) => self.declare_function(f.id, &f.header.name),
            Decl::ExternFunctionDef(f) => self.declare_function(f.id, &f.header.name),
            Decl::VariableDecl(v) => self.declare_global(v.id, &v.name, true),
            // An extern variable is defined in a separately linked object;
            // leave it without an initializer so it stays an external
            // declaration for `ld` to resolve (spec section 6).
            Decl::ExternVariableDecl(v) => self.declare_global(v.id, &v.name, false),
            Decl::StructDef(_) | Decl::TypeAliasDecl(_) | Decl::Import(_) => {}
        }
    }

    fn declare_function(&mut self, id: u32, name: &str) {
        if self.functions.contains_key(&id) {
            return;
        }
        let ty = self.fn_type(&self.decl_type(id));
        let func = self.module.add_function(name, ty, None);
        self.functions.insert(id, func);
    }

    fn declare_global(&mut self, id: u32, name: &str, defined_here: bool) {
        if self.globals.contains_key(&id) {
            return;
        }
        let ty = self.decl_type(id);
        let llvm_ty = self.llvm_type(&ty);
        let global = self.module.add_global(llvm_ty, None, name);
        if defined_here {
            global.set_initializer(&zero_of(llvm_ty));
        }
        self.globals.insert(id, global.as_pointer_value());
    }

    fn define_decl(&mut self, decl: &Decl) {
        match decl {
            Decl::FunctionDef(f) => self.define_function(f),
            Decl::VariableDecl(v) => self.define_global(v),
            Decl::ExternFunctionDef(_) | Decl::ExternVariableDecl(_) => {}
            Decl::StructDef(_) | Decl::TypeAliasDecl(_) | Decl::Import(_) => {}
        }
    }

    fn define_global(&mut self, v: &Rc<VariableDeclStmt>) {
        let Some(init) = &v.initializer else { return };
        let ty = self.decl_type(v.id);
        let value = self.const_fold(init, &ty);
        let global = self.module.get_global(&v.name).expect("ICE: global not declared");
        global.set_initializer(&value);
    }

    /// Global initializers must be compile-time constants (spec 4.5.3);
    /// the only forms that reach here after sema are integer/char/string
    /// literals and `true`/`false`.
    fn const_fold(&self, expr: &Expression, ty: &Typespec) -> BasicValueEnum<'ctx> {
        match expr {
            Expression::IntegerLiteral(n) => {
                let int_ty = match ty {
                    Typespec::Prim(PrimKind::Int(k)) => self.int_type(k.bytes()),
                    _ => self.context.i64_type(),
                };
                let v = n.value.to_i64().expect("ICE: comptime integer out of i64 range");
                int_ty.const_int(v as u64, v < 0).into()
            }
            Expression::CharLiteral(n) => self.context.i32_type().const_int(u64::from(n.value), false).into(),
            Expression::BuiltinSymbol(b) if b.kind == BuiltinSymbolKind::True => {
                self.context.bool_type().const_int(1, false).into()
            }
            Expression::BuiltinSymbol(b) if b.kind == BuiltinSymbolKind::False => {
                self.context.bool_type().const_int(0, false).into()
            }
            _ => unreachable!("ICE: non-constant global initializer reached codegen"),
        }
    }

    fn define_function(&mut self, f: &Rc<FunctionDef>) {
        let func = self.functions[&f.id];
        self.cur_fn = Some(func);
        self.locals.clear();
        let entry = self.context.append_basic_block(func, "entry");
        self.builder.position_at_end(entry);

        let ret_ty = self.decl_type(f.id);
        let Typespec::Func { params: param_tys, .. } = ret_ty.as_ref() else {
            unreachable!()
        };
        for (i, param) in f.header.params.iter().enumerate() {
            let llvm_param = func.get_nth_param(i as u32).expect("ICE: missing LLVM parameter");
            let param_ty = self.llvm_type(&param_tys[i]);
            let slot = self.alloca_in_entry(param_ty, &param.name);
            self.builder.build_store(slot, llvm_param).unwrap();
            self.locals.insert(param.id, (slot, param_ty));
        }

        self.gen_block(&f.body);
        if !self.current_block_has_terminator() {
            // Only reachable for a `void`-returning function whose body
            // doesn't end in an explicit `return`; sema already requires
            // every other function to end in a `noreturn` trailing
            // expression.
            self.builder.build_return(None).unwrap();
        }
        self.cur_fn = None;
    }

    // ---- locals / alloca helpers -----------------------------------------

    fn alloca_in_entry(&self, ty: BasicTypeEnum<'ctx>, name: &str) -> PointerValue<'ctx> {
        let func = self.cur_fn.expect("ICE: alloca outside a function body");
        let entry = func.get_first_basic_block().expect("ICE: function has no entry block");
        let tmp_builder = self.context.create_builder();
        match entry.get_first_instruction() {
            Some(first) => tmp_builder.position_before(&first),
            None => tmp_builder.position_at_end(entry),
        }
        tmp_builder.build_alloca(ty, name).unwrap()
    }

    fn current_block_has_terminator(&self) -> bool {
        self.builder
            .get_insert_block()
            .is_some_and(|b| b.get_terminator().is_some())
    }

    // ---- statements & blocks ----------------------------------------------

    /// Returns the block's value, or `None` if its type is `void`/
    /// `noreturn` (nothing to load).
    fn gen_block(&mut self, block: &Rc<BlockExpr>) -> Option<BasicValueEnum<'ctx>> {
        for stmt in &block.statements {
            if self.current_block_has_terminator() {
                break;
            }
            self.gen_statement(stmt);
        }
        if self.current_block_has_terminator() {
            return None;
        }
        match &block.trailing {
            Some(expr) => self.gen_expr(expr),
            None => None,
        }
    }

    fn gen_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::VariableDecl(v) => self.gen_local_var(v),
            Statement::ExpressionStatement(e) => {
                self.gen_expr(&e.expression);
            }
        }
    }

    fn gen_local_var(&mut self, v: &Rc<VariableDeclStmt>) {
        let ty = v.typespec().expect("ICE: local variable missing resolved typespec");
        let llvm_ty = self.llvm_type(&ty);
        let slot = self.alloca_in_entry(llvm_ty, &v.name);
        self.locals.insert(v.id, (slot, llvm_ty));
        if let Some(init) = &v.initializer {
            if let Some(value) = self.gen_expr(init) {
                self.builder.build_store(slot, value).unwrap();
            }
        }
    }

    // ---- expressions --------------------------------------------------------

    fn gen_expr(&mut self, expr: &Expression) -> Option<BasicValueEnum<'ctx>> {
        match expr {
            Expression::IntegerLiteral(n) => {
                let ty = n.typespec().expect("ICE");
                let int_ty = match ty.as_ref() {
                    Typespec::Prim(PrimKind::Int(k)) => self.int_type(k.bytes()),
                    _ => self.context.i64_type(),
                };
                let v = n.value.to_i64().expect("ICE: integer literal out of range");
                Some(int_ty.const_int(v as u64, v < 0).into())
            }
            Expression::CharLiteral(n) => Some(self.context.i32_type().const_int(u64::from(n.value), false).into()),
            Expression::StringLiteral(n) => {
                let bytes = String::from_utf8_lossy(&n.value);
                let global = self.builder.build_global_string_ptr(&bytes, "str").unwrap();
                Some(global.as_pointer_value().into())
            }
            Expression::ArrayLiteral(a) => self.gen_array_literal(a),
            Expression::TupleLiteral(_) => unreachable!("ICE: tuples are rejected by sema"),
            Expression::AggregateLiteral(a) => self.gen_aggregate_literal(a),
            Expression::Symbol(sym) => self.gen_symbol_load(sym),
            Expression::BuiltinSymbol(b) => self.gen_builtin_symbol(b),
            Expression::Unary(u) => self.gen_unary(u),
            Expression::Deref(d) => {
                let ptr = self.gen_expr(&d.operand)?.into_pointer_value();
                let ty = d.typespec().expect("ICE");
                let llvm_ty = self.llvm_type(&ty);
                Some(self.builder.build_load(llvm_ty, ptr, "deref").unwrap())
            }
            Expression::Index(_) => {
                let addr = self.gen_lvalue(expr);
                let ty = expr.typespec().expect("ICE");
                let llvm_ty = self.llvm_type(&ty);
                Some(self.builder.build_load(llvm_ty, addr, "index").unwrap())
            }
            Expression::Access(a) => self.gen_access(a),
            Expression::ArithmeticBinop(b) => self.gen_arith(b),
            Expression::BooleanBinop(b) => self.gen_bool_binop(b),
            Expression::ComparisonBinop(b) => self.gen_cmp(b),
            Expression::Assign(a) => self.gen_assign(a),
            Expression::Cast(c) => self.gen_cast(c),
            Expression::Call(c) => self.gen_call(c),
            Expression::Block(b) => self.gen_block(b),
            Expression::If(i) => self.gen_if(i),
            Expression::While(w) => self.gen_while(w),
            Expression::For(f) => self.gen_for(f),
            Expression::Break(b) => self.gen_break(b),
            Expression::Continue(c) => self.gen_continue(c),
            Expression::Return(r) => self.gen_return(r),
            Expression::Typespec(_) => None,
        }
    }

    fn gen_array_literal(&mut self, a: &Rc<ArrayLiteralExpr>) -> Option<BasicValueEnum<'ctx>> {
        let ty = a.typespec().expect("ICE");
        let llvm_ty = self.llvm_type(&ty);
        let slot = self.alloca_in_entry(llvm_ty, "arraylit");
        for (i, el) in a.elements.iter().enumerate() {
            let Some(value) = self.gen_expr(el) else { continue };
            let idx = self.context.i32_type().const_int(i as u64, false);
            let zero = self.context.i32_type().const_zero();
            let elem_ptr = unsafe {
                self.builder.build_gep(llvm_ty, slot, &[zero, idx], "arrayelem").unwrap()
            };
            self.builder.build_store(elem_ptr, value).unwrap();
        }
        Some(self.builder.build_load(llvm_ty, slot, "arraylit.load").unwrap())
    }

    fn gen_aggregate_literal(&mut self, a: &Rc<AggregateLiteralExpr>) -> Option<BasicValueEnum<'ctx>> {
        let ty = a.typespec().expect("ICE");
        let Typespec::Struct { decl } = ty.as_ref() else {
            unreachable!("ICE: aggregate literal is not a struct type")
        };
        let struct_ty = self.struct_types[decl];
        let slot = self.alloca_in_entry(struct_ty.into(), "structlit");
        let field_names: Vec<String> = self
            .program
            .arena()
            .find_node(*decl)
            .and_then(|n| match n {
                AstNode::Decl(Decl::StructDef(s)) => Some(s.fields.iter().map(|f| f.name.clone()).collect()),
                _ => None,
            })
            .expect("ICE: struct decl not found");
        for (name, _span, value_expr) in &a.fields {
            let idx = field_names
                .iter()
                .position(|n| n == name)
                .expect("ICE: unknown struct field in aggregate literal") as u32;
            let Some(value) = self.gen_expr(value_expr) else { continue };
            let field_ptr = self.builder.build_struct_gep(struct_ty, slot, idx, "field").unwrap();
            self.builder.build_store(field_ptr, value).unwrap();
        }
        Some(self.builder.build_load(struct_ty, slot, "structlit.load").unwrap())
    }

    fn gen_symbol_load(&mut self, sym: &Rc<SymbolExpr>) -> Option<BasicValueEnum<'ctx>> {
        let id = sym.sym_ref.borrow().expect("ICE: unresolved symbol reached codegen");
        if self.is_function_binding(id) {
            return Some(self.functions[&id].as_global_value().as_pointer_value().into());
        }
        let (ptr, ty) = self.local_or_global(id);
        Some(self.builder.build_load(ty, ptr, &sym.name).unwrap())
    }

    fn is_function_binding(&self, id: u32) -> bool {
        self.program
            .resolved
            .binding(id)
            .is_some_and(Binding::is_function)
    }

    fn local_or_global(&self, id: u32) -> (PointerValue<'ctx>, BasicTypeEnum<'ctx>) {
        if let Some(&(ptr, ty)) = self.locals.get(&id) {
            return (ptr, ty);
        }
        if let Some(&ptr) = self.globals.get(&id) {
            let ty = self.llvm_type(&self.decl_type(id));
            return (ptr, ty);
        }
        unreachable!("ICE: symbol id {id} resolved to neither a local nor a global")
    }

    fn gen_builtin_symbol(&mut self, b: &Rc<BuiltinSymbolExpr>) -> Option<BasicValueEnum<'ctx>> {
        match b.kind {
            BuiltinSymbolKind::True => Some(self.context.bool_type().const_int(1, false).into()),
            BuiltinSymbolKind::False => Some(self.context.bool_type().const_int(0, false).into()),
            // `void`, `noreturn`, and primitive type names used as values
            // (e.g. a cast target reached through `Expression::Typespec`)
            // never produce a runtime value.
            BuiltinSymbolKind::Void | BuiltinSymbolKind::Noreturn | BuiltinSymbolKind::PrimType => None,
        }
    }

    fn gen_unary(&mut self, u: &Rc<UnaryExpr>) -> Option<BasicValueEnum<'ctx>> {
        match u.op {
            UnaryOp::AddrOf => Some(self.gen_lvalue(&u.operand).into()),
            UnaryOp::Neg => {
                let v = self.gen_expr(&u.operand)?.into_int_value();
                Some(self.builder.build_int_neg(v, "neg").unwrap().into())
            }
            UnaryOp::Not => {
                let v = self.gen_expr(&u.operand)?.into_int_value();
                Some(self.builder.build_not(v, "not").unwrap().into())
            }
        }
    }

    fn gen_access(&mut self, a: &Rc<AccessExpr>) -> Option<BasicValueEnum<'ctx>> {
        if a.acc_resolved.borrow().is_some() {
            // Module-qualified access (`module.name`): resolves to the
            // target Srcfile's top-level binding directly; there is no
            // base value to evaluate.
            return self.gen_module_member(a);
        }
        let base_ty = a.base.typespec().expect("ICE: access base missing typespec");
        if matches!(base_ty.as_ref(), Typespec::Slice { .. }) && a.name == "len" {
            let slice_val = self.gen_expr(&a.base)?.into_struct_value();
            return Some(self.builder.build_extract_value(slice_val, 1, "len").unwrap());
        }
        if matches!(base_ty.as_ref(), Typespec::Slice { .. }) && a.name == "ptr" {
            let slice_val = self.gen_expr(&a.base)?.into_struct_value();
            return Some(self.builder.build_extract_value(slice_val, 0, "ptr").unwrap());
        }
        let addr = self.gen_lvalue(&Expression::Access(Rc::clone(a)));
        let ty = a.typespec().expect("ICE");
        let llvm_ty = self.llvm_type(&ty);
        Some(self.builder.build_load(llvm_ty, addr, "field").unwrap())
    }

    fn gen_module_member(&mut self, a: &Rc<AccessExpr>) -> Option<BasicValueEnum<'ctx>> {
        let id = a
            .acc_resolved
            .borrow()
            .expect("ICE: module access without a resolved target");
        if self.is_function_binding(id) {
            return Some(self.functions[&id].as_global_value().as_pointer_value().into());
        }
        let (ptr, ty) = self.local_or_global(id);
        Some(self.builder.build_load(ty, ptr, &a.name).unwrap())
    }

    fn gen_arith(&mut self, b: &Rc<ArithBinopExpr>) -> Option<BasicValueEnum<'ctx>> {
        let ty = b.typespec().expect("ICE");
        let signed = match ty.as_ref() {
            Typespec::Prim(PrimKind::Int(k)) => k.signed(),
            _ => false,
        };
        let lhs = self.gen_expr(&b.left)?.into_int_value();
        let rhs = self.gen_expr(&b.right)?.into_int_value();
        let v = match b.op {
            ArithOp::Add => self.builder.build_int_add(lhs, rhs, "add").unwrap(),
            ArithOp::Sub => self.builder.build_int_sub(lhs, rhs, "sub").unwrap(),
            ArithOp::Mul => self.builder.build_int_mul(lhs, rhs, "mul").unwrap(),
            ArithOp::Div if signed => self.builder.build_int_signed_div(lhs, rhs, "sdiv").unwrap(),
            ArithOp::Div => self.builder.build_int_unsigned_div(lhs, rhs, "udiv").unwrap(),
            ArithOp::Mod if signed => self.builder.build_int_signed_rem(lhs, rhs, "srem").unwrap(),
            ArithOp::Mod => self.builder.build_int_unsigned_rem(lhs, rhs, "urem").unwrap(),
        };
        Some(v.into())
    }

    fn gen_bool_binop(&mut self, b: &Rc<BoolBinopExpr>) -> Option<BasicValueEnum<'ctx>> {
        // Short-circuit: only evaluate the right operand on the branch
        // that needs it (spec 4.5.4: "short-circuit semantics are
        // preserved in the IR by a join/phi on the right-hand branch" —
        // this lowering gets the same effect with a result alloca).
        let func = self.cur_fn.expect("ICE");
        let rhs_bb = self.context.append_basic_block(func, "bool.rhs");
        let merge_bb = self.context.append_basic_block(func, "bool.merge");
        let bool_ty = self.context.bool_type();
        let slot = self.alloca_in_entry(bool_ty.into(), "bool.result");

        let lhs = self.gen_expr(&b.left)?.into_int_value();
        self.builder.build_store(slot, lhs).unwrap();
        match b.op {
            BoolOp::And => self.builder.build_conditional_branch(lhs, rhs_bb, merge_bb).unwrap(),
            BoolOp::Or => self.builder.build_conditional_branch(lhs, merge_bb, rhs_bb).unwrap(),
        };

        self.builder.position_at_end(rhs_bb);
        if let Some(rhs) = self.gen_expr(&b.right) {
            self.builder.build_store(slot, rhs.into_int_value()).unwrap();
        }
        if !self.current_block_has_terminator() {
            self.builder.build_unconditional_branch(merge_bb).unwrap();
        }

        self.builder.position_at_end(merge_bb);
        Some(self.builder.build_load(bool_ty, slot, "bool.value").unwrap())
    }

    fn gen_cmp(&mut self, b: &Rc<CmpBinopExpr>) -> Option<BasicValueEnum<'ctx>> {
        let operand_ty = b.operand_typespec.borrow().clone().expect("ICE: comparison missing operand type");
        let lhs = self.gen_expr(&b.left)?;
        let rhs = self.gen_expr(&b.right)?;
        let signed = match operand_ty.as_ref() {
            Typespec::Prim(PrimKind::Int(k)) => k.signed(),
            _ => false,
        };
        let pred = match (b.op, signed) {
            (CmpOp::Eq, _) => IntPredicate::EQ,
            (CmpOp::Ne, _) => IntPredicate::NE,
            (CmpOp::Lt, true) => IntPredicate::SLT,
            (CmpOp::Lt, false) => IntPredicate::ULT,
            (CmpOp::Le, true) => IntPredicate::SLE,
            (CmpOp::Le, false) => IntPredicate::ULE,
            (CmpOp::Gt, true) => IntPredicate::SGT,
            (CmpOp::Gt, false) => IntPredicate::UGT,
            (CmpOp::Ge, true) => IntPredicate::SGE,
            (CmpOp::Ge, false) => IntPredicate::UGE,
        };
        // Both pointer and integer comparisons lower the same way once the
        // operands are in hand: `build_int_compare` works on any LLVM
        // integer-kinded value, and opaque pointers are not integers, so
        // pointer equality is compared via `build_int_compare` applied to
        // pointer-to-int-cast operands when the operand type is a pointer.
        let v = if matches!(operand_ty.as_ref(), Typespec::Ptr { .. } | Typespec::MultiPtr { .. }) {
            let lhs_i = self.builder.build_ptr_to_int(lhs.into_pointer_value(), self.context.i64_type(), "p2i").unwrap();
            let rhs_i = self.builder.build_ptr_to_int(rhs.into_pointer_value(), self.context.i64_type(), "p2i").unwrap();
            self.builder.build_int_compare(pred, lhs_i, rhs_i, "cmp").unwrap()
        } else {
            self.builder.build_int_compare(pred, lhs.into_int_value(), rhs.into_int_value(), "cmp").unwrap()
        };
        Some(v.into())
    }

    fn gen_assign(&mut self, a: &Rc<AssignExpr>) -> Option<BasicValueEnum<'ctx>> {
        let value = self.gen_expr(&a.value)?;
        let addr = self.gen_lvalue(&a.target);
        self.builder.build_store(addr, value).unwrap();
        None
    }

    fn gen_cast(&mut self, c: &Rc<CastExpr>) -> Option<BasicValueEnum<'ctx>> {
        let from_ty = c.operand.typespec().expect("ICE: cast operand missing typespec");
        let to_ty = c.typespec().expect("ICE: cast missing result typespec");
        let operand = self.gen_expr(&c.operand)?;
        Some(match (from_ty.as_ref(), to_ty.as_ref()) {
            (Typespec::Prim(PrimKind::Int(from)), Typespec::Prim(PrimKind::Int(to))) => {
                let operand = operand.into_int_value();
                let to_llvm = self.int_type(to.bytes());
                if to.bytes() == from.bytes() {
                    operand.into()
                } else if to.bytes() < from.bytes() {
                    self.builder.build_int_truncate(operand, to_llvm, "trunc").unwrap().into()
                } else if from.signed() {
                    self.builder.build_int_s_extend(operand, to_llvm, "sext").unwrap().into()
                } else {
                    self.builder.build_int_z_extend(operand, to_llvm, "zext").unwrap().into()
                }
            }
            // A comptime integer is always represented as an i64 constant
            // by `gen_expr` (see the `IntegerLiteral` arm); the range/fit
            // check already happened in sema, so only a truncation (never
            // a widening) is ever needed here.
            (Typespec::Prim(PrimKind::ComptimeInteger(_)), Typespec::Prim(PrimKind::Int(to))) => {
                let operand = operand.into_int_value();
                let to_llvm = self.int_type(to.bytes());
                if to.bytes() == 8 {
                    operand.into()
                } else {
                    self.builder.build_int_truncate(operand, to_llvm, "trunc").unwrap().into()
                }
            }
            (Typespec::Prim(PrimKind::Int(_)), Typespec::Prim(PrimKind::Bool)) => {
                let operand = operand.into_int_value();
                let zero = operand.get_type().const_zero();
                self.builder.build_int_compare(IntPredicate::NE, operand, zero, "tobool").unwrap().into()
            }
            (Typespec::Prim(PrimKind::Bool), Typespec::Prim(PrimKind::Int(to))) => {
                let operand = operand.into_int_value();
                self.builder.build_int_z_extend(operand, self.int_type(to.bytes()), "frombool").unwrap().into()
            }
            (Typespec::Prim(PrimKind::Int(_)), Typespec::Ptr { .. } | Typespec::MultiPtr { .. }) => {
                let operand = operand.into_int_value();
                self.builder.build_int_to_ptr(operand, self.context.ptr_type(AddressSpace::default()), "itop").unwrap().into()
            }
            (Typespec::Ptr { .. } | Typespec::MultiPtr { .. }, Typespec::Prim(PrimKind::Int(to))) => {
                let operand = operand.into_pointer_value();
                self.builder.build_ptr_to_int(operand, self.int_type(to.bytes()), "ptoi").unwrap().into()
            }
            // Opaque pointers (LLVM 18): pointer<->pointer, array-pointer
            // decay, and struct<->struct-by-identity casts all carry the
            // same bit pattern, so the value passes through unchanged —
            // only our own type system distinguishes them.
            _ => operand,
        })
    }

    fn gen_call(&mut self, c: &Rc<CallExpr>) -> Option<BasicValueEnum<'ctx>> {
        let args: Vec<_> = c
            .args
            .iter()
            .map(|a| self.gen_expr(a).expect("ICE: void argument").into())
            .collect();
        let callee_fn = self.callee_function(&c.callee);
        let call = self.builder.build_call(callee_fn, &args, "call").unwrap();
        call.try_as_basic_value().left()
    }

    fn callee_function(&mut self, callee: &Expression) -> FunctionValue<'ctx> {
        match callee {
            Expression::Symbol(sym) => {
                let id = sym.sym_ref.borrow().expect("ICE: unresolved call target");
                self.functions[&id]
            }
            Expression::Access(a) if a.acc_resolved.borrow().is_some() => {
                let id = a.acc_resolved.borrow().unwrap();
                self.functions[&id]
            }
            _ => unreachable!("ICE: indirect calls through function pointers are not lowered by this reference backend"),
        }
    }

    // ---- l-values -----------------------------------------------------------

    fn gen_lvalue(&mut self, expr: &Expression) -> PointerValue<'ctx> {
        match expr {
            Expression::Symbol(sym) => {
                let id = sym.sym_ref.borrow().expect("ICE: unresolved symbol reached codegen");
                if self.is_function_binding(id) {
                    self.functions[&id].as_global_value().as_pointer_value()
                } else {
                    self.local_or_global(id).0
                }
            }
            Expression::Deref(d) => self.gen_expr(&d.operand).expect("ICE").into_pointer_value(),
            Expression::Index(i) => self.gen_index_address(i),
            Expression::Access(a) => self.gen_access_address(a),
            _ => unreachable!("ICE: {:?} is not an l-value", expr),
        }
    }

    fn gen_index_address(&mut self, i: &Rc<IndexExpr>) -> PointerValue<'ctx> {
        let base_ty = i.base.typespec().expect("ICE: index base missing typespec");
        let idx = self.gen_expr(&i.index).expect("ICE").into_int_value();
        match base_ty.as_ref() {
            Typespec::Array { .. } => {
                let base_ptr = self.gen_lvalue(&i.base);
                let array_ty = self.llvm_type(&base_ty);
                let zero = self.context.i32_type().const_zero();
                unsafe { self.builder.build_gep(array_ty, base_ptr, &[zero, idx], "idx").unwrap() }
            }
            Typespec::MultiPtr { child, .. } => {
                let base_ptr = self.gen_expr(&i.base).expect("ICE").into_pointer_value();
                let child_llvm = self.llvm_type(child);
                unsafe { self.builder.build_gep(child_llvm, base_ptr, &[idx], "idx").unwrap() }
            }
            Typespec::Slice { child, .. } => {
                let slice_val = self.gen_expr(&i.base).expect("ICE").into_struct_value();
                let base_ptr = self
                    .builder
                    .build_extract_value(slice_val, 0, "sliceptr")
                    .unwrap()
                    .into_pointer_value();
                let child_llvm = self.llvm_type(child);
                unsafe { self.builder.build_gep(child_llvm, base_ptr, &[idx], "idx").unwrap() }
            }
            Typespec::Ptr { child, .. } => {
                // Array-pointer decay (`*[N]T` indexed directly).
                let base_ptr = self.gen_expr(&i.base).expect("ICE").into_pointer_value();
                let array_ty = self.llvm_type(child);
                let zero = self.context.i32_type().const_zero();
                unsafe { self.builder.build_gep(array_ty, base_ptr, &[zero, idx], "idx").unwrap() }
            }
            _ => unreachable!("ICE: indexing a non-indexable type reached codegen"),
        }
    }

    fn gen_access_address(&mut self, a: &Rc<AccessExpr>) -> PointerValue<'ctx> {
        let base_ty = a.base.typespec().expect("ICE: access base missing typespec");
        let (struct_ty_typespec, base_ptr) = match base_ty.as_ref() {
            Typespec::Struct { .. } => (base_ty.clone(), self.gen_lvalue(&a.base)),
            Typespec::Ptr { child, .. } => (Rc::clone(child), self.gen_expr(&a.base).expect("ICE").into_pointer_value()),
            _ => unreachable!("ICE: field access on a non-struct type reached codegen"),
        };
        let Typespec::Struct { decl } = struct_ty_typespec.as_ref() else {
            unreachable!("ICE: auto-deref target is not a struct")
        };
        let struct_ty = self.struct_types[decl];
        let idx = a.field_index.borrow().expect("ICE: struct field access missing resolved index");
        self.builder.build_struct_gep(struct_ty, base_ptr, idx, "field.addr").unwrap()
    }

    // ---- control flow ---------------------------------------------------

    fn gen_if(&mut self, i: &Rc<IfExpr>) -> Option<BasicValueEnum<'ctx>> {
        let func = self.cur_fn.expect("ICE");
        let then_bb = self.context.append_basic_block(func, "if.then");
        let else_bb = self.context.append_basic_block(func, "if.else");
        let merge_bb = self.context.append_basic_block(func, "if.merge");

        let result_ty = i.typespec().filter(|t| matches!(t.accept_kind(), AcceptKind::Runtime | AcceptKind::Comptime)).map(|t| self.llvm_type(&t));
        let slot = result_ty.map(|ty| self.alloca_in_entry(ty, "if.result"));

        let cond = self.gen_expr(&i.condition).expect("ICE: if condition").into_int_value();
        self.builder.build_conditional_branch(cond, then_bb, else_bb).unwrap();

        self.builder.position_at_end(then_bb);
        if let Some(v) = self.gen_block(&i.then_branch) {
            if let Some(slot) = slot {
                self.builder.build_store(slot, v).unwrap();
            }
        }
        if !self.current_block_has_terminator() {
            self.builder.build_unconditional_branch(merge_bb).unwrap();
        }

        self.builder.position_at_end(else_bb);
        if let Some(else_branch) = &i.else_branch {
            if let Some(v) = self.gen_expr(else_branch) {
                if let Some(slot) = slot {
                    self.builder.build_store(slot, v).unwrap();
                }
            }
        }
        if !self.current_block_has_terminator() {
            self.builder.build_unconditional_branch(merge_bb).unwrap();
        }

        self.builder.position_at_end(merge_bb);
        match slot {
            Some(slot) => {
                let ty = i.typespec().unwrap();
                Some(self.builder.build_load(self.llvm_type(&ty), slot, "if.value").unwrap())
            }
            None => None,
        }
    }

    fn gen_while(&mut self, w: &Rc<WhileExpr>) -> Option<BasicValueEnum<'ctx>> {
        let func = self.cur_fn.expect("ICE");
        let cond_bb = self.context.append_basic_block(func, "while.cond");
        let body_bb = self.context.append_basic_block(func, "while.body");
        let else_bb = self.context.append_basic_block(func, "while.else");
        let merge_bb = self.context.append_basic_block(func, "while.merge");

        let result_ty = w.typespec().filter(|t| matches!(t.accept_kind(), AcceptKind::Runtime | AcceptKind::Comptime)).map(|t| self.llvm_type(&t));
        let slot = result_ty.map(|ty| self.alloca_in_entry(ty, "while.result"));
        self.loop_stack.push(LoopCx {
            loop_id: w.id,
            continue_target: cond_bb,
            merge: merge_bb,
            result_slot: slot.zip(result_ty),
        });

        self.builder.build_unconditional_branch(cond_bb).unwrap();
        self.builder.position_at_end(cond_bb);
        let cond = self.gen_expr(&w.condition).expect("ICE: while condition").into_int_value();
        self.builder.build_conditional_branch(cond, body_bb, else_bb).unwrap();

        self.builder.position_at_end(body_bb);
        self.gen_block(&w.body);
        if !self.current_block_has_terminator() {
            self.builder.build_unconditional_branch(cond_bb).unwrap();
        }

        self.builder.position_at_end(else_bb);
        if let Some(else_expr) = &w.else_branch {
            if let Some(v) = self.gen_expr(else_expr) {
                if let Some(slot) = slot {
                    self.builder.build_store(slot, v).unwrap();
                }
            }
        }
        if !self.current_block_has_terminator() {
            self.builder.build_unconditional_branch(merge_bb).unwrap();
        }

        self.loop_stack.pop();
        self.builder.position_at_end(merge_bb);
        match (slot, result_ty) {
            (Some(slot), Some(ty)) => Some(self.builder.build_load(ty, slot, "while.value").unwrap()),
            _ => None,
        }
    }

    fn gen_for(&mut self, f: &Rc<ForExpr>) -> Option<BasicValueEnum<'ctx>> {
        let func = self.cur_fn.expect("ICE");
        for stmt in &f.init {
            self.gen_statement(stmt);
        }
        let cond_bb = self.context.append_basic_block(func, "for.cond");
        let body_bb = self.context.append_basic_block(func, "for.body");
        let step_bb = self.context.append_basic_block(func, "for.step");
        let else_bb = self.context.append_basic_block(func, "for.else");
        let merge_bb = self.context.append_basic_block(func, "for.merge");

        let result_ty = f.typespec().filter(|t| matches!(t.accept_kind(), AcceptKind::Runtime | AcceptKind::Comptime)).map(|t| self.llvm_type(&t));
        let slot = result_ty.map(|ty| self.alloca_in_entry(ty, "for.result"));
        self.loop_stack.push(LoopCx {
            loop_id: f.id,
            continue_target: step_bb,
            merge: merge_bb,
            result_slot: slot.zip(result_ty),
        });

        self.builder.build_unconditional_branch(cond_bb).unwrap();
        self.builder.position_at_end(cond_bb);
        match &f.condition {
            Some(cond_expr) => {
                let cond = self.gen_expr(cond_expr).expect("ICE: for condition").into_int_value();
                self.builder.build_conditional_branch(cond, body_bb, else_bb).unwrap();
            }
            // An empty condition runs forever (spec 9, open-question
            // resolution): the `else` clause is only reachable through an
            // explicit `break`.
            None => {
                self.builder.build_unconditional_branch(body_bb).unwrap();
            }
        }

        self.builder.position_at_end(body_bb);
        self.gen_block(&f.body);
        if !self.current_block_has_terminator() {
            self.builder.build_unconditional_branch(step_bb).unwrap();
        }

        self.builder.position_at_end(step_bb);
        for stmt in &f.step {
            self.gen_statement(stmt);
        }
        if !self.current_block_has_terminator() {
            self.builder.build_unconditional_branch(cond_bb).unwrap();
        }

        self.builder.position_at_end(else_bb);
        if let Some(else_expr) = &f.else_branch {
            if let Some(v) = self.gen_expr(else_expr) {
                if let Some(slot) = slot {
                    self.builder.build_store(slot, v).unwrap();
                }
            }
        }
        if !self.current_block_has_terminator() {
            self.builder.build_unconditional_branch(merge_bb).unwrap();
        }

        self.loop_stack.pop();
        self.builder.position_at_end(merge_bb);
        match (slot, result_ty) {
            (Some(slot), Some(ty)) => Some(self.builder.build_load(ty, slot, "for.value").unwrap()),
            _ => None,
        }
    }

    fn gen_break(&mut self, b: &Rc<BreakExpr>) -> Option<BasicValueEnum<'ctx>> {
        let loop_id = b.loopref.get().expect("ICE: break without a resolved loop");
        if let Some(value_expr) = &b.value {
            if let Some(value) = self.gen_expr(value_expr) {
                let cx = self.loop_stack.iter().rev().find(|c| c.loop_id == loop_id).expect("ICE: break targets an unknown loop");
                if let Some((slot, _)) = cx.result_slot {
                    self.builder.build_store(slot, value).unwrap();
                }
            }
        }
        let merge = self
            .loop_stack
            .iter()
            .rev()
            .find(|c| c.loop_id == loop_id)
            .expect("ICE: break targets an unknown loop")
            .merge;
        self.builder.build_unconditional_branch(merge).unwrap();
        None
    }

    fn gen_continue(&mut self, c: &Rc<ContinueExpr>) -> Option<BasicValueEnum<'ctx>> {
        let loop_id = c.loopref.get().expect("ICE: continue without a resolved loop");
        let target = self
            .loop_stack
            .iter()
            .rev()
            .find(|cx| cx.loop_id == loop_id)
            .expect("ICE: continue targets an unknown loop")
            .continue_target;
        self.builder.build_unconditional_branch(target).unwrap();
        None
    }

    fn gen_return(&mut self, r: &Rc<ReturnExpr>) -> Option<BasicValueEnum<'ctx>> {
        match &r.value {
            Some(value_expr) => {
                let value = self.gen_expr(value_expr);
                match value {
                    Some(v) => self.builder.build_return(Some(&v as &dyn BasicValue)).unwrap(),
                    None => self.builder.build_return(None).unwrap(),
                };
            }
            None => {
                self.builder.build_return(None).unwrap();
            }
        };
        None
    }
}

/// A zero value of `ty`, used as the placeholder initializer for a global
/// before its real (compile-time-constant) initializer, if any, overwrites
/// it — LLVM requires every global definition to carry an initializer up
/// front.
fn zero_of<'ctx>(ty: BasicTypeEnum<'ctx>) -> BasicValueEnum<'ctx> {
    match ty {
        BasicTypeEnum::IntType(t) => t.const_zero().into(),
        BasicTypeEnum::PointerType(t) => t.const_null().into(),
        BasicTypeEnum::ArrayType(t) => t.const_zero().into(),
        BasicTypeEnum::StructType(t) => t.const_zero().into(),
        BasicTypeEnum::FloatType(t) => t.const_zero().into(),
        BasicTypeEnum::VectorType(t) => t.const_zero().into(),
        BasicTypeEnum::ScalableVectorType(t) => t.const_zero().into(),
    }
}
