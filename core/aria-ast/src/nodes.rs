//! Every syntactic form the parser produces, as a closed tagged union.
//!
//! Grouped the way the parser naturally separates things: type syntax
//! (`TypespecSyntax`), expressions (including the control-flow forms, which
//! are expressions here since a block's trailing value can be an `if`, a
//! `while`'s `break` value, etc.), statements that appear inside a block
//! body, and top-level declarations.

use std::cell::RefCell;
use std::rc::Rc;

pub use aria_span::Span;

use crate::typespec::Typespec;

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub enum Mutability {
    #[default]
    Imm,
    Mut,
}

impl Mutability {
    #[must_use]
    pub fn is_mut(&self) -> bool {
        matches!(self, Mutability::Mut)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnaryOp {
    Neg,
    Not,
    AddrOf,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BuiltinSymbolKind {
    True,
    False,
    Void,
    Noreturn,
    PrimType,
}

ast_enums! {

    pub enum Ast {
        SourceFile(Rc<SourceFile>),
    }

    pub enum TypespecSyntax {
        PrimRef(Rc<PrimRefSyntax>),
        Pointer(Rc<PointerSyntax>),
        MultiPointer(Rc<MultiPointerSyntax>),
        Slice(Rc<SliceSyntax>),
        Array(Rc<ArraySyntax>),
        Func(Rc<FuncSyntax>),
        Tuple(Rc<TupleSyntax>),
        GenericApp(Rc<GenericAppSyntax>),
    }

    pub enum Expression {
        IntegerLiteral(Rc<IntegerLiteralExpr>),
        StringLiteral(Rc<StringLiteralExpr>),
        CharLiteral(Rc<CharLiteralExpr>),
        ArrayLiteral(Rc<ArrayLiteralExpr>),
        TupleLiteral(Rc<TupleLiteralExpr>),
        AggregateLiteral(Rc<AggregateLiteralExpr>),
        Symbol(Rc<SymbolExpr>),
        BuiltinSymbol(Rc<BuiltinSymbolExpr>),
        Unary(Rc<UnaryExpr>),
        Deref(Rc<DerefExpr>),
        Index(Rc<IndexExpr>),
        Access(Rc<AccessExpr>),
        ArithmeticBinop(Rc<ArithBinopExpr>),
        BooleanBinop(Rc<BoolBinopExpr>),
        ComparisonBinop(Rc<CmpBinopExpr>),
        Assign(Rc<AssignExpr>),
        Cast(Rc<CastExpr>),
        Call(Rc<CallExpr>),
        Block(Rc<BlockExpr>),
        If(Rc<IfExpr>),
        While(Rc<WhileExpr>),
        For(Rc<ForExpr>),
        Break(Rc<BreakExpr>),
        Continue(Rc<ContinueExpr>),
        Return(Rc<ReturnExpr>),
        @inner_enum Typespec(TypespecSyntax),
    }

    pub enum Statement {
        VariableDecl(Rc<VariableDeclStmt>),
        ExpressionStatement(Rc<ExpressionStatement>),
    }

    pub enum Decl {
        VariableDecl(Rc<VariableDeclStmt>),
        ExternVariableDecl(Rc<ExternVariableDecl>),
        FunctionDef(Rc<FunctionDef>),
        ExternFunctionDef(Rc<ExternFunctionDef>),
        StructDef(Rc<StructDef>),
        TypeAliasDecl(Rc<TypeAliasDecl>),
        Import(Rc<ImportDecl>),
    }
}

ast_nodes! {

    // ---- typespec syntax ------------------------------------------------

    pub struct PrimRefSyntax {
        pub name: String,
    }

    pub struct PointerSyntax {
        pub mutability: Mutability,
        pub child: TypespecSyntax,
    }

    pub struct MultiPointerSyntax {
        pub mutability: Mutability,
        pub child: TypespecSyntax,
    }

    pub struct SliceSyntax {
        pub mutability: Mutability,
        pub child: TypespecSyntax,
    }

    pub struct ArraySyntax {
        pub size: Expression,
        pub child: TypespecSyntax,
    }

    pub struct FuncSyntax {
        pub params: Vec<TypespecSyntax>,
        pub ret: Option<TypespecSyntax>,
    }

    pub struct TupleSyntax {
        pub elements: Vec<TypespecSyntax>,
    }

    pub struct GenericAppSyntax {
        pub base: TypespecSyntax,
        pub args: Vec<TypespecSyntax>,
    }

    // ---- literals & primary expressions ---------------------------------

    pub struct IntegerLiteralExpr {
        pub value: aria_bigint::BigInt,
    }

    pub struct StringLiteralExpr {
        pub value: Vec<u8>,
    }

    pub struct CharLiteralExpr {
        pub value: u32,
    }

    pub struct ArrayLiteralExpr {
        pub element_type: Option<TypespecSyntax>,
        pub elements: Vec<Expression>,
    }

    pub struct TupleLiteralExpr {
        pub elements: Vec<Expression>,
    }

    pub struct AggregateLiteralExpr {
        pub struct_name: TypespecSyntax,
        pub fields: Vec<(String, Span, Expression)>,
    }

    /// An identifier reference. `sym_ref` is filled by the resolver with
    /// the id of the declaration it names.
    pub struct SymbolExpr {
        pub name: String,
        pub sym_ref: RefCell<Option<u32>>,
    }

    pub struct BuiltinSymbolExpr {
        pub kind: BuiltinSymbolKind,
        pub name: String,
    }

    // ---- operators -------------------------------------------------------

    pub struct UnaryExpr {
        pub op: UnaryOp,
        pub operand: Expression,
    }

    pub struct DerefExpr {
        pub operand: Expression,
    }

    pub struct IndexExpr {
        pub base: Expression,
        pub index: Expression,
    }

    /// `acc_resolved` is set by the resolver when the LHS is a module
    /// (resolvable without typing); struct-field and slice-field access are
    /// deferred to the type checker, which fills `field_index` instead.
    pub struct AccessExpr {
        pub base: Expression,
        pub name: String,
        pub acc_resolved: RefCell<Option<u32>>,
        pub field_index: RefCell<Option<u32>>,
    }

    pub struct ArithBinopExpr {
        pub op: ArithOp,
        pub left: Expression,
        pub right: Expression,
    }

    pub struct BoolBinopExpr {
        pub op: BoolOp,
        pub left: Expression,
        pub right: Expression,
    }

    pub struct CmpBinopExpr {
        pub op: CmpOp,
        pub left: Expression,
        pub right: Expression,
        /// The peer type the operands were unified to, recorded for the IR
        /// emitter (the comparison's own type is always `bool`).
        pub operand_typespec: RefCell<Option<Rc<Typespec>>>,
    }

    pub struct AssignExpr {
        pub target: Expression,
        pub value: Expression,
    }

    pub struct CastExpr {
        pub operand: Expression,
        pub target: TypespecSyntax,
    }

    pub struct CallExpr {
        pub callee: Expression,
        pub args: Vec<Expression>,
    }

    // ---- control flow (expression-valued) --------------------------------

    pub struct BlockExpr {
        pub statements: Vec<Statement>,
        pub trailing: Option<Expression>,
    }

    pub struct IfExpr {
        pub condition: Expression,
        pub then_branch: Rc<BlockExpr>,
        pub else_branch: Option<Expression>,
    }

    /// `loop_id` is this loop's own node id, used as the back-pointer target
    /// for `break`/`continue` nodes lexically inside it.
    pub struct WhileExpr {
        pub condition: Expression,
        pub body: Rc<BlockExpr>,
        pub else_branch: Option<Expression>,
    }

    pub struct ForExpr {
        pub init: Vec<Statement>,
        pub condition: Option<Expression>,
        pub step: Vec<Statement>,
        pub body: Rc<BlockExpr>,
        pub else_branch: Option<Expression>,
    }

    /// `loopref` is the id of the enclosing loop (`While`/`For`), set by the
    /// checker as it walks with a loop stack.
    pub struct BreakExpr {
        pub value: Option<Expression>,
        pub loopref: std::cell::Cell<Option<u32>>,
    }

    pub struct ContinueExpr {
        pub loopref: std::cell::Cell<Option<u32>>,
    }

    /// `func_ref` is the id of the enclosing function, set by the checker.
    pub struct ReturnExpr {
        pub value: Option<Expression>,
        pub func_ref: std::cell::Cell<Option<u32>>,
    }

    // ---- statements & declarations ---------------------------------------

    pub struct VariableDeclStmt {
        pub mutability: Mutability,
        pub name: String,
        pub annotation: Option<TypespecSyntax>,
        pub initializer: Option<Expression>,
    }

    pub struct ExternVariableDecl {
        pub mutability: Mutability,
        pub name: String,
        pub annotation: TypespecSyntax,
    }

    pub struct ExpressionStatement {
        pub expression: Expression,
    }

    pub struct Param {
        pub name: String,
        pub annotation: TypespecSyntax,
    }

    pub struct FunctionHeader {
        pub name: String,
        pub params: Vec<Rc<Param>>,
        pub ret: Option<TypespecSyntax>,
    }

    pub struct FunctionDef {
        pub header: Rc<FunctionHeader>,
        pub body: Rc<BlockExpr>,
    }

    pub struct ExternFunctionDef {
        pub header: Rc<FunctionHeader>,
    }

    pub struct StructField {
        pub name: String,
        pub annotation: TypespecSyntax,
    }

    pub struct StructDef {
        pub name: String,
        pub fields: Vec<Rc<StructField>>,
    }

    pub struct TypeAliasDecl {
        pub name: String,
        pub annotation: TypespecSyntax,
    }

    pub struct ImportDecl {
        pub path: String,
        pub binding: String,
    }

    pub struct SourceFile {
        pub decls: Vec<Decl>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_span::SrcManager;

    fn span() -> Span {
        let mut mgr = SrcManager::new();
        let file = mgr.add("t.aria".into(), "x".to_string());
        Span::new(file, 0, 1)
    }

    #[test]
    fn typespec_slot_starts_empty_and_is_settable() {
        let sym = SymbolExpr {
            id: 1,
            span: span(),
            short_span: span(),
            typespec: RefCell::new(None),
            name: "x".to_string(),
            sym_ref: RefCell::new(None),
        };
        assert!(sym.typespec().is_none());
        sym.set_typespec(Rc::new(Typespec::Void));
        assert!(sym.typespec().is_some());
    }

    #[test]
    fn expression_dispatch_recurses_through_inner_enum() {
        let prim = PrimRefSyntax {
            id: 2,
            span: span(),
            short_span: span(),
            typespec: RefCell::new(None),
            name: "u32".to_string(),
        };
        let expr = Expression::Typespec(TypespecSyntax::PrimRef(Rc::new(prim)));
        assert_eq!(expr.id(), 2);
    }
}
