use std::cell::{Cell, RefCell};
use std::rc::Rc;

use aria_ast::nodes::*;
use aria_diagnostics::{DiagnosticEngine, Msg};
use aria_lexer::{Keyword, Punct, Token, TokenKind};
use aria_span::SrcfileId;

/// A parsed file: its id, the tokens that produced it, and its top-level
/// AST nodes — the pairing the source manager conceptually owns, kept
/// outside `aria-span` so that crate doesn't need to depend on the lexer
/// or AST crates above it.
pub struct ParsedFile {
    pub file_id: SrcfileId,
    pub tokens: Vec<Token>,
    pub source_file: Rc<SourceFile>,
    /// One past the highest node id used in this file — the caller's next
    /// `id_start` when parsing further files, so that node ids stay unique
    /// across the whole compilation (every `SymbolExpr.sym_ref` and
    /// `Arena` lookup assumes a single global id space, not one per file).
    pub next_id: u32,
}

/// Parses one file's tokens into a `SourceFile`, numbering its AST nodes
/// starting at `id_start`. The driver threads `next_id` from one file's
/// result into the next file's `id_start` so that ids are unique across
/// every file in the compilation.
pub fn parse_source_file(
    file_id: SrcfileId,
    tokens: Vec<Token>,
    diags: &mut DiagnosticEngine,
    id_start: u32,
) -> ParsedFile {
    let mut parser = Parser::new(&tokens, diags, id_start);
    let start = parser.cur_span();
    let mut decls = Vec::new();
    while !parser.at_eof() {
        match parser.parse_decl() {
            Some(decl) => decls.push(decl),
            None => parser.synchronize_top_level(),
        }
    }
    let end = parser.cur_span();
    let id = parser.next_id();
    let source_file = Rc::new(SourceFile {
        id,
        span: start.to(end),
        short_span: start,
        typespec: RefCell::new(None),
        decls,
    });
    ParsedFile {
        file_id,
        tokens,
        source_file,
        next_id: parser.next_id,
    }
}

struct Parser<'t> {
    toks: &'t [Token],
    pos: usize,
    diags: &'t mut DiagnosticEngine,
    next_id: u32,
    /// True while parsing an `if`/`while`/`for` condition, where a bare
    /// `name {` must parse as the start of the following block rather than
    /// an aggregate literal.
    forbid_struct_literal: bool,
}

impl<'t> Parser<'t> {
    fn new(toks: &'t [Token], diags: &'t mut DiagnosticEngine, id_start: u32) -> Self {
        Self {
            toks,
            pos: 0,
            diags,
            next_id: id_start,
            forbid_struct_literal: false,
        }
    }

    fn parse_condition(&mut self) -> Expression {
        let saved = self.forbid_struct_literal;
        self.forbid_struct_literal = true;
        let cond = self.parse_expression(0);
        self.forbid_struct_literal = saved;
        cond
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn at_eof(&self) -> bool {
        self.cur().is_eof()
    }

    fn cur(&self) -> &Token {
        &self.toks[self.pos.min(self.toks.len() - 1)]
    }

    fn cur_span(&self) -> Span {
        self.cur().span
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.cur().kind
    }

    fn bump(&mut self) -> Token {
        let tok = self.cur().clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        tok
    }

    fn is_punct(&self, p: Punct) -> bool {
        matches!(self.peek_kind(), TokenKind::Punct(q) if *q == p)
    }

    fn is_keyword(&self, k: Keyword) -> bool {
        matches!(self.peek_kind(), TokenKind::Keyword(q) if *q == k)
    }

    fn eat_punct(&mut self, p: Punct) -> bool {
        if self.is_punct(p) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, k: Keyword) -> bool {
        if self.is_keyword(k) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Emits "expected X, found Y" at the current token and returns its
    /// span, for callers that want to keep going with a placeholder.
    fn expect_punct(&mut self, p: Punct, opening: &str) -> Option<Span> {
        if self.is_punct(p) {
            let span = self.cur_span();
            self.bump();
            Some(span)
        } else {
            self.unexpected(&format!("{p:?} while matching {opening}"));
            None
        }
    }

    fn expect_ident(&mut self, ctx: &str) -> Option<(String, Span)> {
        if let TokenKind::Identifier(name) = self.peek_kind().clone() {
            let span = self.cur_span();
            self.bump();
            Some((name, span))
        } else {
            self.unexpected(&format!("an identifier in {ctx}"));
            None
        }
    }

    fn unexpected(&mut self, expected: &str) {
        let span = self.cur_span();
        self.diags.emit(Msg::error(
            format!("unexpected token, expected {expected}"),
            span,
        ));
    }

    /// Advances past the current (offending) token, then until a
    /// synchronizing token — `;`, `}`, or a top-level keyword — is
    /// reached. Never crosses EOF.
    fn synchronize_top_level(&mut self) {
        if self.at_eof() {
            return;
        }
        self.bump();
        while !self.at_eof() {
            if self.is_punct(Punct::Semicolon) {
                self.bump();
                return;
            }
            if matches!(
                self.peek_kind(),
                TokenKind::Keyword(
                    Keyword::Fn | Keyword::Struct | Keyword::Type | Keyword::Import
                        | Keyword::Imm | Keyword::Mut | Keyword::Extern
                )
            ) {
                return;
            }
            self.bump();
        }
    }

    fn synchronize_statement(&mut self) {
        if self.at_eof() {
            return;
        }
        self.bump();
        while !self.at_eof() {
            if self.is_punct(Punct::Semicolon) {
                self.bump();
                return;
            }
            if self.is_punct(Punct::RBrace) {
                return;
            }
            self.bump();
        }
    }

    // ---- top level ---------------------------------------------------

    fn parse_decl(&mut self) -> Option<Decl> {
        if self.is_keyword(Keyword::Imm) || self.is_keyword(Keyword::Mut) {
            return self.parse_variable_decl_top_level();
        }
        if self.is_keyword(Keyword::Fn) {
            return self.parse_function_decl();
        }
        if self.is_keyword(Keyword::Extern) {
            return self.parse_extern_decl();
        }
        if self.is_keyword(Keyword::Struct) {
            return self.parse_struct_decl();
        }
        if self.is_keyword(Keyword::Type) {
            return self.parse_type_alias();
        }
        if self.is_keyword(Keyword::Import) {
            return self.parse_import();
        }
        self.unexpected("a top-level declaration (`imm`, `mut`, `fn`, `extern`, `struct`, `type`, `import`)");
        None
    }

    fn parse_variable_decl_top_level(&mut self) -> Option<Decl> {
        let stmt = self.parse_variable_decl_stmt()?;
        self.eat_punct(Punct::Semicolon);
        Some(Decl::VariableDecl(stmt))
    }

    fn parse_variable_decl_stmt(&mut self) -> Option<Rc<VariableDeclStmt>> {
        let start = self.cur_span();
        let mutability = if self.eat_keyword(Keyword::Mut) {
            Mutability::Mut
        } else {
            self.eat_keyword(Keyword::Imm);
            Mutability::Imm
        };
        let (name, _) = self.expect_ident("a variable declaration")?;
        let annotation = if self.eat_punct(Punct::Colon) {
            Some(self.parse_typespec()?)
        } else {
            None
        };
        let initializer = if self.eat_punct(Punct::Assign) {
            Some(self.parse_expression(0))
        } else {
            None
        };
        let end = self.toks[self.pos.saturating_sub(1)].span;
        let id = self.next_id();
        Some(Rc::new(VariableDeclStmt {
            id,
            span: start.to(end),
            short_span: start,
            typespec: RefCell::new(None),
            mutability,
            name,
            annotation,
            initializer,
        }))
    }

    fn parse_function_decl(&mut self) -> Option<Decl> {
        let start = self.cur_span();
        self.bump(); // fn
        let header = self.parse_function_header()?;
        let body = self.parse_block()?;
        let id = self.next_id();
        Some(Decl::FunctionDef(Rc::new(FunctionDef {
            id,
            span: start.to(body.span),
            short_span: start,
            typespec: RefCell::new(None),
            header,
            body,
        })))
    }

    fn parse_extern_decl(&mut self) -> Option<Decl> {
        let start = self.cur_span();
        self.bump(); // extern
        if self.eat_keyword(Keyword::Fn) {
            let header = self.parse_function_header()?;
            self.expect_punct(Punct::Semicolon, "extern function declaration")?;
            let id = self.next_id();
            return Some(Decl::ExternFunctionDef(Rc::new(ExternFunctionDef {
                id,
                span: start.to(header.span),
                short_span: start,
                typespec: RefCell::new(None),
                header,
            })));
        }
        let mutability = if self.eat_keyword(Keyword::Mut) {
            Mutability::Mut
        } else {
            self.eat_keyword(Keyword::Imm);
            Mutability::Imm
        };
        let (name, _) = self.expect_ident("an extern variable declaration")?;
        self.expect_punct(Punct::Colon, "extern variable declaration")?;
        let annotation = self.parse_typespec()?;
        let end = annotation.span();
        self.expect_punct(Punct::Semicolon, "extern variable declaration")?;
        let id = self.next_id();
        Some(Decl::ExternVariableDecl(Rc::new(ExternVariableDecl {
            id,
            span: start.to(end),
            short_span: start,
            typespec: RefCell::new(None),
            mutability,
            name,
            annotation,
        })))
    }

    fn parse_function_header(&mut self) -> Option<Rc<FunctionHeader>> {
        let start = self.cur_span();
        let (name, _) = self.expect_ident("a function name")?;
        self.expect_punct(Punct::LParen, "function parameter list")?;
        let mut params = Vec::new();
        if !self.is_punct(Punct::RParen) {
            loop {
                let pstart = self.cur_span();
                let (pname, _) = self.expect_ident("a parameter")?;
                self.expect_punct(Punct::Colon, "parameter type annotation")?;
                let annotation = self.parse_typespec()?;
                let pend = annotation.span();
                let pid = self.next_id();
                params.push(Rc::new(Param {
                    id: pid,
                    span: pstart.to(pend),
                    short_span: pstart,
                    typespec: RefCell::new(None),
                    name: pname,
                    annotation,
                }));
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen, "function parameter list")?;
        let ret = if self.is_punct(Punct::LBrace) || self.is_punct(Punct::Semicolon) {
            None
        } else {
            Some(self.parse_typespec()?)
        };
        let end = ret.as_ref().map_or(self.toks[self.pos.saturating_sub(1)].span, |r| r.span());
        let id = self.next_id();
        Some(Rc::new(FunctionHeader {
            id,
            span: start.to(end),
            short_span: start,
            typespec: RefCell::new(None),
            name,
            params,
            ret,
        }))
    }

    fn parse_struct_decl(&mut self) -> Option<Decl> {
        let start = self.cur_span();
        self.bump(); // struct
        let (name, _) = self.expect_ident("a struct name")?;
        self.expect_punct(Punct::LBrace, "struct body")?;
        let mut fields = Vec::new();
        while !self.is_punct(Punct::RBrace) && !self.at_eof() {
            let fstart = self.cur_span();
            let Some((fname, _)) = self.expect_ident("a struct field") else {
                self.synchronize_statement();
                continue;
            };
            if self.expect_punct(Punct::Colon, "struct field type annotation").is_none() {
                self.synchronize_statement();
                continue;
            }
            let Some(annotation) = self.parse_typespec() else {
                self.synchronize_statement();
                continue;
            };
            let fend = annotation.span();
            let fid = self.next_id();
            fields.push(Rc::new(StructField {
                id: fid,
                span: fstart.to(fend),
                short_span: fstart,
                typespec: RefCell::new(None),
                name: fname,
                annotation,
            }));
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        let end = self.cur_span();
        self.expect_punct(Punct::RBrace, "struct body")?;
        let id = self.next_id();
        Some(Decl::StructDef(Rc::new(StructDef {
            id,
            span: start.to(end),
            short_span: start,
            typespec: RefCell::new(None),
            name,
            fields,
        })))
    }

    fn parse_type_alias(&mut self) -> Option<Decl> {
        let start = self.cur_span();
        self.bump(); // type
        let (name, _) = self.expect_ident("a type alias name")?;
        self.expect_punct(Punct::Assign, "type alias")?;
        let annotation = self.parse_typespec()?;
        let end = annotation.span();
        self.expect_punct(Punct::Semicolon, "type alias")?;
        let id = self.next_id();
        Some(Decl::TypeAliasDecl(Rc::new(TypeAliasDecl {
            id,
            span: start.to(end),
            short_span: start,
            typespec: RefCell::new(None),
            name,
            annotation,
        })))
    }

    fn parse_import(&mut self) -> Option<Decl> {
        let start = self.cur_span();
        self.bump(); // import
        let path_span = self.cur_span();
        let path = match self.peek_kind().clone() {
            TokenKind::String(bytes) => {
                self.bump();
                String::from_utf8_lossy(&bytes).into_owned()
            }
            _ => {
                self.unexpected("a string path in `import`");
                return None;
            }
        };
        let binding = path
            .rsplit('/')
            .next()
            .unwrap_or(&path)
            .trim_end_matches(".aria")
            .to_string();
        self.expect_punct(Punct::Semicolon, "import")?;
        let id = self.next_id();
        Some(Decl::Import(Rc::new(ImportDecl {
            id,
            span: start.to(path_span),
            short_span: start,
            typespec: RefCell::new(None),
            path,
            binding,
        })))
    }

    // ---- typespec syntax ----------------------------------------------

    fn parse_typespec(&mut self) -> Option<TypespecSyntax> {
        let start = self.cur_span();
        if self.eat_punct(Punct::Star) {
            let mutability = if self.eat_keyword(Keyword::Imm) {
                Mutability::Imm
            } else {
                self.eat_keyword(Keyword::Mut);
                Mutability::Mut
            };
            let child = self.parse_typespec()?;
            let id = self.next_id();
            return Some(TypespecSyntax::Pointer(Rc::new(PointerSyntax {
                id,
                span: start.to(child.span()),
                short_span: start,
                typespec: RefCell::new(None),
                mutability,
                child,
            })));
        }
        if self.is_punct(Punct::LBracket) {
            return self.parse_bracketed_typespec(start);
        }
        if self.is_punct(Punct::LParen) {
            return self.parse_tuple_typespec(start);
        }
        if self.is_keyword(Keyword::Fn) {
            return self.parse_func_typespec(start);
        }
        let (name, _) = self.expect_ident("a type")?;
        let base_id = self.next_id();
        let base = TypespecSyntax::PrimRef(Rc::new(PrimRefSyntax {
            id: base_id,
            span: start,
            short_span: start,
            typespec: RefCell::new(None),
            name,
        }));
        if self.eat_punct(Punct::LParen) {
            let mut args = Vec::new();
            if !self.is_punct(Punct::RParen) {
                loop {
                    args.push(self.parse_typespec()?);
                    if !self.eat_punct(Punct::Comma) {
                        break;
                    }
                }
            }
            let end = self.cur_span();
            self.expect_punct(Punct::RParen, "generic type argument list")?;
            let id = self.next_id();
            return Some(TypespecSyntax::GenericApp(Rc::new(GenericAppSyntax {
                id,
                span: start.to(end),
                short_span: start,
                typespec: RefCell::new(None),
                base,
                args,
            })));
        }
        Some(base)
    }

    fn parse_bracketed_typespec(&mut self, start: Span) -> Option<TypespecSyntax> {
        self.bump(); // [
        if self.eat_punct(Punct::Star) {
            self.expect_punct(Punct::RBracket, "multi-pointer type `[*]T`")?;
            let mutability = if self.eat_keyword(Keyword::Imm) {
                Mutability::Imm
            } else {
                self.eat_keyword(Keyword::Mut);
                Mutability::Mut
            };
            let child = self.parse_typespec()?;
            let id = self.next_id();
            return Some(TypespecSyntax::MultiPointer(Rc::new(MultiPointerSyntax {
                id,
                span: start.to(child.span()),
                short_span: start,
                typespec: RefCell::new(None),
                mutability,
                child,
            })));
        }
        if self.eat_punct(Punct::RBracket) {
            let mutability = if self.eat_keyword(Keyword::Imm) {
                Mutability::Imm
            } else {
                self.eat_keyword(Keyword::Mut);
                Mutability::Mut
            };
            let child = self.parse_typespec()?;
            let id = self.next_id();
            return Some(TypespecSyntax::Slice(Rc::new(SliceSyntax {
                id,
                span: start.to(child.span()),
                short_span: start,
                typespec: RefCell::new(None),
                mutability,
                child,
            })));
        }
        let size = self.parse_expression(0);
        self.expect_punct(Punct::RBracket, "array type `[N]T`")?;
        let child = self.parse_typespec()?;
        let id = self.next_id();
        Some(TypespecSyntax::Array(Rc::new(ArraySyntax {
            id,
            span: start.to(child.span()),
            short_span: start,
            typespec: RefCell::new(None),
            size,
            child,
        })))
    }

    fn parse_tuple_typespec(&mut self, start: Span) -> Option<TypespecSyntax> {
        self.bump(); // (
        let mut elements = Vec::new();
        if !self.is_punct(Punct::RParen) {
            loop {
                elements.push(self.parse_typespec()?);
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        let end = self.cur_span();
        self.expect_punct(Punct::RParen, "tuple type")?;
        let id = self.next_id();
        Some(TypespecSyntax::Tuple(Rc::new(TupleSyntax {
            id,
            span: start.to(end),
            short_span: start,
            typespec: RefCell::new(None),
            elements,
        })))
    }

    fn parse_func_typespec(&mut self, start: Span) -> Option<TypespecSyntax> {
        self.bump(); // fn
        self.expect_punct(Punct::LParen, "function type parameter list")?;
        let mut params = Vec::new();
        if !self.is_punct(Punct::RParen) {
            loop {
                params.push(self.parse_typespec()?);
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen, "function type parameter list")?;
        let ret = if self.is_punct(Punct::RParen)
            || self.is_punct(Punct::Comma)
            || self.is_punct(Punct::Semicolon)
            || self.is_punct(Punct::RBrace)
        {
            None
        } else {
            Some(self.parse_typespec()?)
        };
        let end = ret.as_ref().map_or(self.toks[self.pos.saturating_sub(1)].span, |r| r.span());
        let id = self.next_id();
        Some(TypespecSyntax::Func(Rc::new(FuncSyntax {
            id,
            span: start.to(end),
            short_span: start,
            typespec: RefCell::new(None),
            params,
            ret,
        })))
    }

    // ---- blocks & statements -------------------------------------------

    fn parse_block(&mut self) -> Option<Rc<BlockExpr>> {
        let start = self.cur_span();
        self.expect_punct(Punct::LBrace, "block")?;
        let mut statements = Vec::new();
        let mut trailing = None;
        while !self.is_punct(Punct::RBrace) && !self.at_eof() {
            // An expression not followed by `;` before `}` is the block's
            // trailing value.
            if self.starts_statement_keyword() {
                match self.parse_statement() {
                    Some(stmt) => statements.push(stmt),
                    None => self.synchronize_statement(),
                }
                continue;
            }
            let expr = self.parse_expression(0);
            if self.eat_punct(Punct::Semicolon) {
                let id = self.next_id();
                statements.push(Statement::ExpressionStatement(Rc::new(
                    ExpressionStatement {
                        id,
                        span: expr.span(),
                        short_span: expr.span(),
                        typespec: RefCell::new(None),
                        expression: expr,
                    },
                )));
            } else {
                trailing = Some(expr);
                break;
            }
        }
        let end = self.cur_span();
        self.expect_punct(Punct::RBrace, "block")?;
        let id = self.next_id();
        Some(Rc::new(BlockExpr {
            id,
            span: start.to(end),
            short_span: start,
            typespec: RefCell::new(None),
            statements,
            trailing,
        }))
    }

    fn starts_statement_keyword(&self) -> bool {
        self.is_keyword(Keyword::Imm) || self.is_keyword(Keyword::Mut)
    }

    fn parse_statement(&mut self) -> Option<Statement> {
        if self.is_keyword(Keyword::Imm) || self.is_keyword(Keyword::Mut) {
            let decl = self.parse_variable_decl_stmt()?;
            self.eat_punct(Punct::Semicolon);
            return Some(Statement::VariableDecl(decl));
        }
        None
    }

    // ---- expressions: Pratt precedence climbing -------------------------
    //
    // Low to high: assignment (right-assoc) < || < && < equality/comparison
    // < additive < multiplicative < `as` cast < unary < postfix.

    fn parse_expression(&mut self, min_bp: u8) -> Expression {
        let mut lhs = self.parse_unary();
        loop {
            let Some((op_bp, right_assoc)) = self.infix_binding_power() else {
                break;
            };
            if op_bp < min_bp {
                break;
            }
            lhs = self.parse_infix(lhs, if right_assoc { op_bp } else { op_bp + 1 });
        }
        lhs
    }

    fn infix_binding_power(&self) -> Option<(u8, bool)> {
        use Punct::*;
        let p = match self.peek_kind() {
            TokenKind::Punct(p) => *p,
            TokenKind::Keyword(Keyword::As) => return Some((80, false)),
            _ => return None,
        };
        Some(match p {
            Assign => (10, true),
            PipePipe => (20, false),
            AmpAmp => (30, false),
            EqEq | BangEq | Lt | Le | Gt | Ge => (40, false),
            Plus | Minus => (60, false),
            Star | Slash | Percent => (70, false),
            _ => return None,
        })
    }

    fn parse_infix(&mut self, lhs: Expression, next_min_bp: u8) -> Expression {
        let op_tok = self.bump();
        match &op_tok.kind {
            TokenKind::Punct(Punct::Assign) => {
                let rhs = self.parse_expression(next_min_bp);
                let id = self.next_id();
                Expression::Assign(Rc::new(AssignExpr {
                    id,
                    span: lhs.span().to(rhs.span()),
                    short_span: op_tok.span,
                    typespec: RefCell::new(None),
                    target: lhs,
                    value: rhs,
                }))
            }
            TokenKind::Punct(Punct::PipePipe) => {
                let rhs = self.parse_expression(next_min_bp);
                self.make_bool_binop(BoolOp::Or, lhs, rhs, op_tok.span)
            }
            TokenKind::Punct(Punct::AmpAmp) => {
                let rhs = self.parse_expression(next_min_bp);
                self.make_bool_binop(BoolOp::And, lhs, rhs, op_tok.span)
            }
            TokenKind::Punct(p @ (Punct::EqEq | Punct::BangEq | Punct::Lt | Punct::Le | Punct::Gt | Punct::Ge)) => {
                let cmp = match p {
                    Punct::EqEq => CmpOp::Eq,
                    Punct::BangEq => CmpOp::Ne,
                    Punct::Lt => CmpOp::Lt,
                    Punct::Le => CmpOp::Le,
                    Punct::Gt => CmpOp::Gt,
                    Punct::Ge => CmpOp::Ge,
                    _ => unreachable!(),
                };
                let rhs = self.parse_expression(next_min_bp);
                let id = self.next_id();
                Expression::ComparisonBinop(Rc::new(CmpBinopExpr {
                    id,
                    span: lhs.span().to(rhs.span()),
                    short_span: op_tok.span,
                    typespec: RefCell::new(None),
                    op: cmp,
                    left: lhs,
                    right: rhs,
                    operand_typespec: RefCell::new(None),
                }))
            }
            TokenKind::Punct(p @ (Punct::Plus | Punct::Minus | Punct::Star | Punct::Slash | Punct::Percent)) => {
                let arith = match p {
                    Punct::Plus => ArithOp::Add,
                    Punct::Minus => ArithOp::Sub,
                    Punct::Star => ArithOp::Mul,
                    Punct::Slash => ArithOp::Div,
                    Punct::Percent => ArithOp::Mod,
                    _ => unreachable!(),
                };
                let rhs = self.parse_expression(next_min_bp);
                let id = self.next_id();
                Expression::ArithmeticBinop(Rc::new(ArithBinopExpr {
                    id,
                    span: lhs.span().to(rhs.span()),
                    short_span: op_tok.span,
                    typespec: RefCell::new(None),
                    op: arith,
                    left: lhs,
                    right: rhs,
                }))
            }
            TokenKind::Keyword(Keyword::As) => {
                let target = self.parse_typespec().unwrap_or_else(|| self.error_typespec(op_tok.span));
                let id = self.next_id();
                Expression::Cast(Rc::new(CastExpr {
                    id,
                    span: lhs.span().to(target.span()),
                    short_span: op_tok.span,
                    typespec: RefCell::new(None),
                    operand: lhs,
                    target,
                }))
            }
            _ => unreachable!("infix_binding_power and parse_infix must agree"),
        }
    }

    fn make_bool_binop(&mut self, op: BoolOp, lhs: Expression, rhs: Expression, op_span: Span) -> Expression {
        let id = self.next_id();
        Expression::BooleanBinop(Rc::new(BoolBinopExpr {
            id,
            span: lhs.span().to(rhs.span()),
            short_span: op_span,
            typespec: RefCell::new(None),
            op,
            left: lhs,
            right: rhs,
        }))
    }

    fn error_typespec(&mut self, span: Span) -> TypespecSyntax {
        let id = self.next_id();
        TypespecSyntax::PrimRef(Rc::new(PrimRefSyntax {
            id,
            span,
            short_span: span,
            typespec: RefCell::new(None),
            name: String::new(),
        }))
    }

    /// Unary operators bind tighter than any binary operator, and `as`
    /// binds looser than unary but tighter than comparison, per the
    /// precedence table.
    fn parse_unary(&mut self) -> Expression {
        let start = self.cur_span();
        if self.eat_punct(Punct::Minus) {
            let operand = self.parse_unary();
            let id = self.next_id();
            return Expression::Unary(Rc::new(UnaryExpr {
                id,
                span: start.to(operand.span()),
                short_span: start,
                typespec: RefCell::new(None),
                op: UnaryOp::Neg,
                operand,
            }));
        }
        if self.eat_punct(Punct::Bang) {
            let operand = self.parse_unary();
            let id = self.next_id();
            return Expression::Unary(Rc::new(UnaryExpr {
                id,
                span: start.to(operand.span()),
                short_span: start,
                typespec: RefCell::new(None),
                op: UnaryOp::Not,
                operand,
            }));
        }
        if self.eat_punct(Punct::Amp) {
            let operand = self.parse_unary();
            let id = self.next_id();
            return Expression::Unary(Rc::new(UnaryExpr {
                id,
                span: start.to(operand.span()),
                short_span: start,
                typespec: RefCell::new(None),
                op: UnaryOp::AddrOf,
                operand,
            }));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Expression {
        let mut expr = self.parse_primary();
        loop {
            if self.is_punct(Punct::LParen) {
                expr = self.parse_call(expr);
            } else if self.eat_punct(Punct::LBracket) {
                let index = self.parse_expression(0);
                let end = self.cur_span();
                self.expect_punct(Punct::RBracket, "index expression");
                let id = self.next_id();
                expr = Expression::Index(Rc::new(IndexExpr {
                    id,
                    span: expr.span().to(end),
                    short_span: expr.span(),
                    typespec: RefCell::new(None),
                    base: expr,
                    index,
                }));
            } else if self.is_punct(Punct::DotStar) {
                let op_span = self.cur_span();
                self.bump();
                let id = self.next_id();
                expr = Expression::Deref(Rc::new(DerefExpr {
                    id,
                    span: expr.span().to(op_span),
                    short_span: op_span,
                    typespec: RefCell::new(None),
                    operand: expr,
                }));
            } else if self.eat_punct(Punct::Dot) {
                let Some((name, name_span)) = self.expect_ident("a field name after `.`") else {
                    break;
                };
                let id = self.next_id();
                expr = Expression::Access(Rc::new(AccessExpr {
                    id,
                    span: expr.span().to(name_span),
                    short_span: name_span,
                    typespec: RefCell::new(None),
                    base: expr,
                    name,
                    acc_resolved: RefCell::new(None),
                    field_index: RefCell::new(None),
                }));
            } else {
                break;
            }
        }
        expr
    }

    fn parse_call(&mut self, callee: Expression) -> Expression {
        self.bump(); // (
        let mut args = Vec::new();
        if !self.is_punct(Punct::RParen) {
            loop {
                args.push(self.parse_expression(0));
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        let end = self.cur_span();
        self.expect_punct(Punct::RParen, "call argument list");
        let id = self.next_id();
        Expression::Call(Rc::new(CallExpr {
            id,
            span: callee.span().to(end),
            short_span: callee.span(),
            typespec: RefCell::new(None),
            callee,
            args,
        }))
    }

    fn parse_primary(&mut self) -> Expression {
        let start = self.cur_span();
        match self.peek_kind().clone() {
            TokenKind::Integer(value) => {
                self.bump();
                let id = self.next_id();
                Expression::IntegerLiteral(Rc::new(IntegerLiteralExpr {
                    id,
                    span: start,
                    short_span: start,
                    typespec: RefCell::new(None),
                    value,
                }))
            }
            TokenKind::String(bytes) => {
                self.bump();
                let id = self.next_id();
                Expression::StringLiteral(Rc::new(StringLiteralExpr {
                    id,
                    span: start,
                    short_span: start,
                    typespec: RefCell::new(None),
                    value: bytes,
                }))
            }
            TokenKind::Char(value) => {
                self.bump();
                let id = self.next_id();
                Expression::CharLiteral(Rc::new(CharLiteralExpr {
                    id,
                    span: start,
                    short_span: start,
                    typespec: RefCell::new(None),
                    value,
                }))
            }
            TokenKind::Identifier(name) => {
                self.bump();
                if self.is_punct(Punct::LBrace) && !self.forbid_struct_literal {
                    return self.parse_aggregate_literal(name, start);
                }
                let id = self.next_id();
                Expression::Symbol(Rc::new(SymbolExpr {
                    id,
                    span: start,
                    short_span: start,
                    typespec: RefCell::new(None),
                    name,
                    sym_ref: RefCell::new(None),
                }))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.bump();
                self.builtin_symbol(BuiltinSymbolKind::True, "true", start)
            }
            TokenKind::Keyword(Keyword::False) => {
                self.bump();
                self.builtin_symbol(BuiltinSymbolKind::False, "false", start)
            }
            TokenKind::Keyword(Keyword::Void) => {
                self.bump();
                self.builtin_symbol(BuiltinSymbolKind::Void, "void", start)
            }
            TokenKind::Keyword(Keyword::Noreturn) => {
                self.bump();
                self.builtin_symbol(BuiltinSymbolKind::Noreturn, "noreturn", start)
            }
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            TokenKind::Keyword(Keyword::Break) => self.parse_break(),
            TokenKind::Keyword(Keyword::Continue) => self.parse_continue(),
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Punct(Punct::LBrace) => {
                let block = self.parse_block().unwrap_or_else(|| self.empty_block(start));
                Expression::Block(block)
            }
            TokenKind::Punct(Punct::LBracket) => self.parse_array_literal(start),
            TokenKind::Punct(Punct::LParen) => self.parse_paren_or_tuple(start),
            _ => {
                self.unexpected("an expression");
                self.bump();
                let id = self.next_id();
                Expression::IntegerLiteral(Rc::new(IntegerLiteralExpr {
                    id,
                    span: start,
                    short_span: start,
                    typespec: RefCell::new(None),
                    value: aria_bigint::BigInt::zero(),
                }))
            }
        }
    }

    fn builtin_symbol(&mut self, kind: BuiltinSymbolKind, name: &str, span: Span) -> Expression {
        let id = self.next_id();
        Expression::BuiltinSymbol(Rc::new(BuiltinSymbolExpr {
            id,
            span,
            short_span: span,
            typespec: RefCell::new(None),
            kind,
            name: name.to_string(),
        }))
    }

    fn empty_block(&mut self, span: Span) -> Rc<BlockExpr> {
        let id = self.next_id();
        Rc::new(BlockExpr {
            id,
            span,
            short_span: span,
            typespec: RefCell::new(None),
            statements: Vec::new(),
            trailing: None,
        })
    }

    fn parse_aggregate_literal(&mut self, name: String, start: Span) -> Expression {
        let base_id = self.next_id();
        let struct_name = TypespecSyntax::PrimRef(Rc::new(PrimRefSyntax {
            id: base_id,
            span: start,
            short_span: start,
            typespec: RefCell::new(None),
            name,
        }));
        self.bump(); // {
        let mut fields = Vec::new();
        while !self.is_punct(Punct::RBrace) && !self.at_eof() {
            let Some((fname, fspan)) = self.expect_ident("an aggregate literal field") else {
                break;
            };
            if self.expect_punct(Punct::Colon, "aggregate literal field").is_none() {
                break;
            }
            let value = self.parse_expression(0);
            fields.push((fname, fspan, value));
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        let end = self.cur_span();
        self.expect_punct(Punct::RBrace, "aggregate literal");
        let id = self.next_id();
        Expression::AggregateLiteral(Rc::new(AggregateLiteralExpr {
            id,
            span: start.to(end),
            short_span: start,
            typespec: RefCell::new(None),
            struct_name,
            fields,
        }))
    }

    fn parse_array_literal(&mut self, start: Span) -> Expression {
        self.bump(); // [
        let mut elements = Vec::new();
        if !self.is_punct(Punct::RBracket) {
            loop {
                elements.push(self.parse_expression(0));
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        let end = self.cur_span();
        self.expect_punct(Punct::RBracket, "array literal");
        let element_type = None;
        let id = self.next_id();
        Expression::ArrayLiteral(Rc::new(ArrayLiteralExpr {
            id,
            span: start.to(end),
            short_span: start,
            typespec: RefCell::new(None),
            element_type,
            elements,
        }))
    }

    fn parse_paren_or_tuple(&mut self, start: Span) -> Expression {
        self.bump(); // (
        let mut elements = Vec::new();
        if !self.is_punct(Punct::RParen) {
            loop {
                elements.push(self.parse_expression(0));
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        let end = self.cur_span();
        self.expect_punct(Punct::RParen, "parenthesized expression");
        if elements.len() == 1 {
            return elements.pop().unwrap();
        }
        let id = self.next_id();
        Expression::TupleLiteral(Rc::new(TupleLiteralExpr {
            id,
            span: start.to(end),
            short_span: start,
            typespec: RefCell::new(None),
            elements,
        }))
    }

    fn parse_return(&mut self) -> Expression {
        let start = self.cur_span();
        self.bump(); // return
        let value = if self.is_punct(Punct::Semicolon) || self.is_punct(Punct::RBrace) {
            None
        } else {
            Some(self.parse_expression(0))
        };
        let end = value.as_ref().map_or(start, |v| v.span());
        let id = self.next_id();
        Expression::Return(Rc::new(ReturnExpr {
            id,
            span: start.to(end),
            short_span: start,
            typespec: RefCell::new(None),
            value,
            func_ref: Cell::new(None),
        }))
    }

    fn parse_break(&mut self) -> Expression {
        let start = self.cur_span();
        self.bump(); // break
        let value = if self.is_punct(Punct::Semicolon) || self.is_punct(Punct::RBrace) {
            None
        } else {
            Some(self.parse_expression(0))
        };
        let end = value.as_ref().map_or(start, |v| v.span());
        let id = self.next_id();
        Expression::Break(Rc::new(BreakExpr {
            id,
            span: start.to(end),
            short_span: start,
            typespec: RefCell::new(None),
            value,
            loopref: Cell::new(None),
        }))
    }

    fn parse_continue(&mut self) -> Expression {
        let start = self.cur_span();
        self.bump(); // continue
        let id = self.next_id();
        Expression::Continue(Rc::new(ContinueExpr {
            id,
            span: start,
            short_span: start,
            typespec: RefCell::new(None),
            loopref: Cell::new(None),
        }))
    }

    fn parse_if(&mut self) -> Expression {
        let start = self.cur_span();
        self.bump(); // if
        let condition = self.parse_condition();
        let then_branch = self.parse_block().unwrap_or_else(|| self.empty_block(condition.span()));
        let else_branch = if self.eat_keyword(Keyword::Else) {
            if self.is_keyword(Keyword::If) {
                Some(self.parse_if())
            } else {
                self.parse_block().map(Expression::Block)
            }
        } else {
            None
        };
        let end = else_branch.as_ref().map_or(then_branch.span, |e| e.span());
        let id = self.next_id();
        Expression::If(Rc::new(IfExpr {
            id,
            span: start.to(end),
            short_span: start,
            typespec: RefCell::new(None),
            condition,
            then_branch,
            else_branch,
        }))
    }

    fn parse_while(&mut self) -> Expression {
        let start = self.cur_span();
        self.bump(); // while
        let condition = self.parse_condition();
        let body = self.parse_block().unwrap_or_else(|| self.empty_block(condition.span()));
        let else_branch = if self.eat_keyword(Keyword::Else) {
            Some(self.parse_loop_else())
        } else {
            None
        };
        let end = else_branch.as_ref().map_or(body.span, |e| e.span());
        let id = self.next_id();
        Expression::While(Rc::new(WhileExpr {
            id,
            span: start.to(end),
            short_span: start,
            typespec: RefCell::new(None),
            condition,
            body,
            else_branch,
        }))
    }

    fn parse_for(&mut self) -> Expression {
        let start = self.cur_span();
        self.bump(); // for
        let mut init = Vec::new();
        if !self.is_punct(Punct::Semicolon) {
            loop {
                if let Some(stmt) = self.parse_statement() {
                    init.push(stmt);
                } else {
                    let expr = self.parse_expression(0);
                    let id = self.next_id();
                    init.push(Statement::ExpressionStatement(Rc::new(ExpressionStatement {
                        id,
                        span: expr.span(),
                        short_span: expr.span(),
                        typespec: RefCell::new(None),
                        expression: expr,
                    })));
                }
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect_punct(Punct::Semicolon, "`for` init/condition separator");
        let saved_forbid = self.forbid_struct_literal;
        self.forbid_struct_literal = true;
        let condition = if self.is_punct(Punct::Semicolon) {
            None
        } else {
            Some(self.parse_expression(0))
        };
        self.expect_punct(Punct::Semicolon, "`for` condition/step separator");
        let mut step = Vec::new();
        if !self.is_punct(Punct::LBrace) {
            loop {
                let expr = self.parse_expression(0);
                let id = self.next_id();
                step.push(Statement::ExpressionStatement(Rc::new(ExpressionStatement {
                    id,
                    span: expr.span(),
                    short_span: expr.span(),
                    typespec: RefCell::new(None),
                    expression: expr,
                })));
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        self.forbid_struct_literal = saved_forbid;
        let body = self.parse_block().unwrap_or_else(|| self.empty_block(start));
        let else_branch = if self.eat_keyword(Keyword::Else) {
            Some(self.parse_loop_else())
        } else {
            None
        };
        let end = else_branch.as_ref().map_or(body.span, |e| e.span());
        let id = self.next_id();
        Expression::For(Rc::new(ForExpr {
            id,
            span: start.to(end),
            short_span: start,
            typespec: RefCell::new(None),
            init,
            condition,
            step,
            body,
            else_branch,
        }))
    }

    /// A loop's `else` clause, unlike `if`'s, is never followed by another
    /// `else if` chain — it's a single value-producing expression, brace
    /// block or bare (spec.md boundary case: `while true { break 1; } else
    /// 0` must compile with a bare `0`, not only `else { 0 }`).
    fn parse_loop_else(&mut self) -> Expression {
        if self.is_punct(Punct::LBrace) {
            let start = self.cur_span();
            Expression::Block(self.parse_block().unwrap_or_else(|| self.empty_block(start)))
        } else {
            self.parse_expression(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_diagnostics::DiagnosticEngine;
    use aria_span::SrcManager;

    fn parse(src: &str) -> (ParsedFile, DiagnosticEngine) {
        let mut mgr = SrcManager::new();
        let id = mgr.add("t.aria".into(), src.to_string());
        let mut diags = DiagnosticEngine::new();
        let tokens = aria_lexer::lex(mgr.get(id), id, &mut diags);
        let parsed = parse_source_file(id, tokens, &mut diags, 1);
        (parsed, diags)
    }

    #[test]
    fn parses_main_returning_zero() {
        let (parsed, diags) = parse("fn main() i32 { return 0; }");
        assert!(!diags.has_errors());
        assert_eq!(parsed.source_file.decls.len(), 1);
        assert!(matches!(parsed.source_file.decls[0], Decl::FunctionDef(_)));
    }

    #[test]
    fn parses_if_without_else_as_trailing_expression() {
        let (parsed, diags) = parse("fn h() i32 { if true { 1 } }");
        assert!(!diags.has_errors());
        let Decl::FunctionDef(f) = &parsed.source_file.decls[0] else {
            panic!("expected function def");
        };
        assert!(f.body.trailing.is_some());
    }

    #[test]
    fn parses_struct_with_fields() {
        let (parsed, diags) = parse("struct Point { x: i32, y: i32 }");
        assert!(!diags.has_errors());
        let Decl::StructDef(s) = &parsed.source_file.decls[0] else {
            panic!("expected struct def");
        };
        assert_eq!(s.fields.len(), 2);
    }

    #[test]
    fn parses_pointer_and_slice_typespecs() {
        let (parsed, diags) = parse("extern mut p: *imm u32;\nextern mut s: []u8;\n");
        assert!(!diags.has_errors());
        assert_eq!(parsed.source_file.decls.len(), 2);
    }

    #[test]
    fn parses_while_with_break_and_else() {
        let (parsed, diags) = parse("fn k() i32 { while true { break 1; } else { 0 } }");
        assert!(!diags.has_errors());
        let Decl::FunctionDef(f) = &parsed.source_file.decls[0] else {
            panic!("expected function def");
        };
        assert!(f.body.trailing.is_some());
    }

    /// spec.md concrete scenario 5: a loop `else` clause need not be a
    /// brace block — `while true { break 1; } else 0` must parse with a
    /// bare expression, not only `else { 0 }`.
    #[test]
    fn parses_while_with_bare_expression_else() {
        let (parsed, diags) = parse("fn k() i32 { while true { break 1; } else 0 }");
        assert!(!diags.has_errors());
        let Decl::FunctionDef(f) = &parsed.source_file.decls[0] else {
            panic!("expected function def");
        };
        let Some(Expression::While(w)) = &f.body.trailing else {
            panic!("expected the block's trailing value to be the `while` expression");
        };
        assert!(
            matches!(w.else_branch, Some(Expression::IntegerLiteral(_))),
            "expected a bare integer-literal else clause, not a block"
        );
    }

    #[test]
    fn parses_for_with_bare_expression_else() {
        let (parsed, diags) = parse("fn k() i32 { for ;; { break 1; } else 0 }");
        assert!(!diags.has_errors());
        let Decl::FunctionDef(f) = &parsed.source_file.decls[0] else {
            panic!("expected function def");
        };
        let Some(Expression::For(fx)) = &f.body.trailing else {
            panic!("expected the block's trailing value to be the `for` expression");
        };
        assert!(
            matches!(fx.else_branch, Some(Expression::IntegerLiteral(_))),
            "expected a bare integer-literal else clause, not a block"
        );
    }

    #[test]
    fn recovers_after_syntax_error_and_keeps_parsing() {
        let (parsed, diags) = parse("fn a() i32 { return )( ; }\nfn b() i32 { return 0; }");
        assert!(diags.has_errors());
        assert_eq!(parsed.source_file.decls.len(), 2);
    }

    #[test]
    fn pratt_precedence_additive_before_comparison() {
        let (parsed, diags) = parse("fn f() bool { return 1 + 2 == 3; }");
        assert!(!diags.has_errors());
        let Decl::FunctionDef(f) = &parsed.source_file.decls[0] else {
            panic!("expected function def");
        };
        let Some(Statement::ExpressionStatement(_)) = f.body.statements.first() else {
            panic!("expected return statement")
        };
    }

    #[test]
    fn cast_binds_tighter_than_comparison() {
        let (_, diags) = parse("fn f() bool { return 1 as i64 == 1; }");
        assert!(!diags.has_errors());
    }

    /// spec.md §4.3: `as` binds tighter than additive and multiplicative, so
    /// `1 + 2 as i64` must parse as `1 + (2 as i64)`, not `(1 + 2) as i64`.
    #[test]
    fn cast_binds_tighter_than_additive() {
        let (parsed, diags) = parse("fn f() i64 { return 1 + 2 as i64; }");
        assert!(!diags.has_errors());
        let Decl::FunctionDef(f) = &parsed.source_file.decls[0] else {
            panic!("expected function def");
        };
        let Some(Statement::ExpressionStatement(ret)) = f.body.statements.first() else {
            panic!("expected return statement")
        };
        let Expression::Return(ret) = &ret.expression else {
            panic!("expected return expression");
        };
        let Expression::ArithmeticBinop(add) = ret.value.as_ref().expect("return has a value") else {
            panic!("expected the outermost expression to be `+`");
        };
        assert!(
            matches!(add.right, Expression::Cast(_)),
            "expected `as` to bind to the right operand of `+` alone"
        );
    }

    /// Same rule against multiplicative: `2 * 3 as i64` must parse as
    /// `2 * (3 as i64)`, not `(2 * 3) as i64`.
    #[test]
    fn cast_binds_tighter_than_multiplicative() {
        let (parsed, diags) = parse("fn f() i64 { return 2 * 3 as i64; }");
        assert!(!diags.has_errors());
        let Decl::FunctionDef(f) = &parsed.source_file.decls[0] else {
            panic!("expected function def");
        };
        let Some(Statement::ExpressionStatement(ret)) = f.body.statements.first() else {
            panic!("expected return statement")
        };
        let Expression::Return(ret) = &ret.expression else {
            panic!("expected return expression");
        };
        let Expression::ArithmeticBinop(mul) = ret.value.as_ref().expect("return has a value") else {
            panic!("expected the outermost expression to be `*`");
        };
        assert!(
            matches!(mul.right, Expression::Cast(_)),
            "expected `as` to bind to the right operand of `*` alone"
        );
    }
}
