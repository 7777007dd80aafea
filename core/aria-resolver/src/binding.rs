//! What a name in scope actually refers to.
//!
//! Most declarations are already representable as an [`AstNode`] (the
//! closed tagged union `aria-ast` defines), so [`Binding::Node`] just wraps
//! one. `Param` is the one exception: a function parameter is a free-standing
//! struct referenced from inside a `FunctionHeader`, never itself a member of
//! the `AstNode` union, so it gets its own variant.

use std::rc::Rc;

use aria_ast::nodes::{AstNode, Decl, Mutability, Param, Span, Statement};

#[derive(Clone, Debug)]
pub enum Binding {
    Node(AstNode),
    Param(Rc<Param>),
}

impl Binding {
    #[must_use]
    pub fn id(&self) -> u32 {
        match self {
            Binding::Node(n) => n.id(),
            Binding::Param(p) => p.id,
        }
    }

    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Binding::Node(n) => n.span(),
            Binding::Param(p) => p.span,
        }
    }

    /// The mutability classification from spec section 4.5.6: functions are
    /// immutable l-values (you may take their address, never write through
    /// it); `imm`/`mut` variables follow their declared flag; parameters are
    /// always mutable (locally rebindable, to support codegen spilling);
    /// everything else (structs, imports, type aliases) isn't an l-value at
    /// all, so `None`.
    #[must_use]
    pub fn is_mutable_lvalue(&self) -> Option<bool> {
        match self {
            Binding::Node(AstNode::Decl(Decl::FunctionDef(_) | Decl::ExternFunctionDef(_))) => {
                Some(false)
            }
            Binding::Node(AstNode::Decl(Decl::VariableDecl(v))) => Some(v.mutability.is_mut()),
            Binding::Node(AstNode::Statement(Statement::VariableDecl(v))) => {
                Some(v.mutability.is_mut())
            }
            Binding::Node(AstNode::Decl(Decl::ExternVariableDecl(v))) => {
                Some(v.mutability.is_mut())
            }
            Binding::Param(_) => Some(true),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_function(&self) -> bool {
        matches!(
            self,
            Binding::Node(AstNode::Decl(Decl::FunctionDef(_) | Decl::ExternFunctionDef(_)))
        )
    }

    #[must_use]
    pub fn is_import(&self) -> bool {
        matches!(self, Binding::Node(AstNode::Decl(Decl::Import(_))))
    }

    #[must_use]
    pub fn is_struct(&self) -> bool {
        matches!(self, Binding::Node(AstNode::Decl(Decl::StructDef(_))))
    }

    #[must_use]
    pub fn as_mutability(&self) -> Option<Mutability> {
        self.is_mutable_lvalue().map(|m| {
            if m {
                Mutability::Mut
            } else {
                Mutability::Imm
            }
        })
    }
}
