//! Lexical scoping, forward declarations and symbol-reference binding.
//!
//! Sits between parsing and type checking: every declaration becomes a
//! [`Binding`], every [`SymbolExpr`](aria_ast::SymbolExpr) and
//! module-qualified [`AccessExpr`](aria_ast::AccessExpr) gets bound to the
//! id of the declaration it names, and an [`Arena`](aria_ast::Arena) is
//! built over every top-level declaration so the type checker can iterate
//! functions and structs without re-walking every file.

mod binding;
mod resolver;

pub use binding::Binding;
pub use resolver::{resolve, ResolvedProgram};
