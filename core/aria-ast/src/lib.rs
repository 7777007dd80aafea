//! Tagged-variant AST and the shared [`Typespec`] graph.
//!
//! A single closed `AstNode` enum covers every syntactic form the parser
//! produces. Every node carries an `id`, a `span`, a `short_span` (the
//! operator/keyword span used for diagnostics that shouldn't underline the
//! whole construct), and a `typespec` slot the type checker fills in later —
//! `None` until then, never a required constructor argument.

#[macro_use]
mod macros;

pub mod arena;
pub mod nodes;
pub mod typespec;

pub use arena::Arena;
pub use nodes::*;
pub use typespec::{AcceptKind, PrimKind, Typespec, TypespecTable};
