//! Bidirectional type checking with a `target` type.
//!
//! Three passes over every file, run together so declarations stay
//! order-independent across the whole compilation (spec section 4.5.3):
//!
//! - **Prec 1** installs a placeholder `Struct` typespec for every struct
//!   decl, so a struct can reference another struct declared later in the
//!   same file or in a different file.
//! - **Prec 2** resolves every annotated type: global variables, extern
//!   declarations, function headers, struct fields.
//! - **Body pass** walks every function body and global initializer with
//!   full expression typing, threading the loop/function stacks that
//!   `break`/`continue`/`return` need.
//!
//! [`check`] mutates the resolved AST in place (every value-bearing node
//! records its own typespec via `node.set_typespec`) and returns a table of
//! the declaration-level types that aren't themselves expression nodes
//! (functions, globals, params, struct fields) for callers — the IR emitter
//! interface, and this crate's own tests — that need them.

mod assign;
mod checker;

pub use assign::{assign, exact_eq, AssignResult};
pub use checker::check;
