//! Token stream → AST.
//!
//! Recursive-descent at the top level and inside statements; Pratt
//! precedence climbing for expressions. The parser never resolves
//! identifiers and never sets a node's `typespec` — it only builds shape,
//! leaving those to the resolver and the type checker respectively.

mod parser;

pub use parser::{parse_source_file, ParsedFile};
