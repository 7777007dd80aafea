//! Byte stream → token stream.
//!
//! Lexing is a pure function of one [`Srcfile`](aria_span::Srcfile)'s
//! bytes: it never looks at other files and never resolves names, so
//! per-file lexing could run in parallel ahead of the sequential resolver
//! and type-checker stages that need every file at once.

mod lexer;
mod token;

pub use lexer::lex;
pub use token::{Keyword, Punct, Token, TokenKind};
