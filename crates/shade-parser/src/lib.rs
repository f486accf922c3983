//! WGSL front end: lexer, token stream, and recursive-descent parser.
//!
//! [`parse`] turns a [`SourceFile`](shade_diag::SourceFile) into an
//! [`ast::Module`] plus a diagnostic list. Malformed input never aborts
//! the pass: the lexer synthesizes error tokens and the parser skips to
//! synchronization points, so every independent error surfaces at once.

pub mod ast;
mod lexer;
mod parser;
pub mod token;

pub use lexer::tokenize;
pub use parser::parse;
