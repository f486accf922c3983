//! Source tracking and diagnostics for the shade compiler.
//!
//! Every token, AST node, and diagnostic carries a [`Span`] into a
//! [`SourceFile`]. Diagnostics accumulate in a [`DiagnosticList`] and are
//! rendered by [`Formatter`] with the offending source line quoted and a
//! caret underline.

mod diagnostic;
mod formatter;
mod source;

pub use diagnostic::{Diagnostic, DiagnosticList, Severity};
pub use formatter::{Formatter, Style};
pub use source::{Location, SourceFile, Span};
