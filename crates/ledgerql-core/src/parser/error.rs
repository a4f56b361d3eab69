//! Parser error types.

use crate::lexer::Span;

/// A syntax error.
///
/// The parser reports every failure with the same message; the span points
/// at the offending source location so that interactive callers can render
/// a caret-underlined excerpt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// The location of the error.
    pub span: Span,
}

impl ParseError {
    /// Creates a new parse error at the given location.
    #[must_use]
    pub const fn new(span: Span) -> Self {
        Self { span }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "syntax error")
    }
}

impl std::error::Error for ParseError {}
