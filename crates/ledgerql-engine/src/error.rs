//! Error types for the query engine.

use ledgerql_core::{ParseError, Span};
use thiserror::Error;

/// Engine-specific errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The statement could not be parsed.
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// The statement is well-formed but semantically invalid.
    #[error("{message}")]
    Compilation {
        /// Description of the problem.
        message: String,
        /// Source location, where known.
        span: Option<Span>,
    },

    /// Query parameters do not match the statement placeholders.
    #[error("{0}")]
    Parameter(String),

    /// Misuse of the cursor or connection API.
    #[error("{0}")]
    Interface(String),

    /// A source driver failed to attach or load its data.
    #[error("{0}")]
    Source(String),
}

impl Error {
    /// Creates a compilation error with an optional source location.
    #[must_use]
    pub fn compilation(message: impl Into<String>, span: Option<Span>) -> Self {
        Self::Compilation {
            message: message.into(),
            span,
        }
    }

    /// Returns the source span carried by this error, if any.
    #[must_use]
    pub const fn span(&self) -> Option<Span> {
        match self {
            Self::Parse(err) => Some(err.span),
            Self::Compilation { span, .. } => *span,
            _ => None,
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
