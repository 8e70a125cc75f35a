//! Error types for sqlport

use thiserror::Error;

/// The result type for sqlport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during translation.
///
/// Only tokenizer errors are fatal for a whole run; statement-level parse
/// failures and unmapped constructs are reported as [`crate::Diagnostic`]s
/// instead, so the rest of the batch still translates.
#[derive(Debug, Error)]
pub enum Error {
    /// Error during tokenization (unterminated literal, comment or bracket)
    #[error("Tokenization error at line {line}, column {column}: {message}")]
    Tokenize {
        message: String,
        line: usize,
        column: usize,
    },

    /// Error during parsing
    #[error("Parse error: {0}")]
    Parse(String),

    /// Error during SQL generation
    #[error("Generation error: {0}")]
    Generate(String),

    /// Internal error (should not happen in normal usage)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a tokenization error
    pub fn tokenize(message: impl Into<String>, line: usize, column: usize) -> Self {
        Error::Tokenize {
            message: message.into(),
            line,
            column,
        }
    }

    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse(message.into())
    }

    /// Create a generation error
    pub fn generate(message: impl Into<String>) -> Self {
        Error::Generate(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }
}
