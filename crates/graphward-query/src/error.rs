//! Error types for query parsing, rewriting and secure execution.

use thiserror::Error;

/// Failure to read a query in the supported Cypher subset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CypherError {
    /// The input contains a character or literal the lexer cannot read.
    #[error("Lexical error at offset {position}: {message}")]
    Lex { position: usize, message: String },

    /// The tokens do not form a query in the subset.
    #[error("Parse error at offset {position}: {message}")]
    Parse { position: usize, message: String },

    /// The query is valid Cypher but uses a construct outside the subset.
    #[error("Unsupported construct: {0}")]
    Unsupported(String),
}

/// Failure to rewrite a query for a principal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    /// The query shape cannot be secured, so it must not run.
    #[error("Unsupported query shape: {0}")]
    UnsupportedQueryShape(String),
}

impl From<CypherError> for RewriteError {
    fn from(err: CypherError) -> Self {
        RewriteError::UnsupportedQueryShape(err.to_string())
    }
}

/// Failure reported by a graph backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    #[error("Query timed out after {0} ms")]
    Timeout(u64),

    #[error("Query rejected by backend: {0}")]
    InvalidQuery(String),

    #[error("Missing parameter: ${0}")]
    MissingParameter(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Failure of a secured read.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The query was not executed.
    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    /// The backend failed; the error is passed through unchanged.
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Result type for secured reads.
pub type Result<T> = std::result::Result<T, AccessError>;
