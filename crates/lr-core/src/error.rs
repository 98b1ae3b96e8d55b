//! Engine error types.
//!
//! Every fallible operation in `lr-core` returns [`Result<T>`]. The hub maps
//! these onto HTTP status codes: cursor, filter and interval problems are
//! request errors, the maintenance variants are conflicts.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Malformed cursor '{input}': {reason}")]
    MalformedCursor { input: String, reason: String },

    /// Query text the parser could not make sense of. Callers degrade this to
    /// "no full-text constraint" instead of failing the search.
    #[error("Unsupported query syntax: {0}")]
    UnsupportedQuerySyntax(String),

    #[error("Invalid filter expression: {0}")]
    InvalidFilter(String),

    #[error("Invalid interval '{0}'")]
    InvalidInterval(String),

    #[error("Cannot disable maintenance mode while vacuum is in progress")]
    MaintenanceConflict,

    #[error("Vacuum is already in progress")]
    VacuumInProgress,
}

impl CoreError {
    pub(crate) fn malformed_cursor(input: &str, reason: impl Into<String>) -> Self {
        CoreError::MalformedCursor {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
