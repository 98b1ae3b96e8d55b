//! Storage error types.

use lr_core::CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Vacuum failed: {0}")]
    Vacuum(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StoreError {
    /// An FTS5 rejection of the compiled `MATCH` expression, e.g. a
    /// predicate that starts with `NOT` or names an unindexed column.
    /// These are request errors.
    pub fn is_query_syntax(&self) -> bool {
        match self {
            StoreError::Database(e) => {
                let msg = e.to_string();
                msg.contains("fts5")
                    || msg.contains("malformed MATCH")
                    || msg.contains("no such column")
            }
            _ => false,
        }
    }
}
