//! Error types for Newsdesk operations

use thiserror::Error;

use crate::EntityKind;

/// Data store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Query failed for {query}: {reason}")]
    QueryFailed { query: String, reason: String },

    #[error("Data store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Unexpected value in {entity:?} row: {reason}")]
    InvalidRow { entity: EntityKind, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn query_failed(query: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        StoreError::QueryFailed {
            query: query.into(),
            reason: reason.to_string(),
        }
    }
}

/// Master error type for Newsdesk errors.
#[derive(Debug, Clone, Error)]
pub enum NewsdeskError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {field}: {reason}")]
    Config { field: String, reason: String },
}

/// Result type alias for Newsdesk operations.
pub type NewsdeskResult<T> = Result<T, NewsdeskError>;
