//! Error taxonomy for the store and state layers.

use thiserror::Error;

use crate::datastore::Collection;

/// Failures surfaced by the backing store and the in-memory state.
///
/// None of these are fatal: callers log them, show a transient
/// notification and keep the last known-good state.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("{collection} record not found: {id}")]
    NotFound { collection: Collection, id: String },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store payload error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to persist {path}: {reason}")]
    Persist { path: String, reason: String },
}

impl DataError {
    pub fn not_found(collection: Collection, id: impl Into<String>) -> Self {
        DataError::NotFound {
            collection,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DataError::NotFound { .. })
    }
}

pub type DataResult<T> = Result<T, DataError>;
