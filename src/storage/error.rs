use thiserror::Error;

use crate::types::{Collection, UniqueField};

/// Errors raised by [`super::RecordStore`] implementations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A uniqueness constraint rejected the write.
    #[error("duplicate {field} '{value}' in {collection}")]
    Duplicate {
        /// Collection holding the conflicting record.
        collection: Collection,
        /// Constrained field.
        field: UniqueField,
        /// Conflicting value.
        value: String,
    },
    /// The record addressed by an update does not exist.
    #[error("{collection} record '{id}' not found")]
    Missing {
        /// Collection that was searched.
        collection: Collection,
        /// Requested identifier.
        id: String,
    },
    /// SQLite backend error.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Document (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Stored data could not be interpreted.
    #[error("corruption detected: {0}")]
    Corruption(String),
    /// Fault injected by a test double.
    #[error("injected fault: {0}")]
    Injected(String),
}

/// Result alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
