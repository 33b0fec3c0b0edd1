use thiserror::Error;

use crate::hierarchy::HierarchyError;
use crate::storage::StorageError;

/// Error type for administrative operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Engine refused or failed the operation.
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
    /// Storage backend failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type alias for administrative operations.
pub type Result<T> = std::result::Result<T, AdminError>;
