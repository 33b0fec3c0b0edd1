use std::time::Duration;

use thiserror::Error;

use crate::storage::StorageError;
use crate::types::{AssociationId, UniqueField};

/// Errors returned by [`super::HierarchyEngine`] operations.
///
/// Every variant except [`HierarchyError::PartialCascadeFailure`] and
/// [`HierarchyError::Storage`] is raised before any write was issued.
#[derive(Debug, Error)]
pub enum HierarchyError {
    /// The requested id or code is already taken.
    #[error("an association with {field} '{value}' already exists")]
    AlreadyExists {
        /// Conflicting field.
        field: UniqueField,
        /// Conflicting value.
        value: String,
    },
    /// The declared parent does not exist or was soft-deleted.
    #[error("parent association '{0}' not found")]
    ParentNotFound(AssociationId),
    /// An association was asked to become its own parent.
    #[error("association '{0}' cannot be its own parent")]
    SelfParent(AssociationId),
    /// The requested parent is a descendant of the association being moved.
    #[error("cannot move '{id}' under '{parent}': '{parent}' is one of its descendants")]
    CircularReference {
        /// Association being moved.
        id: AssociationId,
        /// Requested parent.
        parent: AssociationId,
    },
    /// Deletion refused because child associations still exist.
    #[error("cannot delete {id}: {count} child associations exist")]
    HasChildren {
        /// Association being deleted.
        id: AssociationId,
        /// Number of children referencing it, inactive ones included.
        count: u64,
    },
    /// Deletion refused because clubs are still attached.
    #[error("cannot delete {id}: {count} clubs are attached")]
    HasClubs {
        /// Association being deleted.
        id: AssociationId,
        /// Number of attached clubs.
        count: u64,
    },
    /// Deletion refused because active downstream records reference it.
    #[error("cannot delete {id}: {count} active downstream references exist")]
    HasActiveReferences {
        /// Association being deleted.
        id: AssociationId,
        /// Number of active references.
        count: u64,
    },
    /// The addressed record does not exist.
    #[error("'{0}' not found")]
    NotFound(String),
    /// The node's own path was committed but some descendants could not be rewritten.
    #[error(
        "update of {node} succeeded but {} of {total} descendants may be stale; retry recommended",
        .failed.len()
    )]
    PartialCascadeFailure {
        /// Association whose path was committed.
        node: AssociationId,
        /// Descendants whose path was rewritten (or already correct).
        repaired: Vec<AssociationId>,
        /// Descendants whose write failed.
        failed: Vec<AssociationId>,
        /// Size of the descendant set captured before the cascade.
        total: usize,
    },
    /// Malformed request.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Another structural mutation held the affected subtree for too long.
    #[error("timed out after {0:?} waiting for a concurrent update of the same tree")]
    LockTimeout(Duration),
    /// Storage backend failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl HierarchyError {
    /// True for failures a caller may resolve by retrying the same request
    /// (or [`super::HierarchyEngine::resume_cascade`]).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HierarchyError::PartialCascadeFailure { .. } | HierarchyError::LockTimeout(_)
        )
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, HierarchyError>;
