//! Storage adapters for the `associations` and `clubs` collections.
//!
//! The engine talks to storage only through [`RecordStore`] and
//! [`ReferenceCounter`]. Two adapters ship with the crate: an in-process
//! [`MemoryStore`] and a SQLite-backed [`SqliteStore`].

mod error;
mod filter;
mod memory;
mod patch;
mod sqlite;

pub use error::{Result, StorageError};
pub use filter::{AssociationFilter, ClubFilter};
pub use memory::MemoryStore;
pub use patch::{AssociationPatch, ClubPatch};
pub use sqlite::{SqliteStore, WriterClaim, DEFAULT_BUSY_TIMEOUT};

use crate::model::{Association, Club};
use crate::types::{AssociationId, ClubId};

/// Document-store semantics required by the hierarchy engine.
///
/// Implementations hold no hierarchy logic. Reads return records ordered by id.
pub trait RecordStore: Send + Sync {
    /// Looks up one association.
    fn find_association(&self, id: &AssociationId) -> Result<Option<Association>>;

    /// Returns every association matching `filter`.
    fn find_associations(&self, filter: &AssociationFilter) -> Result<Vec<Association>>;

    /// Counts associations matching `filter`.
    fn count_associations(&self, filter: &AssociationFilter) -> Result<u64>;

    /// Inserts a new association, enforcing `id` and `code` uniqueness.
    fn insert_association(&self, record: &Association) -> Result<()>;

    /// Applies a partial update; fails with [`StorageError::Missing`] for unknown ids.
    fn update_association(&self, id: &AssociationId, patch: &AssociationPatch) -> Result<()>;

    /// Looks up one club.
    fn find_club(&self, id: &ClubId) -> Result<Option<Club>>;

    /// Returns every club matching `filter`.
    fn find_clubs(&self, filter: &ClubFilter) -> Result<Vec<Club>>;

    /// Counts clubs matching `filter`.
    fn count_clubs(&self, filter: &ClubFilter) -> Result<u64>;

    /// Inserts a new club, enforcing `id` uniqueness.
    fn insert_club(&self, record: &Club) -> Result<()>;

    /// Applies a partial update to a club.
    fn update_club(&self, id: &ClubId, patch: &ClubPatch) -> Result<()>;
}

/// Source of the opaque "active downstream references" count consulted before
/// an association may be deleted (registrations, licences, open invoices...).
pub trait ReferenceCounter: Send + Sync {
    /// Number of active records elsewhere in the system pointing at `id`.
    fn count_active_references(&self, id: &AssociationId) -> Result<u64>;
}

/// Reference counter for deployments without downstream collections.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoReferences;

impl ReferenceCounter for NoReferences {
    fn count_active_references(&self, _id: &AssociationId) -> Result<u64> {
        Ok(0)
    }
}
