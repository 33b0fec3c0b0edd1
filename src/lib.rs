//! Consistency engine for a forest of sports associations and their clubs.
//!
//! Each association stores both its `parent_id` and a materialized path
//! (`level` plus the root-first list of ancestor ids). [`HierarchyEngine`]
//! validates every structural change and propagates path changes to all
//! descendants; [`Forest`] rebuilds the tree from flat records for display.

#![warn(missing_docs)]

pub mod admin;
pub mod cli;
pub mod hierarchy;
pub mod model;
pub mod storage;
pub mod types;

pub use hierarchy::{
    CascadeReport, DeleteOutcome, EngineConfig, Forest, ForestNode, HierarchyEngine,
    HierarchyError, MaterializedPath, Reparented,
};
pub use model::{Association, Club, DetailsPatch, NewAssociation};
pub use storage::{MemoryStore, RecordStore, ReferenceCounter, SqliteStore, StorageError};
pub use types::{AssociationId, ClubId, Status};
