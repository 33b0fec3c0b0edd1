//! Structural rules of the association forest.
//!
//! [`HierarchyEngine`] guards every mutation of `parent_id` and keeps the
//! materialized path (`level` + `hierarchy`) of each association and its
//! descendants in step with the adjacency links. [`Forest`] rebuilds the tree
//! from flat records for display.

mod cascade;
mod config;
mod engine;
mod error;
mod forest;
mod locks;
mod path;

pub use cascade::{CascadeFailure, CascadePlan, CascadeReport};
pub use config::{EngineConfig, DEFAULT_LOCK_TIMEOUT};
pub use engine::{DeleteOutcome, HierarchyEngine, Reparented};
pub use error::{HierarchyError, Result};
pub use forest::{Forest, ForestNode, Walk};
pub use locks::{SubtreeGuard, SubtreeLocks};
pub use path::{compute_path, splice_path, MaterializedPath};
