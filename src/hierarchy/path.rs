//! Materialized-path arithmetic.
//!
//! Both functions here are pure: they never touch storage and never fail.

use serde::{Deserialize, Serialize};

use crate::model::Association;
use crate::types::AssociationId;

/// Depth plus root-first ancestor list of an association.
///
/// `hierarchy.len() == level` for every path produced by this module.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterializedPath {
    /// Distance from the root; roots are at level 0.
    pub level: u32,
    /// Ancestor ids, root first, excluding the node itself.
    pub hierarchy: Vec<AssociationId>,
}

impl MaterializedPath {
    /// Path of a root association.
    pub fn root() -> Self {
        Self::default()
    }

    /// Builds a path from an ancestor list, deriving the level from its length.
    pub fn from_ancestors(hierarchy: Vec<AssociationId>) -> Self {
        Self {
            level: hierarchy.len() as u32,
            hierarchy,
        }
    }

    /// Returns true if `id` is one of the ancestors.
    pub fn contains(&self, id: &AssociationId) -> bool {
        self.hierarchy.contains(id)
    }
}

/// Computes the path of a node placed directly under `parent`.
///
/// `parent` must be the already-persisted parent record, or `None` for a root.
pub fn compute_path(parent: Option<&Association>) -> MaterializedPath {
    match parent {
        None => MaterializedPath::root(),
        Some(parent) => {
            let mut hierarchy = Vec::with_capacity(parent.hierarchy.len() + 1);
            hierarchy.extend(parent.hierarchy.iter().cloned());
            hierarchy.push(parent.id.clone());
            MaterializedPath {
                level: parent.level + 1,
                hierarchy,
            }
        }
    }
}

/// Rebuilds a descendant's path after `anchor` moved to `anchor_path`.
///
/// The part of `descendant` below `anchor` is kept verbatim and grafted onto
/// `anchor_path ++ [anchor]`. Returns `None` when `anchor` is not listed in
/// `descendant`, i.e. the record does not actually descend from it.
pub fn splice_path(
    anchor: &AssociationId,
    anchor_path: &MaterializedPath,
    descendant: &[AssociationId],
) -> Option<MaterializedPath> {
    let position = descendant.iter().position(|id| id == anchor)?;
    let suffix = &descendant[position + 1..];
    let mut hierarchy = Vec::with_capacity(anchor_path.hierarchy.len() + 1 + suffix.len());
    hierarchy.extend(anchor_path.hierarchy.iter().cloned());
    hierarchy.push(anchor.clone());
    hierarchy.extend(suffix.iter().cloned());
    Some(MaterializedPath::from_ancestors(hierarchy))
}
