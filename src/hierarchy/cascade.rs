//! Propagation of a path change to every descendant.
//!
//! The descendant set is captured once by [`CascadePlan::capture`] before any
//! write, then [`CascadePlan::apply`] splices each descendant's stored path onto
//! the anchor's new one. Applying the same plan twice is a no-op the second time.

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::path::{splice_path, MaterializedPath};
use crate::model::Association;
use crate::storage::{self, AssociationFilter, AssociationPatch, RecordStore};
use crate::types::AssociationId;

/// Descendant write that did not go through.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CascadeFailure {
    /// Descendant whose path is now stale.
    pub id: AssociationId,
    /// Storage error text.
    pub reason: String,
}

/// Outcome of one cascade run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    /// Association whose move triggered the cascade.
    pub anchor: AssociationId,
    /// Size of the captured descendant set.
    pub total: usize,
    /// Descendants whose path was rewritten.
    pub repaired: Vec<AssociationId>,
    /// Descendants that already carried the target path.
    pub unchanged: Vec<AssociationId>,
    /// Descendants whose stored path does not list the anchor.
    pub skipped: Vec<AssociationId>,
    /// Descendants whose write failed.
    pub failed: Vec<CascadeFailure>,
}

impl CascadeReport {
    /// Empty report for an anchor without descendants.
    pub fn empty(anchor: AssociationId) -> Self {
        Self {
            anchor,
            ..Self::default()
        }
    }

    /// True when no descendant write failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Descendants now consistent with the anchor: rewritten or already correct.
    pub fn consistent(&self) -> Vec<AssociationId> {
        self.repaired
            .iter()
            .chain(self.unchanged.iter())
            .cloned()
            .collect()
    }

    /// Ids of the descendants whose write failed.
    pub fn failed_ids(&self) -> Vec<AssociationId> {
        self.failed.iter().map(|failure| failure.id.clone()).collect()
    }
}

/// Descendant set of one anchor, captured before any write.
#[derive(Clone, Debug)]
pub struct CascadePlan {
    anchor: AssociationId,
    descendants: Vec<Association>,
}

impl CascadePlan {
    /// Queries every association whose path lists `anchor`.
    pub fn capture(store: &dyn RecordStore, anchor: &AssociationId) -> storage::Result<Self> {
        let descendants = store.find_associations(&AssociationFilter::descendants_of(anchor))?;
        debug!(anchor = %anchor, descendants = descendants.len(), "captured cascade plan");
        Ok(Self {
            anchor: anchor.clone(),
            descendants,
        })
    }

    /// Anchor of the plan.
    pub fn anchor(&self) -> &AssociationId {
        &self.anchor
    }

    /// Number of captured descendants.
    pub fn len(&self) -> usize {
        self.descendants.len()
    }

    /// True when the anchor has no descendants.
    pub fn is_empty(&self) -> bool {
        self.descendants.is_empty()
    }

    /// Rewrites every captured descendant against `anchor_path`.
    ///
    /// A failed write is recorded and the cascade moves on to the next descendant.
    pub fn apply(
        &self,
        store: &dyn RecordStore,
        anchor_path: &MaterializedPath,
        now: OffsetDateTime,
    ) -> CascadeReport {
        let mut report = CascadeReport {
            anchor: self.anchor.clone(),
            total: self.descendants.len(),
            ..CascadeReport::default()
        };

        for descendant in &self.descendants {
            if descendant.id == self.anchor {
                warn!(anchor = %self.anchor, "association lists itself as an ancestor; skipped");
                report.skipped.push(descendant.id.clone());
                continue;
            }
            let Some(target) = splice_path(&self.anchor, anchor_path, &descendant.hierarchy)
            else {
                warn!(
                    anchor = %self.anchor,
                    descendant = %descendant.id,
                    "descendant path does not list the anchor; skipped"
                );
                report.skipped.push(descendant.id.clone());
                continue;
            };
            if descendant.level == target.level && descendant.hierarchy == target.hierarchy {
                report.unchanged.push(descendant.id.clone());
                continue;
            }
            let patch = AssociationPatch::reindex(target).touched(now);
            match store.update_association(&descendant.id, &patch) {
                Ok(()) => report.repaired.push(descendant.id.clone()),
                Err(err) => {
                    warn!(
                        anchor = %self.anchor,
                        descendant = %descendant.id,
                        error = %err,
                        "descendant reindex failed"
                    );
                    report.failed.push(CascadeFailure {
                        id: descendant.id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        debug!(
            anchor = %self.anchor,
            repaired = report.repaired.len(),
            unchanged = report.unchanged.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "cascade finished"
        );
        report
    }
}
