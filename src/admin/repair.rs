use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::admin::Result;
use crate::hierarchy::{CascadeFailure, HierarchyEngine, MaterializedPath};
use crate::storage::AssociationPatch;
use crate::types::AssociationId;

/// Options for [`repair`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RepairOptions {
    /// Report what would change without writing.
    pub dry_run: bool,
}

/// Outcome of a repair pass.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RepairReport {
    /// Associations examined.
    pub examined: u64,
    /// Associations whose path was (or would be) rewritten.
    pub rewritten: Vec<AssociationId>,
    /// Associations not reachable from a root through `parent_id` links.
    pub unreachable: Vec<AssociationId>,
    /// Rewrites that failed.
    pub failed: Vec<CascadeFailure>,
    /// Whether the pass was a dry run.
    pub dry_run: bool,
}

/// Recomputes every materialized path from `parent_id` links.
///
/// Runs breadth-first from each root while every tree is locked, so one pass
/// reaches the fixed point. Associations caught in a parent cycle or below a
/// missing parent are left untouched and listed as unreachable.
pub fn repair(engine: &HierarchyEngine, opts: RepairOptions) -> Result<RepairReport> {
    let (_guard, associations) = engine.lock_everything()?;
    let store = engine.store();

    let known: FxHashSet<&AssociationId> = associations.iter().map(|a| &a.id).collect();
    let mut children: FxHashMap<&AssociationId, Vec<usize>> = FxHashMap::default();
    let mut queue = VecDeque::new();
    for (slot, record) in associations.iter().enumerate() {
        match &record.parent_id {
            None => queue.push_back((slot, MaterializedPath::root())),
            Some(parent) if known.contains(parent) => {
                children.entry(parent).or_default().push(slot)
            }
            Some(_) => {}
        }
    }

    let mut report = RepairReport {
        examined: associations.len() as u64,
        dry_run: opts.dry_run,
        ..RepairReport::default()
    };
    let now = OffsetDateTime::now_utc();
    let mut reached = vec![false; associations.len()];
    while let Some((slot, expected)) = queue.pop_front() {
        if std::mem::replace(&mut reached[slot], true) {
            continue;
        }
        let record = &associations[slot];
        if record.level != expected.level || record.hierarchy != expected.hierarchy {
            if opts.dry_run {
                report.rewritten.push(record.id.clone());
            } else {
                let patch = AssociationPatch::reindex(expected.clone()).touched(now);
                match store.update_association(&record.id, &patch) {
                    Ok(()) => report.rewritten.push(record.id.clone()),
                    Err(err) => {
                        warn!(association = %record.id, error = %err, "path repair failed");
                        report.failed.push(CascadeFailure {
                            id: record.id.clone(),
                            reason: err.to_string(),
                        });
                    }
                }
            }
        }
        if let Some(kids) = children.get(&record.id) {
            let mut hierarchy = expected.hierarchy;
            hierarchy.push(record.id.clone());
            let below = MaterializedPath::from_ancestors(hierarchy);
            for &child in kids {
                queue.push_back((child, below.clone()));
            }
        }
    }

    report.unreachable = associations
        .iter()
        .zip(&reached)
        .filter(|(_, reached)| !**reached)
        .map(|(record, _)| record.id.clone())
        .collect();
    if !report.unreachable.is_empty() {
        warn!(count = report.unreachable.len(), "associations unreachable from any root");
    }
    info!(
        examined = report.examined,
        rewritten = report.rewritten.len(),
        failed = report.failed.len(),
        dry_run = opts.dry_run,
        "repair finished"
    );
    Ok(report)
}
