use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::cascade::{CascadePlan, CascadeReport};
use super::config::EngineConfig;
use super::error::{HierarchyError, Result};
use super::forest::Forest;
use super::locks::{SubtreeGuard, SubtreeLocks};
use super::path::compute_path;
use crate::model::{Association, Club, DetailsPatch, NewAssociation};
use crate::storage::{
    AssociationFilter, AssociationPatch, ClubFilter, ClubPatch, RecordStore, ReferenceCounter,
    StorageError,
};
use crate::types::{AssociationId, ClubId, Status, UniqueField};

/// Successful re-parent: the moved record plus the cascade it triggered.
#[derive(Clone, Debug, Serialize)]
pub struct Reparented {
    /// The association as stored after the move.
    pub association: Association,
    /// Descendant reindex outcome; empty when the parent did not change.
    pub cascade: CascadeReport,
}

/// Result of [`HierarchyEngine::delete_association`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// Status switched to inactive.
    Deactivated,
    /// The association was already inactive; nothing was written.
    AlreadyInactive,
}

/// Guarded entry point for every structural mutation of the association forest.
///
/// The engine owns no records. It validates each request against the current
/// contents of its [`RecordStore`], serializes structural writes per tree root,
/// and is the only component that writes `parent_id`, `level` and `hierarchy`.
pub struct HierarchyEngine {
    store: Arc<dyn RecordStore>,
    references: Arc<dyn ReferenceCounter>,
    config: EngineConfig,
    locks: SubtreeLocks,
}

impl HierarchyEngine {
    /// Builds an engine over a store that also answers downstream reference counts.
    pub fn new<S>(store: Arc<S>) -> Self
    where
        S: RecordStore + ReferenceCounter + 'static,
    {
        let references: Arc<dyn ReferenceCounter> = store.clone();
        Self::with_references(store, references)
    }

    /// Builds an engine with a separate reference counter.
    pub fn with_references(
        store: Arc<dyn RecordStore>,
        references: Arc<dyn ReferenceCounter>,
    ) -> Self {
        Self {
            store,
            references,
            config: EngineConfig::default(),
            locks: SubtreeLocks::new(),
        }
    }

    /// Replaces the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Underlying record store, for read-only tooling.
    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    /// Creates an association under its declared parent.
    ///
    /// Caller-supplied `level` and `hierarchy` are ignored; the path is always
    /// derived from the persisted parent. Absent settings take the configured
    /// defaults.
    pub fn create_association(&self, candidate: NewAssociation) -> Result<Association> {
        if candidate.id.is_blank() {
            return Err(HierarchyError::InvalidInput("association id is empty".into()));
        }
        if candidate.code.trim().is_empty() {
            return Err(HierarchyError::InvalidInput("association code is empty".into()));
        }
        self.ensure_unique(&candidate)?;

        let (_guard, parent) = self.lock_scope(|| {
            let parent = match &candidate.parent_id {
                Some(parent_id) => Some(self.resolve_parent(parent_id)?),
                None => None,
            };
            let root = parent
                .as_ref()
                .map(|parent| parent.root_id().clone())
                .unwrap_or_else(|| candidate.id.clone());
            Ok((BTreeSet::from([root]), parent))
        })?;

        let path = compute_path(parent.as_ref());
        let hinted = candidate.level.is_some() || candidate.hierarchy.is_some();
        if hinted
            && (candidate.level != Some(path.level)
                || candidate.hierarchy.as_ref() != Some(&path.hierarchy))
        {
            debug!(
                association = %candidate.id,
                hinted_level = ?candidate.level,
                level = path.level,
                "ignoring caller-supplied path"
            );
        }

        let now = OffsetDateTime::now_utc();
        let record = Association {
            id: candidate.id,
            code: candidate.code,
            parent_id: candidate.parent_id,
            level: path.level,
            hierarchy: path.hierarchy,
            status: candidate.status.unwrap_or_default(),
            name: candidate.name,
            contact: candidate.contact,
            settings: self.config.settings_defaults.resolve(candidate.settings),
            created_at: now,
            updated_at: now,
        };
        self.store
            .insert_association(&record)
            .map_err(already_exists)?;
        info!(
            association = %record.id,
            parent = ?record.parent_id.as_ref().map(AssociationId::as_str),
            level = record.level,
            "association created"
        );
        Ok(record)
    }

    /// Moves `id` under `new_parent`, or promotes it to a root when `None`.
    ///
    /// The node's own path is written first, then every descendant is
    /// reindexed. If any descendant write fails the call returns
    /// [`HierarchyError::PartialCascadeFailure`]; [`Self::resume_cascade`]
    /// finishes the job.
    pub fn reparent_association(
        &self,
        id: &AssociationId,
        new_parent: Option<AssociationId>,
    ) -> Result<Reparented> {
        if new_parent.as_ref() == Some(id) {
            return Err(HierarchyError::SelfParent(id.clone()));
        }
        let current = self.require(id)?;
        if current.parent_id == new_parent {
            return Ok(unchanged(current));
        }

        let (_guard, (existing, parent)) = self.lock_scope(|| {
            let existing = self.require(id)?;
            let parent = match &new_parent {
                Some(parent_id) => Some(self.resolve_parent(parent_id)?),
                None => None,
            };
            let target_root = parent
                .as_ref()
                .map(|parent| parent.root_id().clone())
                .unwrap_or_else(|| id.clone());
            let roots = BTreeSet::from([existing.root_id().clone(), target_root]);
            Ok((roots, (existing, parent)))
        })?;
        if existing.parent_id == new_parent {
            return Ok(unchanged(existing));
        }

        let target = compute_path(parent.as_ref());
        if let Some(parent) = &parent {
            if target.contains(id) {
                return Err(HierarchyError::CircularReference {
                    id: id.clone(),
                    parent: parent.id.clone(),
                });
            }
        }

        let plan = CascadePlan::capture(self.store.as_ref(), id)?;
        let now = OffsetDateTime::now_utc();
        let patch = AssociationPatch::reparent(new_parent.clone(), target.clone()).touched(now);
        self.store.update_association(id, &patch)?;
        info!(
            association = %id,
            from = ?existing.parent_id.as_ref().map(AssociationId::as_str),
            to = ?new_parent.as_ref().map(AssociationId::as_str),
            level = target.level,
            descendants = plan.len(),
            "association reparented"
        );

        let cascade = plan.apply(self.store.as_ref(), &target, now);
        if !cascade.is_complete() {
            return Err(partial_failure(id, &cascade));
        }

        let mut association = existing;
        association.parent_id = new_parent;
        association.level = target.level;
        association.hierarchy = target.hierarchy;
        association.updated_at = now;
        Ok(Reparented {
            association,
            cascade,
        })
    }

    /// Re-runs the descendant cascade of `id` against its current parent.
    ///
    /// Converges after a [`HierarchyError::PartialCascadeFailure`] or an
    /// interrupted re-parent. Descendants that already carry the right path are
    /// not rewritten.
    pub fn resume_cascade(&self, id: &AssociationId) -> Result<CascadeReport> {
        let (_guard, existing) = self.lock_scope(|| {
            let existing = self.require(id)?;
            Ok((BTreeSet::from([existing.root_id().clone()]), existing))
        })?;

        let parent = match &existing.parent_id {
            Some(parent_id) => self.store.find_association(parent_id)?,
            None => None,
        };
        let target = match (&existing.parent_id, &parent) {
            (Some(parent_id), None) => {
                warn!(association = %id, parent = %parent_id, "parent missing; keeping stored path");
                existing.path()
            }
            _ => compute_path(parent.as_ref()),
        };
        if target.contains(id) {
            return Err(HierarchyError::CircularReference {
                id: id.clone(),
                parent: existing.parent_id.clone().unwrap_or_else(|| id.clone()),
            });
        }

        let plan = CascadePlan::capture(self.store.as_ref(), id)?;
        let now = OffsetDateTime::now_utc();
        if target != existing.path() {
            self.store
                .update_association(id, &AssociationPatch::reindex(target.clone()).touched(now))?;
            info!(association = %id, level = target.level, "association path refreshed");
        }
        let cascade = plan.apply(self.store.as_ref(), &target, now);
        if !cascade.is_complete() {
            return Err(partial_failure(id, &cascade));
        }
        Ok(cascade)
    }

    /// Soft-deletes an association.
    ///
    /// Refused while any child association (inactive ones included), attached
    /// clubs, or active downstream references exist. The id and code stay reserved.
    pub fn delete_association(&self, id: &AssociationId) -> Result<DeleteOutcome> {
        let (_guard, existing) = self.lock_scope(|| {
            let existing = self.require(id)?;
            Ok((BTreeSet::from([existing.root_id().clone()]), existing))
        })?;
        if existing.status == Status::Inactive {
            debug!(association = %id, "already inactive");
            return Ok(DeleteOutcome::AlreadyInactive);
        }

        // soft-deleted children still reference `id` through parent_id
        let children = self
            .store
            .count_associations(&AssociationFilter::children_of(id))?;
        if children > 0 {
            return Err(HierarchyError::HasChildren {
                id: id.clone(),
                count: children,
            });
        }
        let clubs = self.store.count_clubs(&ClubFilter::attached_to(id))?;
        if clubs > 0 {
            return Err(HierarchyError::HasClubs {
                id: id.clone(),
                count: clubs,
            });
        }
        let references = self.references.count_active_references(id)?;
        if references > 0 {
            return Err(HierarchyError::HasActiveReferences {
                id: id.clone(),
                count: references,
            });
        }

        let patch = AssociationPatch::status(Status::Inactive).touched(OffsetDateTime::now_utc());
        self.store.update_association(id, &patch)?;
        info!(association = %id, "association deactivated");
        Ok(DeleteOutcome::Deactivated)
    }

    /// Changes the status of an association.
    ///
    /// `Inactive` goes through the delete guards. Re-activating a soft-deleted
    /// association requires its parent to be live.
    pub fn set_status(&self, id: &AssociationId, status: Status) -> Result<Association> {
        if status == Status::Inactive {
            self.delete_association(id)?;
            return self.require(id);
        }
        let (_guard, existing) = self.lock_scope(|| {
            let existing = self.require(id)?;
            Ok((BTreeSet::from([existing.root_id().clone()]), existing))
        })?;
        if existing.status == status {
            return Ok(existing);
        }
        if existing.status == Status::Inactive {
            if let Some(parent_id) = &existing.parent_id {
                self.resolve_parent(parent_id)?;
            }
        }
        let now = OffsetDateTime::now_utc();
        self.store
            .update_association(id, &AssociationPatch::status(status).touched(now))?;
        info!(association = %id, from = %existing.status, to = %status, "status changed");
        let mut association = existing;
        association.status = status;
        association.updated_at = now;
        Ok(association)
    }

    /// Edits descriptive fields; never touches the structural fields.
    pub fn update_details(&self, id: &AssociationId, details: DetailsPatch) -> Result<Association> {
        let existing = self.require(id)?;
        if details.is_empty() {
            return Ok(existing);
        }
        let patch = AssociationPatch {
            name: details.name,
            contact: details.contact,
            settings: details.settings,
            ..AssociationPatch::default()
        }
        .touched(OffsetDateTime::now_utc());
        self.store.update_association(id, &patch)?;
        debug!(association = %id, "details updated");
        let mut association = existing;
        patch.apply(&mut association);
        Ok(association)
    }

    /// Attaches a new club to a live association.
    pub fn add_club(&self, club: Club) -> Result<Club> {
        if club.id.is_blank() {
            return Err(HierarchyError::InvalidInput("club id is empty".into()));
        }
        let (_guard, _) = self.lock_scope(|| {
            let parent = self.resolve_parent(&club.parent_id)?;
            Ok((BTreeSet::from([parent.root_id().clone()]), ()))
        })?;
        if self.store.find_club(&club.id)?.is_some() {
            return Err(HierarchyError::AlreadyExists {
                field: UniqueField::Id,
                value: club.id.to_string(),
            });
        }
        self.store.insert_club(&club).map_err(already_exists)?;
        info!(club = %club.id, parent = %club.parent_id, "club attached");
        Ok(club)
    }

    /// Moves a club under another live association.
    pub fn move_club(&self, club_id: &ClubId, parent: &AssociationId) -> Result<Club> {
        let (_guard, mut club) = self.lock_scope(|| {
            let club = self
                .store
                .find_club(club_id)?
                .ok_or_else(|| HierarchyError::NotFound(club_id.to_string()))?;
            let target = self.resolve_parent(parent)?;
            let mut roots = BTreeSet::from([target.root_id().clone()]);
            if let Some(current) = self.store.find_association(&club.parent_id)? {
                roots.insert(current.root_id().clone());
            }
            Ok((roots, club))
        })?;
        if &club.parent_id == parent {
            return Ok(club);
        }
        let patch = ClubPatch {
            parent_id: Some(parent.clone()),
            ..ClubPatch::default()
        };
        self.store.update_club(club_id, &patch)?;
        info!(club = %club_id, from = %club.parent_id, to = %parent, "club moved");
        patch.apply(&mut club);
        Ok(club)
    }

    /// Looks up one association.
    pub fn association(&self, id: &AssociationId) -> Result<Option<Association>> {
        Ok(self.store.find_association(id)?)
    }

    /// Direct children of `id`, including inactive ones.
    pub fn children(&self, id: &AssociationId) -> Result<Vec<Association>> {
        self.require(id)?;
        Ok(self
            .store
            .find_associations(&AssociationFilter::children_of(id))?)
    }

    /// Every association whose materialized path lists `id`.
    pub fn descendants(&self, id: &AssociationId) -> Result<Vec<Association>> {
        self.require(id)?;
        Ok(self
            .store
            .find_associations(&AssociationFilter::descendants_of(id))?)
    }

    /// Ancestors of `id`, root first, resolved through the materialized path.
    pub fn ancestors(&self, id: &AssociationId) -> Result<Vec<Association>> {
        let association = self.require(id)?;
        let mut ancestors = Vec::with_capacity(association.hierarchy.len());
        for ancestor in &association.hierarchy {
            match self.store.find_association(ancestor)? {
                Some(record) => ancestors.push(record),
                None => warn!(association = %id, ancestor = %ancestor, "ancestor missing"),
            }
        }
        Ok(ancestors)
    }

    /// Clubs attached to `id`.
    pub fn clubs(&self, id: &AssociationId) -> Result<Vec<Club>> {
        self.require(id)?;
        Ok(self.store.find_clubs(&ClubFilter::attached_to(id))?)
    }

    /// Reconstructs the full forest from flat records.
    pub fn build_forest(&self) -> Result<Forest> {
        Ok(Forest::load(self.store.as_ref())?)
    }

    /// Locks every tree currently in the store, for whole-forest maintenance.
    pub(crate) fn lock_everything(&self) -> Result<(SubtreeGuard<'_>, Vec<Association>)> {
        self.lock_scope(|| {
            let all = self.store.find_associations(&AssociationFilter::all())?;
            let roots: BTreeSet<AssociationId> = all
                .iter()
                .map(|record| record.root_id().clone())
                .chain(all.iter().filter(|r| r.is_root()).map(|r| r.id.clone()))
                .collect();
            Ok((roots, all))
        })
    }

    fn ensure_unique(&self, candidate: &NewAssociation) -> Result<()> {
        if self.store.find_association(&candidate.id)?.is_some() {
            return Err(HierarchyError::AlreadyExists {
                field: UniqueField::Id,
                value: candidate.id.to_string(),
            });
        }
        let codes = self
            .store
            .count_associations(&AssociationFilter::with_code(candidate.code.clone()))?;
        if codes > 0 {
            return Err(HierarchyError::AlreadyExists {
                field: UniqueField::Code,
                value: candidate.code.clone(),
            });
        }
        Ok(())
    }

    fn require(&self, id: &AssociationId) -> Result<Association> {
        self.store
            .find_association(id)?
            .ok_or_else(|| HierarchyError::NotFound(id.to_string()))
    }

    fn resolve_parent(&self, id: &AssociationId) -> Result<Association> {
        match self.store.find_association(id)? {
            Some(parent) if parent.is_live() => Ok(parent),
            _ => Err(HierarchyError::ParentNotFound(id.clone())),
        }
    }

    /// Locks the trees an operation touches.
    ///
    /// `scope` reports the roots from current storage state. It runs again once
    /// the locks are held; if the roots moved meanwhile the locks are swapped.
    fn lock_scope<T>(
        &self,
        scope: impl Fn() -> Result<(BTreeSet<AssociationId>, T)>,
    ) -> Result<(SubtreeGuard<'_>, T)> {
        let timeout = self.config.lock_timeout;
        let deadline = Instant::now() + timeout;
        let (mut roots, _) = scope()?;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let guard = self
                .locks
                .acquire(roots.clone(), remaining)
                .ok_or(HierarchyError::LockTimeout(timeout))?;
            let (current, value) = scope()?;
            if current == roots {
                return Ok((guard, value));
            }
            debug!(before = ?roots, after = ?current, "tree roots changed while locking");
            drop(guard);
            roots = current;
        }
    }
}

fn unchanged(association: Association) -> Reparented {
    let cascade = CascadeReport::empty(association.id.clone());
    Reparented {
        association,
        cascade,
    }
}

fn partial_failure(id: &AssociationId, cascade: &CascadeReport) -> HierarchyError {
    warn!(
        association = %id,
        failed = cascade.failed.len(),
        total = cascade.total,
        "cascade left stale descendants"
    );
    HierarchyError::PartialCascadeFailure {
        node: id.clone(),
        repaired: cascade.consistent(),
        failed: cascade.failed_ids(),
        total: cascade.total,
    }
}

fn already_exists(err: StorageError) -> HierarchyError {
    match err {
        StorageError::Duplicate { field, value, .. } => {
            HierarchyError::AlreadyExists { field, value }
        }
        other => HierarchyError::Storage(other),
    }
}
