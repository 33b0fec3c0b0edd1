use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use super::{
    AssociationFilter, AssociationPatch, ClubFilter, ClubPatch, RecordStore, ReferenceCounter,
    Result, StorageError,
};
use crate::model::{Association, Club};
use crate::types::{AssociationId, ClubId, Collection, UniqueField};

/// In-process document store.
///
/// Collections live behind a single `RwLock`. Fault injection hooks let tests
/// make individual association updates fail to exercise partial cascades.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
    faults: Mutex<FaultPlan>,
    association_writes: AtomicU64,
}

#[derive(Default)]
struct Collections {
    associations: BTreeMap<AssociationId, Association>,
    codes: HashMap<String, AssociationId>,
    clubs: BTreeMap<ClubId, Club>,
    references: HashMap<AssociationId, u64>,
}

#[derive(Default)]
struct FaultPlan {
    failing_updates: HashSet<AssociationId>,
    fail_queries: bool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the active downstream reference count reported for `id`.
    pub fn set_active_references(&self, id: &AssociationId, count: u64) {
        let mut inner = self.inner.write();
        if count == 0 {
            inner.references.remove(id);
        } else {
            inner.references.insert(id.clone(), count);
        }
    }

    /// Makes every subsequent update of `id` fail until faults are cleared.
    pub fn fail_updates_for(&self, id: &AssociationId) {
        self.faults.lock().failing_updates.insert(id.clone());
    }

    /// Makes every subsequent `find_associations` call fail.
    pub fn fail_queries(&self, enabled: bool) {
        self.faults.lock().fail_queries = enabled;
    }

    /// Removes all injected faults.
    pub fn clear_faults(&self) {
        let mut faults = self.faults.lock();
        faults.failing_updates.clear();
        faults.fail_queries = false;
    }

    /// Number of successful association inserts and updates so far.
    pub fn association_writes(&self) -> u64 {
        self.association_writes.load(Ordering::Relaxed)
    }

    /// Stores a record verbatim, bypassing uniqueness checks.
    ///
    /// Intended for seeding fixtures that deliberately violate invariants.
    pub fn put_association_unchecked(&self, record: Association) {
        let mut inner = self.inner.write();
        inner.codes.insert(record.code.clone(), record.id.clone());
        inner.associations.insert(record.id.clone(), record);
    }

    /// Stores a club verbatim, without checking its parent.
    pub fn put_club_unchecked(&self, record: Club) {
        self.inner.write().clubs.insert(record.id.clone(), record);
    }
}

impl RecordStore for MemoryStore {
    fn find_association(&self, id: &AssociationId) -> Result<Option<Association>> {
        Ok(self.inner.read().associations.get(id).cloned())
    }

    fn find_associations(&self, filter: &AssociationFilter) -> Result<Vec<Association>> {
        if self.faults.lock().fail_queries {
            return Err(StorageError::Injected("association query".into()));
        }
        let inner = self.inner.read();
        Ok(inner
            .associations
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }

    fn count_associations(&self, filter: &AssociationFilter) -> Result<u64> {
        let inner = self.inner.read();
        Ok(inner
            .associations
            .values()
            .filter(|record| filter.matches(record))
            .count() as u64)
    }

    fn insert_association(&self, record: &Association) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.associations.contains_key(&record.id) {
            return Err(StorageError::Duplicate {
                collection: Collection::Associations,
                field: UniqueField::Id,
                value: record.id.to_string(),
            });
        }
        if inner.codes.contains_key(&record.code) {
            return Err(StorageError::Duplicate {
                collection: Collection::Associations,
                field: UniqueField::Code,
                value: record.code.clone(),
            });
        }
        inner.codes.insert(record.code.clone(), record.id.clone());
        inner.associations.insert(record.id.clone(), record.clone());
        self.association_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn update_association(&self, id: &AssociationId, patch: &AssociationPatch) -> Result<()> {
        if self.faults.lock().failing_updates.contains(id) {
            return Err(StorageError::Injected(format!("update of {id}")));
        }
        let mut inner = self.inner.write();
        let record = inner
            .associations
            .get_mut(id)
            .ok_or_else(|| StorageError::Missing {
                collection: Collection::Associations,
                id: id.to_string(),
            })?;
        patch.apply(record);
        self.association_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn find_club(&self, id: &ClubId) -> Result<Option<Club>> {
        Ok(self.inner.read().clubs.get(id).cloned())
    }

    fn find_clubs(&self, filter: &ClubFilter) -> Result<Vec<Club>> {
        let inner = self.inner.read();
        Ok(inner
            .clubs
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }

    fn count_clubs(&self, filter: &ClubFilter) -> Result<u64> {
        let inner = self.inner.read();
        Ok(inner
            .clubs
            .values()
            .filter(|record| filter.matches(record))
            .count() as u64)
    }

    fn insert_club(&self, record: &Club) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.clubs.contains_key(&record.id) {
            return Err(StorageError::Duplicate {
                collection: Collection::Clubs,
                field: UniqueField::Id,
                value: record.id.to_string(),
            });
        }
        inner.clubs.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn update_club(&self, id: &ClubId, patch: &ClubPatch) -> Result<()> {
        let mut inner = self.inner.write();
        let record = inner.clubs.get_mut(id).ok_or_else(|| StorageError::Missing {
            collection: Collection::Clubs,
            id: id.to_string(),
        })?;
        patch.apply(record);
        Ok(())
    }
}

impl ReferenceCounter for MemoryStore {
    fn count_active_references(&self, id: &AssociationId) -> Result<u64> {
        Ok(self.inner.read().references.get(id).copied().unwrap_or(0))
    }
}
