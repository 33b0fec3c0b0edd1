use time::OffsetDateTime;

use crate::hierarchy::MaterializedPath;
use crate::model::{Association, AssociationSettings, Club, Contact};
use crate::types::{AssociationId, Status};

/// Partial update of an association record.
///
/// Only the populated fields are written; everything else is left untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssociationPatch {
    /// New parent; `Some(None)` promotes to root.
    pub parent_id: Option<Option<AssociationId>>,
    /// New depth.
    pub level: Option<u32>,
    /// New ancestor list.
    pub hierarchy: Option<Vec<AssociationId>>,
    /// New status.
    pub status: Option<Status>,
    /// New display name.
    pub name: Option<String>,
    /// Replacement contact details.
    pub contact: Option<Contact>,
    /// Replacement settings document.
    pub settings: Option<AssociationSettings>,
    /// Write timestamp.
    pub updated_at: Option<OffsetDateTime>,
}

impl AssociationPatch {
    /// Re-parents a record and stores its recomputed path.
    pub fn reparent(parent_id: Option<AssociationId>, path: MaterializedPath) -> Self {
        Self {
            parent_id: Some(parent_id),
            level: Some(path.level),
            hierarchy: Some(path.hierarchy),
            ..Self::default()
        }
    }

    /// Rewrites only the materialized path.
    pub fn reindex(path: MaterializedPath) -> Self {
        Self {
            level: Some(path.level),
            hierarchy: Some(path.hierarchy),
            ..Self::default()
        }
    }

    /// Changes only the status.
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Stamps the patch with a write time.
    pub fn touched(mut self, at: OffsetDateTime) -> Self {
        self.updated_at = Some(at);
        self
    }

    /// Returns true if the patch touches no structural or descriptive field.
    pub fn is_empty(&self) -> bool {
        self.parent_id.is_none()
            && self.level.is_none()
            && self.hierarchy.is_none()
            && self.status.is_none()
            && self.name.is_none()
            && self.contact.is_none()
            && self.settings.is_none()
    }

    /// Applies the patch to an in-memory record.
    pub fn apply(&self, record: &mut Association) {
        if let Some(parent_id) = &self.parent_id {
            record.parent_id = parent_id.clone();
        }
        if let Some(level) = self.level {
            record.level = level;
        }
        if let Some(hierarchy) = &self.hierarchy {
            record.hierarchy = hierarchy.clone();
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(contact) = &self.contact {
            record.contact = contact.clone();
        }
        if let Some(settings) = &self.settings {
            record.settings = settings.clone();
        }
        if let Some(at) = self.updated_at {
            record.updated_at = at;
        }
    }
}

/// Partial update of a club record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClubPatch {
    /// New owning association.
    pub parent_id: Option<AssociationId>,
    /// New display name.
    pub name: Option<String>,
}

impl ClubPatch {
    /// Applies the patch to an in-memory record.
    pub fn apply(&self, record: &mut Club) {
        if let Some(parent_id) = &self.parent_id {
            record.parent_id = parent_id.clone();
        }
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
    }
}
