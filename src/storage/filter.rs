use crate::model::{Association, Club};
use crate::types::{AssociationId, Status};

/// Predicate over the `associations` collection.
///
/// All populated criteria must match. An empty filter matches every record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssociationFilter {
    /// `Some(None)` selects roots, `Some(Some(p))` selects direct children of `p`.
    pub parent: Option<Option<AssociationId>>,
    /// Selects records whose materialized path lists this id.
    pub hierarchy_contains: Option<AssociationId>,
    /// Selects records with this status.
    pub status: Option<Status>,
    /// Rejects records with this status.
    pub exclude_status: Option<Status>,
    /// Selects the record with this code.
    pub code: Option<String>,
}

impl AssociationFilter {
    /// Matches every association.
    pub fn all() -> Self {
        Self::default()
    }

    /// Direct children of `parent`.
    pub fn children_of(parent: &AssociationId) -> Self {
        Self {
            parent: Some(Some(parent.clone())),
            ..Self::default()
        }
    }

    /// Associations without a parent.
    pub fn roots() -> Self {
        Self {
            parent: Some(None),
            ..Self::default()
        }
    }

    /// Proper descendants of `ancestor` at any depth.
    pub fn descendants_of(ancestor: &AssociationId) -> Self {
        Self {
            hierarchy_contains: Some(ancestor.clone()),
            ..Self::default()
        }
    }

    /// The association carrying `code`.
    pub fn with_code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::default()
        }
    }

    /// Restricts the filter to one status.
    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Excludes one status.
    pub fn excluding(mut self, status: Status) -> Self {
        self.exclude_status = Some(status);
        self
    }

    /// Evaluates the filter against an in-memory record.
    pub fn matches(&self, record: &Association) -> bool {
        if let Some(parent) = &self.parent {
            if record.parent_id.as_ref() != parent.as_ref() {
                return false;
            }
        }
        if let Some(ancestor) = &self.hierarchy_contains {
            if !record.hierarchy.contains(ancestor) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(status) = self.exclude_status {
            if record.status == status {
                return false;
            }
        }
        if let Some(code) = &self.code {
            if &record.code != code {
                return false;
            }
        }
        true
    }
}

/// Predicate over the `clubs` collection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClubFilter {
    /// Selects clubs attached to this association.
    pub parent: Option<AssociationId>,
}

impl ClubFilter {
    /// Matches every club.
    pub fn all() -> Self {
        Self::default()
    }

    /// Clubs attached to `parent`.
    pub fn attached_to(parent: &AssociationId) -> Self {
        Self {
            parent: Some(parent.clone()),
        }
    }

    /// Evaluates the filter against an in-memory record.
    pub fn matches(&self, record: &Club) -> bool {
        match &self.parent {
            Some(parent) => &record.parent_id == parent,
            None => true,
        }
    }
}
