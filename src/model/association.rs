use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::hierarchy::MaterializedPath;
use crate::model::settings::{AssociationSettings, AssociationSettingsInput};
use crate::types::{AssociationId, Status};

/// Postal and electronic contact details. Opaque to the engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Contact {
    /// Postal address.
    pub address: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Contact phone number.
    pub phone: Option<String>,
    /// Public website.
    pub website: Option<String>,
}

/// A node of the association forest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    /// Unique, stable identifier.
    pub id: AssociationId,
    /// Unique short label.
    pub code: String,
    /// Direct parent, `None` for roots.
    pub parent_id: Option<AssociationId>,
    /// Depth from the nearest root.
    pub level: u32,
    /// Ancestor ids, root first, excluding the association itself.
    pub hierarchy: Vec<AssociationId>,
    /// Lifecycle status.
    pub status: Status,
    /// Display name.
    pub name: String,
    /// Contact details.
    #[serde(default)]
    pub contact: Contact,
    /// Business settings resolved at creation.
    pub settings: AssociationSettings,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Timestamp of the last write.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Association {
    /// True when the association has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// True unless the association was soft-deleted.
    pub fn is_live(&self) -> bool {
        self.status != Status::Inactive
    }

    /// Returns the stored materialized path.
    pub fn path(&self) -> MaterializedPath {
        MaterializedPath {
            level: self.level,
            hierarchy: self.hierarchy.clone(),
        }
    }

    /// Id of the tree root this association belongs to, according to its path.
    pub fn root_id(&self) -> &AssociationId {
        self.hierarchy.first().unwrap_or(&self.id)
    }
}

/// Candidate submitted to [`crate::hierarchy::HierarchyEngine::create_association`].
///
/// `level` and `hierarchy` may be supplied by clients but are always recomputed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewAssociation {
    /// Requested identifier.
    pub id: AssociationId,
    /// Requested short code.
    pub code: String,
    /// Declared parent.
    pub parent_id: Option<AssociationId>,
    /// Display name.
    pub name: String,
    /// Initial status, defaults to active.
    pub status: Option<Status>,
    /// Contact details.
    #[serde(default)]
    pub contact: Contact,
    /// Settings overrides.
    #[serde(default)]
    pub settings: AssociationSettingsInput,
    /// Client-side level hint; ignored.
    pub level: Option<u32>,
    /// Client-side hierarchy hint; ignored.
    pub hierarchy: Option<Vec<AssociationId>>,
}

impl NewAssociation {
    /// Starts a root candidate.
    pub fn new(id: impl Into<AssociationId>, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Declares the parent association.
    pub fn with_parent(mut self, parent: impl Into<AssociationId>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    /// Sets the initial status.
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets contact details.
    pub fn with_contact(mut self, contact: Contact) -> Self {
        self.contact = contact;
        self
    }

    /// Sets settings overrides.
    pub fn with_settings(mut self, settings: AssociationSettingsInput) -> Self {
        self.settings = settings;
        self
    }
}

/// Non-structural edit of an association's descriptive fields.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DetailsPatch {
    /// New display name.
    pub name: Option<String>,
    /// Replacement contact details.
    pub contact: Option<Contact>,
    /// Replacement settings document.
    pub settings: Option<AssociationSettings>,
}

impl DetailsPatch {
    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.contact.is_none() && self.settings.is_none()
    }
}
