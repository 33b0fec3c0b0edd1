use serde::{Deserialize, Serialize};

use crate::types::{AssociationId, ClubId};

/// Leaf record attached to exactly one association.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Club {
    /// Unique identifier.
    pub id: ClubId,
    /// Owning association.
    pub parent_id: AssociationId,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

impl Club {
    /// Builds a club record.
    pub fn new(
        id: impl Into<ClubId>,
        parent_id: impl Into<AssociationId>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.into(),
            name: name.into(),
        }
    }
}
