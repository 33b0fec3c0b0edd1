#![forbid(unsafe_code)]

//! Identifier and enumeration types shared by the storage layer and the engine.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable identifier of an association record.
#[derive(Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssociationId(pub String);

/// Stable identifier of a club record.
#[derive(Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClubId(pub String);

impl AssociationId {
    /// Wraps a raw identifier.
    pub fn new(value: impl Into<String>) -> Self {
        AssociationId(value.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the identifier is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl ClubId {
    /// Wraps a raw identifier.
    pub fn new(value: impl Into<String>) -> Self {
        ClubId(value.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the identifier is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for AssociationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ClubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssociationId {
    fn from(value: &str) -> Self {
        AssociationId(value.to_string())
    }
}

impl From<String> for AssociationId {
    fn from(value: String) -> Self {
        AssociationId(value)
    }
}

impl From<&str> for ClubId {
    fn from(value: &str) -> Self {
        ClubId(value.to_string())
    }
}

impl From<String> for ClubId {
    fn from(value: String) -> Self {
        ClubId(value)
    }
}

impl Borrow<str> for AssociationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Lifecycle status of an association.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Operating normally.
    #[default]
    Active,
    /// Soft-deleted; the id and code stay reserved.
    Inactive,
    /// Temporarily suspended by an administrator.
    Suspended,
}

impl Status {
    /// Canonical lowercase name used in storage and CLI output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Inactive => "inactive",
            Status::Suspended => "suspended",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Error)]
#[error("unknown status '{0}', expected active, inactive or suspended")]
pub struct ParseStatusError(pub String);

impl FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Status::Active),
            "inactive" => Ok(Status::Inactive),
            "suspended" => Ok(Status::Suspended),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Record collections known to the storage layer.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Tree nodes.
    Associations,
    /// Leaves attached to exactly one association.
    Clubs,
}

impl Collection {
    /// Collection name as stored.
    pub const fn as_str(self) -> &'static str {
        match self {
            Collection::Associations => "associations",
            Collection::Clubs => "clubs",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field covered by a uniqueness constraint.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UniqueField {
    /// Record identifier.
    Id,
    /// Association short code.
    Code,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueField::Id => f.write_str("id"),
            UniqueField::Code => f.write_str("code"),
        }
    }
}
