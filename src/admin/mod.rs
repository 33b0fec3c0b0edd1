#![forbid(unsafe_code)]

//! Consistency maintenance for stored forests.
//!
//! [`verify`] audits materialized paths against `parent_id` links without
//! writing anything. [`repair`] rebuilds every path from the links.

mod error;
mod repair;
mod verify;

/// Error types for administrative operations.
pub use error::{AdminError, Result};

/// Path reconstruction from adjacency.
pub use repair::{repair, RepairOptions, RepairReport};

/// Read-only integrity audit.
pub use verify::{verify, VerifyCounts, VerifyFinding, VerifyLevel, VerifyReport, VerifySeverity};
