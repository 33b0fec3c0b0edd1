#![forbid(unsafe_code)]

//! Command-line support: bulk import and export of the forest.

/// CSV import and JSON export.
pub mod import_export;
