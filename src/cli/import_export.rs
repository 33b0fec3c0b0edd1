use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::hierarchy::{HierarchyEngine, HierarchyError};
use crate::model::{Club, NewAssociation};
use crate::types::{AssociationId, Collection, Status};

/// Configuration for the complete import operation.
#[derive(Debug, Clone, Default)]
pub struct ImportConfig {
    /// CSV with columns `id,code,parent_id,name[,status]`.
    pub associations: Option<PathBuf>,
    /// CSV with columns `id,parent_id,name`.
    pub clubs: Option<PathBuf>,
}

/// A CSV row that was not imported.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedRow {
    /// Collection the row was meant for.
    pub collection: Collection,
    /// 1-based line number in the source file.
    pub line: u64,
    /// Value of the id column, possibly empty.
    pub id: String,
    /// Why the row was rejected.
    pub reason: String,
}

/// Summary statistics from an import operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    /// Associations created.
    pub associations_imported: u64,
    /// Clubs attached.
    pub clubs_imported: u64,
    /// Rows skipped, with reasons.
    pub rejected: Vec<RejectedRow>,
}

/// Configuration for exporting the forest as JSON.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Output path; `None` writes to stdout.
    pub out: Option<PathBuf>,
    /// Indent the output.
    pub pretty: bool,
}

/// Summary statistics from an export operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportSummary {
    /// Associations written.
    pub associations_exported: u64,
    /// Clubs written.
    pub clubs_exported: u64,
}

/// Error type for CLI import/export operations.
#[derive(Error, Debug)]
pub enum CliError {
    /// Generic error message.
    #[error("{0}")]
    Message(String),
    /// IO error from file operations.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// CSV parsing error.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// JSON encoding error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Engine error that aborts the whole operation.
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
}

impl From<&str> for CliError {
    fn from(value: &str) -> Self {
        CliError::Message(value.to_string())
    }
}

struct PendingAssociation {
    line: u64,
    candidate: NewAssociation,
}

/// Imports associations and clubs from CSV files through the engine.
///
/// Association rows may appear in any order: a row waits until its parent
/// has been created. Rows that fail validation, or whose parent never shows
/// up, are reported in [`ImportSummary::rejected`] instead of aborting the run.
pub fn run_import(engine: &HierarchyEngine, cfg: &ImportConfig) -> Result<ImportSummary, CliError> {
    if cfg.associations.is_none() && cfg.clubs.is_none() {
        return Err("import requires --associations and/or --clubs".into());
    }
    let mut summary = ImportSummary::default();
    if let Some(path) = &cfg.associations {
        import_associations(engine, path, &mut summary)?;
    }
    if let Some(path) = &cfg.clubs {
        import_clubs(engine, path, &mut summary)?;
    }
    info!(
        associations = summary.associations_imported,
        clubs = summary.clubs_imported,
        rejected = summary.rejected.len(),
        "import finished"
    );
    Ok(summary)
}

fn import_associations(
    engine: &HierarchyEngine,
    path: &Path,
    summary: &mut ImportSummary,
) -> Result<(), CliError> {
    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let id_index = find_column(&headers, "id")?;
    let code_index = find_column(&headers, "code")?;
    let parent_index = find_column(&headers, "parent_id")?;
    let name_index = find_column(&headers, "name")?;
    let status_index = find_column(&headers, "status").ok();

    let mut pending = Vec::new();
    let mut seen = HashSet::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|pos| pos.line()).unwrap_or_default();
        let id = cell(&record, id_index);
        let reject = |reason: String| RejectedRow {
            collection: Collection::Associations,
            line,
            id: id.to_string(),
            reason,
        };
        let code = cell(&record, code_index);
        if id.is_empty() || code.is_empty() {
            summary.rejected.push(reject("id and code are required".into()));
            continue;
        }
        if !seen.insert(id.to_string()) {
            summary.rejected.push(reject(format!("duplicate id '{id}' in file")));
            continue;
        }
        let status = match status_index.map(|idx| cell(&record, idx)) {
            Some(raw) if !raw.is_empty() => match raw.parse::<Status>() {
                Ok(status) => Some(status),
                Err(err) => {
                    summary.rejected.push(reject(err.to_string()));
                    continue;
                }
            },
            _ => None,
        };
        let mut candidate = NewAssociation::new(id, code, cell(&record, name_index));
        let parent = cell(&record, parent_index);
        if !parent.is_empty() {
            candidate = candidate.with_parent(parent);
        }
        candidate.status = status;
        pending.push(PendingAssociation { line, candidate });
    }

    let mut round = 0;
    while !pending.is_empty() {
        round += 1;
        let waiting: HashSet<AssociationId> = pending
            .iter()
            .map(|row| row.candidate.id.clone())
            .collect();
        let (ready, blocked): (Vec<_>, Vec<_>) = pending.into_iter().partition(|row| {
            row.candidate
                .parent_id
                .as_ref()
                .map_or(true, |parent| !waiting.contains(parent))
        });
        debug!(round, ready = ready.len(), blocked = blocked.len(), "import round");
        if ready.is_empty() {
            for row in blocked {
                let parent = row.candidate.parent_id.clone().unwrap_or_default();
                summary.rejected.push(RejectedRow {
                    collection: Collection::Associations,
                    line: row.line,
                    id: row.candidate.id.to_string(),
                    reason: format!("parent '{parent}' is part of a cycle in the file"),
                });
            }
            break;
        }
        for row in ready {
            let id = row.candidate.id.to_string();
            match engine.create_association(row.candidate) {
                Ok(_) => summary.associations_imported += 1,
                Err(err) if is_row_error(&err) => {
                    warn!(line = row.line, association = %id, error = %err, "row rejected");
                    summary.rejected.push(RejectedRow {
                        collection: Collection::Associations,
                        line: row.line,
                        id,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
        pending = blocked;
    }
    Ok(())
}

fn import_clubs(
    engine: &HierarchyEngine,
    path: &Path,
    summary: &mut ImportSummary,
) -> Result<(), CliError> {
    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let id_index = find_column(&headers, "id")?;
    let parent_index = find_column(&headers, "parent_id")?;
    let name_index = find_column(&headers, "name")?;

    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|pos| pos.line()).unwrap_or_default();
        let club = Club::new(
            cell(&record, id_index),
            cell(&record, parent_index),
            cell(&record, name_index),
        );
        let id = club.id.to_string();
        match engine.add_club(club) {
            Ok(_) => summary.clubs_imported += 1,
            Err(err) if is_row_error(&err) => summary.rejected.push(RejectedRow {
                collection: Collection::Clubs,
                line,
                id,
                reason: err.to_string(),
            }),
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Writes the forest as nested JSON.
pub fn run_export(engine: &HierarchyEngine, cfg: &ExportConfig) -> Result<ExportSummary, CliError> {
    let forest = engine.build_forest()?;
    let summary = ExportSummary {
        associations_exported: forest.node_count() as u64,
        clubs_exported: forest.leaf_count() as u64,
    };
    match &cfg.out {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            forest.write_json(&mut writer, cfg.pretty)?;
            writer.flush()?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            forest.write_json(&mut writer, cfg.pretty)?;
            writeln!(writer)?;
        }
    }
    Ok(summary)
}

fn is_row_error(err: &HierarchyError) -> bool {
    !matches!(
        err,
        HierarchyError::Storage(_) | HierarchyError::LockTimeout(_)
    )
}

fn find_column(headers: &StringRecord, name: &str) -> Result<usize, CliError> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| CliError::Message(format!("column '{}' not found", name)))
}

fn cell(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).map(str::trim).unwrap_or_default()
}
