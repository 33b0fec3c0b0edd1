use std::collections::HashSet;

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::admin::Result;
use crate::model::Association;
use crate::storage::{AssociationFilter, ClubFilter, RecordStore};
use crate::types::{AssociationId, Status};

const MAX_FINDINGS: usize = 32;

/// Specifies the depth of verification checks to perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyLevel {
    /// Per-record checks only: `level` against path length, self in path.
    Fast,
    /// Also walks every `parent_id` chain and compares it with the stored path.
    Full,
}

/// Indicates the severity level of a verification finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Suspicious but allowed state, such as a live record under an inactive parent.
    Warning,
    /// Broken invariant.
    Error,
}

/// Represents a single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// The severity level of this finding.
    pub severity: VerifySeverity,
    /// Record the finding is about.
    pub subject: String,
    /// Human-readable description of the issue.
    pub message: String,
}

/// Statistics collected during the verification process.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Associations examined.
    pub associations: u64,
    /// Associations without a parent.
    pub roots: u64,
    /// Clubs examined.
    pub clubs: u64,
    /// Associations whose stored path disagrees with their `parent_id` chain.
    pub stale_paths: u64,
    /// Associations whose `parent_id` chain loops or dangles.
    pub broken_chains: u64,
}

/// Complete report of a verification operation.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// The verification level that was performed.
    pub level: VerifyLevel,
    /// Whether verification passed without finding any issues.
    pub success: bool,
    /// Issues discovered, capped at a fixed number.
    pub findings: Vec<VerifyFinding>,
    /// Statistics about the records examined.
    pub counts: VerifyCounts,
}

impl VerifyReport {
    /// True if any finding is an error.
    pub fn has_errors(&self) -> bool {
        self.findings
            .iter()
            .any(|finding| finding.severity == VerifySeverity::Error)
    }
}

/// Audits the stored forest against the structural invariants.
///
/// The audit never trusts the materialized path it is checking: in
/// [`VerifyLevel::Full`] the expected path of every association is derived by
/// walking `parent_id` links. Counts are exact even when findings are capped.
pub fn verify(store: &dyn RecordStore, level: VerifyLevel) -> Result<VerifyReport> {
    let associations = store.find_associations(&AssociationFilter::all())?;
    let clubs = store.find_clubs(&ClubFilter::all())?;
    let index: FxHashMap<&AssociationId, &Association> =
        associations.iter().map(|record| (&record.id, record)).collect();

    let mut findings = Vec::new();
    let mut counts = VerifyCounts {
        associations: associations.len() as u64,
        clubs: clubs.len() as u64,
        ..VerifyCounts::default()
    };

    for record in &associations {
        if record.is_root() {
            counts.roots += 1;
        }
        if record.level as usize != record.hierarchy.len() {
            push(
                &mut findings,
                VerifySeverity::Error,
                &record.id,
                format!(
                    "level {} does not match path length {}",
                    record.level,
                    record.hierarchy.len()
                ),
            );
        }
        if record.hierarchy.contains(&record.id) {
            push(
                &mut findings,
                VerifySeverity::Error,
                &record.id,
                "association lists itself as an ancestor",
            );
        }

        if let Some(parent_id) = &record.parent_id {
            match index.get(parent_id) {
                None => push(
                    &mut findings,
                    VerifySeverity::Error,
                    &record.id,
                    format!("parent '{parent_id}' does not exist"),
                ),
                Some(parent) if parent.status == Status::Inactive && record.is_live() => push(
                    &mut findings,
                    VerifySeverity::Warning,
                    &record.id,
                    format!("live association under inactive parent '{parent_id}'"),
                ),
                Some(_) => {}
            }
        }

        if level == VerifyLevel::Full {
            match walk_parents(record, &index) {
                Chain::Complete(expected) => {
                    if expected != record.hierarchy {
                        counts.stale_paths += 1;
                        push(
                            &mut findings,
                            VerifySeverity::Error,
                            &record.id,
                            format!(
                                "stored path [{}] differs from parent chain [{}]",
                                join(&record.hierarchy),
                                join(&expected)
                            ),
                        );
                    }
                }
                Chain::Cycle(at) => {
                    counts.broken_chains += 1;
                    push(
                        &mut findings,
                        VerifySeverity::Error,
                        &record.id,
                        format!("parent chain loops back to '{at}'"),
                    );
                }
                Chain::Dangling(missing) => {
                    counts.broken_chains += 1;
                    // a missing direct parent already has its own finding
                    if record.parent_id.as_ref() != Some(&missing) {
                        push(
                            &mut findings,
                            VerifySeverity::Warning,
                            &record.id,
                            format!("parent chain breaks at missing ancestor '{missing}'"),
                        );
                    }
                }
            }
        }
    }

    for club in &clubs {
        let subject = club.id.as_str();
        if club.id.is_blank() {
            push(
                &mut findings,
                VerifySeverity::Error,
                &club.parent_id,
                "club without id",
            );
            continue;
        }
        match index.get(&club.parent_id) {
            None => push(
                &mut findings,
                VerifySeverity::Error,
                subject,
                format!("club parent '{}' does not exist", club.parent_id),
            ),
            Some(parent) if parent.status == Status::Inactive => push(
                &mut findings,
                VerifySeverity::Warning,
                subject,
                format!("club attached to inactive association '{}'", club.parent_id),
            ),
            Some(_) => {}
        }
    }

    debug!(
        associations = counts.associations,
        clubs = counts.clubs,
        stale = counts.stale_paths,
        "verify scanned forest"
    );
    info!(findings = findings.len(), ?level, "verification finished");
    Ok(VerifyReport {
        level,
        success: findings.is_empty(),
        findings,
        counts,
    })
}

enum Chain {
    /// Root-first ancestors reached through `parent_id`.
    Complete(Vec<AssociationId>),
    Cycle(AssociationId),
    Dangling(AssociationId),
}

fn walk_parents(record: &Association, index: &FxHashMap<&AssociationId, &Association>) -> Chain {
    let mut seen: HashSet<&AssociationId> = HashSet::from([&record.id]);
    let mut ancestors = Vec::new();
    let mut cursor = record.parent_id.as_ref();
    while let Some(parent_id) = cursor {
        if !seen.insert(parent_id) {
            return Chain::Cycle(parent_id.clone());
        }
        let Some(parent) = index.get(parent_id) else {
            return Chain::Dangling(parent_id.clone());
        };
        ancestors.push(parent_id.clone());
        cursor = parent.parent_id.as_ref();
    }
    ancestors.reverse();
    Chain::Complete(ancestors)
}

fn join(ids: &[AssociationId]) -> String {
    ids.iter()
        .map(AssociationId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn push(
    findings: &mut Vec<VerifyFinding>,
    severity: VerifySeverity,
    subject: impl ToString,
    message: impl Into<String>,
) {
    if findings.len() < MAX_FINDINGS {
        findings.push(VerifyFinding {
            severity,
            subject: subject.to_string(),
            message: message.into(),
        });
    }
}
