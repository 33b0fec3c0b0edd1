#![allow(missing_docs)]

use std::sync::Arc;

use lineage::admin::{repair, verify, RepairOptions, VerifyLevel, VerifySeverity};
use lineage::hierarchy::HierarchyEngine;
use lineage::model::{Club, NewAssociation};
use lineage::storage::{MemoryStore, RecordStore};
use lineage::types::{AssociationId, Status};

fn id(raw: &str) -> AssociationId {
    AssociationId::new(raw)
}

fn seeded() -> (Arc<MemoryStore>, HierarchyEngine) {
    let store = Arc::new(MemoryStore::new());
    let engine = HierarchyEngine::new(store.clone());
    for (raw, parent) in [
        ("root", None),
        ("b", Some("root")),
        ("c", Some("b")),
        ("d", Some("c")),
        ("r", None),
    ] {
        let mut candidate = NewAssociation::new(raw, raw.to_uppercase(), raw);
        if let Some(parent) = parent {
            candidate = candidate.with_parent(parent);
        }
        engine.create_association(candidate).unwrap();
    }
    engine.add_club(Club::new("k", "d", "Club")).unwrap();
    (store, engine)
}

#[test]
fn engine_built_forest_verifies_clean() {
    let (store, engine) = seeded();
    engine.reparent_association(&id("b"), Some(id("r"))).unwrap();
    let report = verify(store.as_ref(), VerifyLevel::Full).unwrap();
    assert!(report.success, "{:?}", report.findings);
    assert_eq!(report.counts.associations, 5);
    assert_eq!(report.counts.roots, 2);
    assert_eq!(report.counts.clubs, 1);
}

#[test]
fn partial_cascade_is_visible_to_verify_and_fixed_by_repair() {
    let (store, engine) = seeded();
    store.fail_updates_for(&id("d"));
    engine
        .reparent_association(&id("b"), Some(id("r")))
        .unwrap_err();
    store.clear_faults();

    let report = verify(store.as_ref(), VerifyLevel::Full).unwrap();
    assert!(!report.success);
    assert_eq!(report.counts.stale_paths, 1);
    assert_eq!(report.findings[0].subject, "d");
    assert_eq!(report.findings[0].severity, VerifySeverity::Error);

    let fixed = repair(&engine, RepairOptions::default()).unwrap();
    assert_eq!(fixed.rewritten, vec![id("d")]);
    assert!(verify(store.as_ref(), VerifyLevel::Full).unwrap().success);
}

#[test]
fn dry_run_reports_without_writing() {
    let (store, engine) = seeded();
    let mut c = store.find_association(&id("c")).unwrap().unwrap();
    c.level = 9;
    store.put_association_unchecked(c);
    let writes = store.association_writes();

    let preview = repair(&engine, RepairOptions { dry_run: true }).unwrap();
    assert!(preview.dry_run);
    assert_eq!(preview.rewritten, vec![id("c")]);
    assert_eq!(store.association_writes(), writes);
    assert!(verify(store.as_ref(), VerifyLevel::Fast).unwrap().has_errors());
}

#[test]
fn inactive_parents_are_warnings() {
    let (store, engine) = seeded();
    engine.set_status(&id("r"), Status::Inactive).unwrap();
    let mut lingering = store.find_association(&id("b")).unwrap().unwrap();
    lingering.parent_id = Some(id("r"));
    lingering.hierarchy = vec![id("r")];
    store.put_association_unchecked(lingering);
    // c and d keep their old paths, so only b's subtree is stale
    let report = verify(store.as_ref(), VerifyLevel::Full).unwrap();
    assert!(report
        .findings
        .iter()
        .any(|f| f.subject == "b" && f.severity == VerifySeverity::Warning));
    assert_eq!(report.counts.stale_paths, 2);
}
