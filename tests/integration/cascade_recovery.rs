#![allow(missing_docs)]

use std::sync::Arc;

use lineage::hierarchy::{HierarchyEngine, HierarchyError};
use lineage::model::NewAssociation;
use lineage::storage::{MemoryStore, StorageError};
use lineage::types::AssociationId;

fn id(raw: &str) -> AssociationId {
    AssociationId::new(raw)
}

/// root -> b -> {c1 -> d1, c2}, plus target root r
fn seeded() -> (Arc<MemoryStore>, HierarchyEngine) {
    let store = Arc::new(MemoryStore::new());
    let engine = HierarchyEngine::new(store.clone());
    for (raw, parent) in [
        ("root", None),
        ("r", None),
        ("b", Some("root")),
        ("c1", Some("b")),
        ("c2", Some("b")),
        ("d1", Some("c1")),
    ] {
        let mut candidate = NewAssociation::new(raw, raw.to_uppercase(), raw);
        if let Some(parent) = parent {
            candidate = candidate.with_parent(parent);
        }
        engine.create_association(candidate).unwrap();
    }
    (store, engine)
}

fn hierarchy(engine: &HierarchyEngine, raw: &str) -> Vec<String> {
    engine
        .association(&id(raw))
        .unwrap()
        .unwrap()
        .hierarchy
        .into_iter()
        .map(|a| a.0)
        .collect()
}

#[test]
fn partial_failure_reports_exact_split() {
    let (store, engine) = seeded();
    store.fail_updates_for(&id("c1"));

    let err = engine
        .reparent_association(&id("b"), Some(id("r")))
        .unwrap_err();
    assert!(err.is_retryable());
    match &err {
        HierarchyError::PartialCascadeFailure {
            node,
            repaired,
            failed,
            total,
        } => {
            assert_eq!(node, &id("b"));
            assert_eq!(*total, 3);
            assert_eq!(failed, &vec![id("c1")]);
            assert_eq!(repaired.len(), 2);
            assert!(repaired.contains(&id("c2")));
            assert!(repaired.contains(&id("d1")));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        err.to_string(),
        "update of b succeeded but 1 of 3 descendants may be stale; retry recommended"
    );

    // the node itself and the healthy descendants are already moved
    assert_eq!(hierarchy(&engine, "b"), vec!["r"]);
    assert_eq!(hierarchy(&engine, "c2"), vec!["r", "b"]);
    assert_eq!(hierarchy(&engine, "d1"), vec!["r", "b", "c1"]);
    assert_eq!(hierarchy(&engine, "c1"), vec!["root", "b"]);
}

#[test]
fn resume_converges_and_then_writes_nothing() {
    let (store, engine) = seeded();
    store.fail_updates_for(&id("c1"));
    engine
        .reparent_association(&id("b"), Some(id("r")))
        .unwrap_err();

    // still failing: resume reports the same stale record
    let err = engine.resume_cascade(&id("b")).unwrap_err();
    assert!(matches!(err, HierarchyError::PartialCascadeFailure { ref failed, .. } if failed == &vec![id("c1")]));

    store.clear_faults();
    let report = engine.resume_cascade(&id("b")).unwrap();
    assert_eq!(report.repaired, vec![id("c1")]);
    assert_eq!(report.unchanged.len(), 2);
    assert_eq!(hierarchy(&engine, "c1"), vec!["r", "b"]);

    let writes = store.association_writes();
    let again = engine.resume_cascade(&id("b")).unwrap();
    assert!(again.repaired.is_empty());
    assert_eq!(again.unchanged.len(), 3);
    assert_eq!(store.association_writes(), writes);
}

#[test]
fn resume_refreshes_the_anchor_itself() {
    let (store, engine) = seeded();
    // anchor path drifted while its parent link is correct
    let mut b = engine.association(&id("b")).unwrap().unwrap();
    b.hierarchy = vec![id("elsewhere")];
    store.put_association_unchecked(b);

    let report = engine.resume_cascade(&id("b")).unwrap();
    assert!(report.is_complete());
    assert_eq!(hierarchy(&engine, "b"), vec!["root"]);
    assert_eq!(hierarchy(&engine, "d1"), vec!["root", "b", "c1"]);
}

#[test]
fn failed_capture_aborts_before_any_write() {
    let (store, engine) = seeded();
    store.fail_queries(true);
    let writes = store.association_writes();

    let err = engine
        .reparent_association(&id("b"), Some(id("r")))
        .unwrap_err();
    assert!(matches!(
        err,
        HierarchyError::Storage(StorageError::Injected(_))
    ));
    assert!(!err.is_retryable());
    assert_eq!(store.association_writes(), writes);

    store.fail_queries(false);
    assert_eq!(hierarchy(&engine, "b"), vec!["root"]);
}

#[test]
fn failed_anchor_write_leaves_everything_in_place() {
    let (store, engine) = seeded();
    store.fail_updates_for(&id("b"));

    let err = engine
        .reparent_association(&id("b"), Some(id("r")))
        .unwrap_err();
    assert!(matches!(err, HierarchyError::Storage(_)));
    store.clear_faults();
    assert_eq!(hierarchy(&engine, "b"), vec!["root"]);
    assert_eq!(hierarchy(&engine, "d1"), vec!["root", "b", "c1"]);
}
