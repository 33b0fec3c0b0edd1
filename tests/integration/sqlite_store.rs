#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use lineage::hierarchy::{HierarchyEngine, HierarchyError};
use lineage::model::{Club, Contact, DetailsPatch, NewAssociation};
use lineage::storage::{
    AssociationFilter, ClubFilter, RecordStore, ReferenceCounter, SqliteStore, StorageError,
};
use lineage::types::{AssociationId, Status, UniqueField};
use tempfile::TempDir;

fn id(raw: &str) -> AssociationId {
    AssociationId::new(raw)
}

fn seed(engine: &HierarchyEngine) {
    for (raw, parent) in [
        ("ha", None),
        ("hq", Some("ha")),
        ("bha", Some("hq")),
        ("club-area", Some("bha")),
        ("other", None),
    ] {
        let mut candidate = NewAssociation::new(raw, raw.to_uppercase(), raw);
        if let Some(parent) = parent {
            candidate = candidate.with_parent(parent);
        }
        engine.create_association(candidate).expect("create");
    }
}

#[test]
fn records_round_trip_through_sqlite() {
    let store = SqliteStore::open_in_memory().unwrap();
    let engine = HierarchyEngine::new(Arc::new(store));
    let created = engine
        .create_association(
            NewAssociation::new("ha", "HA", "National")
                .with_status(Status::Suspended)
                .with_contact(Contact {
                    email: Some("office@example.org".into()),
                    ..Contact::default()
                }),
        )
        .unwrap();
    let loaded = engine.association(&id("ha")).unwrap().unwrap();
    assert_eq!(loaded, created);
    assert_eq!(loaded.contact.email.as_deref(), Some("office@example.org"));
}

#[test]
fn hierarchy_contains_uses_json_membership() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let engine = HierarchyEngine::new(store.clone());
    seed(&engine);

    let under_hq: Vec<AssociationId> = store
        .find_associations(&AssociationFilter::descendants_of(&id("hq")))
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(under_hq, vec![id("bha"), id("club-area")]);

    // substring of another id must not match
    let under_h = store
        .count_associations(&AssociationFilter::descendants_of(&id("h")))
        .unwrap();
    assert_eq!(under_h, 0);

    let roots = store.count_associations(&AssociationFilter::roots()).unwrap();
    assert_eq!(roots, 2);
}

#[test]
fn unique_violations_map_to_duplicates() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let engine = HierarchyEngine::new(store.clone());
    seed(&engine);

    let mut twin = store.find_association(&id("ha")).unwrap().unwrap();
    twin.id = id("fresh");
    let err = store.insert_association(&twin).unwrap_err();
    assert!(matches!(
        err,
        StorageError::Duplicate {
            field: UniqueField::Code,
            ..
        }
    ));

    engine.add_club(Club::new("k", "bha", "Club")).unwrap();
    let err = engine.add_club(Club::new("k", "ha", "Again")).unwrap_err();
    assert!(matches!(
        err,
        HierarchyError::AlreadyExists {
            field: UniqueField::Id,
            ..
        }
    ));
}

#[test]
fn cascade_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("forest.db");
    {
        let engine = HierarchyEngine::new(Arc::new(SqliteStore::open(&path).unwrap()));
        seed(&engine);
        engine.add_club(Club::new("k", "club-area", "Club")).unwrap();
        engine
            .reparent_association(&id("hq"), Some(id("other")))
            .unwrap();
        engine
            .update_details(
                &id("bha"),
                DetailsPatch {
                    name: Some("Regional".into()),
                    ..DetailsPatch::default()
                },
            )
            .unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    let leaf = store.find_association(&id("club-area")).unwrap().unwrap();
    assert_eq!(leaf.level, 3);
    assert_eq!(leaf.hierarchy, vec![id("other"), id("hq"), id("bha")]);
    let bha = store.find_association(&id("bha")).unwrap().unwrap();
    assert_eq!(bha.name, "Regional");
    assert_eq!(store.count_clubs(&ClubFilter::attached_to(&id("club-area"))).unwrap(), 1);
}

#[test]
fn downstream_references_block_delete_until_released() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let engine = HierarchyEngine::new(store.clone());
    seed(&engine);

    store.record_reference(&id("other"), "registration", true).unwrap();
    store.record_reference(&id("other"), "licence", false).unwrap();
    assert_eq!(store.count_active_references(&id("other")).unwrap(), 1);

    let err = engine.delete_association(&id("other")).unwrap_err();
    assert!(matches!(err, HierarchyError::HasActiveReferences { count: 1, .. }));

    assert_eq!(store.release_references(&id("other"), "registration").unwrap(), 1);
    engine.delete_association(&id("other")).unwrap();
    let other = store.find_association(&id("other")).unwrap().unwrap();
    assert_eq!(other.status, Status::Inactive);
    let live_roots = store
        .count_associations(&AssociationFilter::roots().excluding(Status::Inactive))
        .unwrap();
    assert_eq!(live_roots, 1);
}

#[test]
fn writer_claim_excludes_other_processes_until_released() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("forest.db");
    let first = Arc::new(SqliteStore::open(&path).unwrap());
    let second = SqliteStore::open(&path).unwrap();
    second.set_busy_timeout(Duration::from_millis(50)).unwrap();

    let claim = first.claim_writer().unwrap();
    let err = second.claim_writer().err().expect("second writer must wait");
    assert!(matches!(err, StorageError::Sqlite(_)));

    let engine = HierarchyEngine::new(first.clone());
    engine
        .create_association(NewAssociation::new("ha", "HA", "National"))
        .unwrap();
    assert!(second.find_association(&id("ha")).unwrap().is_none());

    claim.release().unwrap();
    assert!(second.find_association(&id("ha")).unwrap().is_some());
    second.claim_writer().unwrap().release().unwrap();
}
