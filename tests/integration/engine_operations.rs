#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;

use lineage::hierarchy::{DeleteOutcome, HierarchyEngine, HierarchyError};
use lineage::model::{Club, NewAssociation};
use lineage::storage::{MemoryStore, RecordStore};
use lineage::types::{AssociationId, ClubId, Status, UniqueField};

fn setup() -> (Arc<MemoryStore>, HierarchyEngine) {
    let store = Arc::new(MemoryStore::new());
    let engine = HierarchyEngine::new(store.clone());
    (store, engine)
}

fn id(raw: &str) -> AssociationId {
    AssociationId::new(raw)
}

fn ids(raw: &[&str]) -> Vec<AssociationId> {
    raw.iter().map(|r| id(r)).collect()
}

fn create(engine: &HierarchyEngine, raw: &str, parent: Option<&str>) {
    let mut candidate = NewAssociation::new(raw, raw.to_uppercase(), format!("{raw} association"));
    if let Some(parent) = parent {
        candidate = candidate.with_parent(parent);
    }
    engine.create_association(candidate).expect("create");
}

fn path_of(engine: &HierarchyEngine, raw: &str) -> (u32, Vec<AssociationId>) {
    let record = engine.association(&id(raw)).unwrap().expect("present");
    (record.level, record.hierarchy)
}

/// root -> b -> c -> d, plus a second root r
fn chain(engine: &HierarchyEngine) {
    create(engine, "root", None);
    create(engine, "b", Some("root"));
    create(engine, "c", Some("b"));
    create(engine, "d", Some("c"));
    create(engine, "r", None);
}

#[test]
fn create_derives_path_from_parent() {
    let (_, engine) = setup();
    chain(&engine);
    assert_eq!(path_of(&engine, "root"), (0, vec![]));
    assert_eq!(path_of(&engine, "d"), (3, ids(&["root", "b", "c"])));
    let d = engine.association(&id("d")).unwrap().unwrap();
    assert_eq!(d.status, Status::Active);
    assert_eq!(d.settings.fees.currency, "EUR");
    assert_eq!(d.created_at, d.updated_at);
}

#[test]
fn duplicate_id_or_code_is_rejected() {
    let (_, engine) = setup();
    create(&engine, "ha", None);
    let err = engine
        .create_association(NewAssociation::new("ha", "OTHER", "x"))
        .unwrap_err();
    assert!(matches!(
        err,
        HierarchyError::AlreadyExists {
            field: UniqueField::Id,
            ..
        }
    ));
    let err = engine
        .create_association(NewAssociation::new("hb", "HA", "x"))
        .unwrap_err();
    assert!(matches!(
        err,
        HierarchyError::AlreadyExists {
            field: UniqueField::Code,
            ..
        }
    ));
}

#[test]
fn missing_parent_is_rejected() {
    let (store, engine) = setup();
    let err = engine
        .create_association(NewAssociation::new("x", "X", "x").with_parent("ghost"))
        .unwrap_err();
    assert!(matches!(err, HierarchyError::ParentNotFound(p) if p == id("ghost")));
    assert_eq!(store.association_writes(), 0);
}

#[test]
fn reparent_cascades_to_every_depth() {
    let (_, engine) = setup();
    chain(&engine);

    let moved = engine.reparent_association(&id("b"), Some(id("r"))).unwrap();
    assert_eq!(moved.association.hierarchy, ids(&["r"]));
    assert_eq!(moved.cascade.total, 2);
    assert!(moved.cascade.is_complete());

    assert_eq!(path_of(&engine, "b"), (1, ids(&["r"])));
    assert_eq!(path_of(&engine, "c"), (2, ids(&["r", "b"])));
    assert_eq!(path_of(&engine, "d"), (3, ids(&["r", "b", "c"])));
    assert!(engine.descendants(&id("root")).unwrap().is_empty());
}

#[test]
fn promote_to_root_shortens_descendant_paths() {
    let (_, engine) = setup();
    chain(&engine);
    engine.reparent_association(&id("c"), None).unwrap();
    assert_eq!(path_of(&engine, "c"), (0, vec![]));
    assert_eq!(path_of(&engine, "d"), (1, ids(&["c"])));
    let c = engine.association(&id("c")).unwrap().unwrap();
    assert!(c.is_root());
}

#[test]
fn moving_under_a_descendant_is_a_cycle() {
    let (store, engine) = setup();
    chain(&engine);
    let writes = store.association_writes();

    for target in ["b", "c", "d"] {
        let err = engine
            .reparent_association(&id("root"), Some(id(target)))
            .unwrap_err();
        assert!(
            matches!(&err, HierarchyError::CircularReference { id: moved, parent } if moved == &id("root") && parent == &id(target)),
            "unexpected {err:?}"
        );
    }
    assert_eq!(store.association_writes(), writes);
    assert_eq!(path_of(&engine, "d"), (3, ids(&["root", "b", "c"])));
}

#[test]
fn self_parent_never_writes() {
    let (store, engine) = setup();
    chain(&engine);
    let writes = store.association_writes();
    let err = engine
        .reparent_association(&id("c"), Some(id("c")))
        .unwrap_err();
    assert!(matches!(err, HierarchyError::SelfParent(_)));
    assert_eq!(store.association_writes(), writes);
}

#[test]
fn reparent_unknown_or_inactive_target() {
    let (_, engine) = setup();
    chain(&engine);
    let err = engine.reparent_association(&id("nope"), None).unwrap_err();
    assert!(matches!(err, HierarchyError::NotFound(_)));

    create(&engine, "gone", None);
    engine.delete_association(&id("gone")).unwrap();
    let err = engine
        .reparent_association(&id("c"), Some(id("gone")))
        .unwrap_err();
    assert!(matches!(err, HierarchyError::ParentNotFound(_)));
}

#[test]
fn delete_guards_leave_status_untouched() {
    let (store, engine) = setup();
    chain(&engine);

    let err = engine.delete_association(&id("c")).unwrap_err();
    assert_eq!(err.to_string(), "cannot delete c: 1 child associations exist");

    engine.add_club(Club::new("k1", "d", "Club")).unwrap();
    let err = engine.delete_association(&id("d")).unwrap_err();
    assert!(matches!(err, HierarchyError::HasClubs { count: 1, .. }));

    create(&engine, "solo", None);
    store.set_active_references(&id("solo"), 4);
    let err = engine.delete_association(&id("solo")).unwrap_err();
    assert!(matches!(err, HierarchyError::HasActiveReferences { count: 4, .. }));

    for raw in ["c", "d", "solo"] {
        assert_eq!(
            engine.association(&id(raw)).unwrap().unwrap().status,
            Status::Active
        );
    }
}

#[test]
fn delete_is_soft_and_keeps_identifiers_reserved() {
    let (_, engine) = setup();
    chain(&engine);

    assert_eq!(
        engine.delete_association(&id("d")).unwrap(),
        DeleteOutcome::Deactivated
    );
    assert_eq!(
        engine.delete_association(&id("d")).unwrap(),
        DeleteOutcome::AlreadyInactive
    );
    let d = engine.association(&id("d")).unwrap().unwrap();
    assert_eq!(d.status, Status::Inactive);
    assert_eq!(d.hierarchy, ids(&["root", "b", "c"]));

    // a soft-deleted child still references its parent
    let err = engine.delete_association(&id("c")).unwrap_err();
    assert!(matches!(err, HierarchyError::HasChildren { count: 1, .. }));
    assert_eq!(
        engine.association(&id("c")).unwrap().unwrap().status,
        Status::Active
    );

    let err = engine
        .create_association(NewAssociation::new("d", "NEW", "again"))
        .unwrap_err();
    assert!(matches!(err, HierarchyError::AlreadyExists { .. }));
}

#[test]
fn clubs_follow_live_parents() {
    let (_, engine) = setup();
    chain(&engine);
    engine.add_club(Club::new("k", "d", "Club")).unwrap();

    let err = engine.add_club(Club::new("k", "c", "Again")).unwrap_err();
    assert!(matches!(err, HierarchyError::AlreadyExists { .. }));
    let err = engine.add_club(Club::new("", "c", "Nameless")).unwrap_err();
    assert!(matches!(err, HierarchyError::InvalidInput(_)));

    let moved = engine.move_club(&ClubId::new("k"), &id("r")).unwrap();
    assert_eq!(moved.parent_id, id("r"));
    assert!(engine.clubs(&id("d")).unwrap().is_empty());
    assert_eq!(engine.clubs(&id("r")).unwrap().len(), 1);

    engine.delete_association(&id("d")).unwrap();
    let err = engine.move_club(&ClubId::new("k"), &id("d")).unwrap_err();
    assert!(matches!(err, HierarchyError::ParentNotFound(_)));
}

#[test]
fn ancestors_and_children_read_helpers() {
    let (_, engine) = setup();
    chain(&engine);
    let ancestors: Vec<AssociationId> = engine
        .ancestors(&id("d"))
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(ancestors, ids(&["root", "b", "c"]));
    let children: Vec<AssociationId> = engine
        .children(&id("root"))
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(children, ids(&["b"]));
    assert_eq!(engine.descendants(&id("root")).unwrap().len(), 3);
}

#[test]
fn forest_agrees_with_stored_paths() {
    let (_, engine) = setup();
    chain(&engine);
    create(&engine, "e", Some("r"));
    engine.add_club(Club::new("k1", "e", "Club")).unwrap();
    engine.reparent_association(&id("b"), Some(id("e"))).unwrap();

    let forest = engine.build_forest().unwrap();
    assert_eq!(forest.root_count(), 2);
    assert_eq!(forest.node_count(), 6);
    assert_eq!(forest.leaf_count(), 1);
    for raw in ["root", "b", "c", "d", "r", "e"] {
        let stored = engine.association(&id(raw)).unwrap().unwrap();
        assert_eq!(forest.ancestors_of(&id(raw)).unwrap(), stored.hierarchy);
    }
}

#[test]
fn concurrent_moves_in_separate_trees_stay_consistent() {
    let (store, engine) = setup();
    for tree in 0..4 {
        let root = format!("t{tree}");
        create(&engine, &root, None);
        create(&engine, &format!("{root}a"), Some(&root));
        create(&engine, &format!("{root}b"), Some(&root));
        create(&engine, &format!("{root}a1"), Some(&format!("{root}a")));
    }
    let engine = Arc::new(engine);

    thread::scope(|scope| {
        for tree in 0..4 {
            let engine = Arc::clone(&engine);
            scope.spawn(move || {
                let root = format!("t{tree}");
                for round in 0..20 {
                    let (moving, target) = if round % 2 == 0 {
                        (format!("{root}a"), format!("{root}b"))
                    } else {
                        (format!("{root}a"), root.clone())
                    };
                    engine
                        .reparent_association(&id(&moving), Some(id(&target)))
                        .expect("move");
                }
            });
        }
    });

    for record in store
        .find_associations(&lineage::storage::AssociationFilter::all())
        .unwrap()
    {
        assert_eq!(record.level as usize, record.hierarchy.len());
        if let Some(parent) = &record.parent_id {
            let parent = store.find_association(parent).unwrap().unwrap();
            let mut expected = parent.hierarchy.clone();
            expected.push(parent.id.clone());
            assert_eq!(record.hierarchy, expected, "{}", record.id);
        }
    }
}

fn assert_paths_follow_parents(store: &MemoryStore) {
    for record in store
        .find_associations(&lineage::storage::AssociationFilter::all())
        .unwrap()
    {
        assert_eq!(record.level as usize, record.hierarchy.len(), "{}", record.id);
        let expected = match &record.parent_id {
            Some(parent) => {
                let parent = store.find_association(parent).unwrap().unwrap();
                let mut expected = parent.hierarchy.clone();
                expected.push(parent.id.clone());
                expected
            }
            None => Vec::new(),
        };
        assert_eq!(record.hierarchy, expected, "{}", record.id);
    }
}

#[test]
fn contended_moves_within_and_across_trees_stay_consistent() {
    let (store, engine) = setup();
    // x -> x1 -> x2 -> x3, y -> y1
    create(&engine, "x", None);
    create(&engine, "x1", Some("x"));
    create(&engine, "x2", Some("x1"));
    create(&engine, "x3", Some("x2"));
    create(&engine, "y", None);
    create(&engine, "y1", Some("y"));
    let engine = Arc::new(engine);

    // no schedule of these moves can form a cycle, so every call must succeed
    let workers: [(&str, [Option<&str>; 2]); 4] = [
        ("x2", [Some("y1"), Some("x1")]),
        ("y1", [Some("x1"), Some("y")]),
        ("x3", [Some("x1"), Some("x2")]),
        ("x1", [None, Some("x")]),
    ];
    thread::scope(|scope| {
        for (moving, targets) in workers {
            let engine = Arc::clone(&engine);
            scope.spawn(move || {
                for round in 0..40 {
                    let target = targets[round % 2].map(id);
                    engine
                        .reparent_association(&id(moving), target)
                        .expect("move");
                }
            });
        }
    });

    assert_paths_follow_parents(&store);
    // every worker ends on its second target
    assert_eq!(path_of(&engine, "x3"), (3, ids(&["x", "x1", "x2"])));
    assert_eq!(path_of(&engine, "y1"), (1, ids(&["y"])));
    let report = lineage::admin::verify(store.as_ref(), lineage::admin::VerifyLevel::Full).unwrap();
    assert!(report.success, "{:?}", report.findings);
}
