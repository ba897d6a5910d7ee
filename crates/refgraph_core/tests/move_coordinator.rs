mod common;

use common::{
    dump, folder, load_folder, load_subject, put_folder, put_shortcut, put_subject,
    shared_folder, shared_subject, shortcut, shortcuts_of, subject, viewer, FlakyStore, ALICE,
    BOB,
};
use refgraph_core::{
    AppliedMove, ConflictChoice, ConflictKind, ContentStoreExt, Destination, DraggedRef,
    ItemKind, MemoryStore, MoveConflict, MoveError, MoveOutcome, MoveRejection,
    ReferenceGraphEngine, SharingChange, TargetRef,
};

fn moved(outcome: MoveOutcome) -> AppliedMove {
    match outcome {
        MoveOutcome::Moved(applied) => applied,
        other => panic!("expected a committed move, got {other:?}"),
    }
}

fn mismatch(outcome: MoveOutcome) -> MoveConflict {
    match outcome {
        MoveOutcome::SharedMismatch(conflict) => conflict,
        other => panic!("expected shared-mismatch, got {other:?}"),
    }
}

fn unshare_on_exit(outcome: MoveOutcome) -> MoveConflict {
    match outcome {
        MoveOutcome::UnshareOnExit(conflict) => conflict,
        other => panic!("expected unshare-on-exit, got {other:?}"),
    }
}

fn subject_ref(id: &str, parent: Option<&str>) -> DraggedRef {
    DraggedRef::node(id, ItemKind::Subject, parent.map(str::to_string))
}

fn into_folder(id: &str) -> Destination {
    Destination::Folder(id.to_string())
}

#[test]
fn share_mismatch_waits_for_choice_then_merges() {
    let store = MemoryStore::new();
    put_subject(&store, &subject("S", ALICE, None));
    put_folder(&store, &shared_folder("D", ALICE, None, &["u1", "u2"]));
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));
    let before = dump(&store);

    let conflict = mismatch(engine.move_item(&subject_ref("S", None), &into_folder("D")).unwrap());
    assert_eq!(dump(&store), before);
    assert_eq!(
        conflict.choices(),
        [ConflictChoice::AlignToDestination, ConflictChoice::Merge]
    );
    assert!(conflict.source_uids.is_empty());
    assert_eq!(conflict.destination_uids, vec!["u1", "u2"]);

    let applied = moved(engine.resolve_move_conflict(&conflict, ConflictChoice::Merge).unwrap());
    assert_eq!(applied.sharing, SharingChange::Merged);
    assert_eq!(applied.to.as_deref(), Some("D"));

    let destination = load_folder(&store, "D");
    assert!(destination.sharing.is_shared);
    assert_eq!(destination.sharing.shared_with_uids, vec!["u1", "u2"]);
    let moved_subject = load_subject(&store, "S");
    assert_eq!(moved_subject.folder_id.as_deref(), Some("D"));
    assert!(moved_subject.sharing.is_shared);
    assert_eq!(moved_subject.sharing.uid_set(), vec!["u1", "u2"]);

    let after = dump(&store);
    assert_eq!(
        engine.move_item(&subject_ref("S", None), &into_folder("D")).unwrap(),
        MoveOutcome::Unchanged
    );
    assert_eq!(dump(&store), after);
}

#[test]
fn merge_unions_source_shares_into_destination() {
    let store = MemoryStore::new();
    put_folder(&store, &shared_folder("D", ALICE, None, &["u1"]));
    let mut stale = subject("S", ALICE, None);
    stale.sharing.shared_with_uids = vec!["old".into()];
    put_subject(&store, &stale);
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));

    let conflict = mismatch(engine.move_item(&subject_ref("S", None), &into_folder("D")).unwrap());
    engine
        .resolve_move_conflict(&conflict, ConflictChoice::Merge)
        .unwrap();

    // An unshared item carries no grants out, so stale lists never leak.
    assert_eq!(load_folder(&store, "D").sharing.uid_set(), vec!["u1"]);
    assert_eq!(load_subject(&store, "S").sharing.uid_set(), vec!["u1"]);
}

#[test]
fn align_takes_destination_shares() {
    let store = MemoryStore::new();
    put_subject(&store, &subject("S", ALICE, None));
    put_folder(&store, &shared_folder("D", ALICE, None, &["u1", "u2"]));
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));

    let conflict = mismatch(engine.move_item(&subject_ref("S", None), &into_folder("D")).unwrap());
    let applied = moved(
        engine
            .resolve_move_conflict(&conflict, ConflictChoice::AlignToDestination)
            .unwrap(),
    );

    assert_eq!(applied.sharing, SharingChange::AlignedToDestination);
    assert_eq!(
        load_subject(&store, "S").sharing,
        load_folder(&store, "D").sharing
    );
}

#[test]
fn cancel_and_foreign_choices_leave_store_untouched() {
    let store = MemoryStore::new();
    put_subject(&store, &subject("S", ALICE, None));
    put_folder(&store, &shared_folder("D", ALICE, None, &["u1"]));
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));
    let before = dump(&store);

    let conflict = mismatch(engine.move_item(&subject_ref("S", None), &into_folder("D")).unwrap());
    assert_eq!(
        engine
            .resolve_move_conflict(&conflict, ConflictChoice::Cancel)
            .unwrap(),
        MoveOutcome::Cancelled
    );
    match engine.resolve_move_conflict(&conflict, ConflictChoice::MoveAndUnshare) {
        Err(MoveError::InvalidChoice { conflict, choice }) => {
            assert_eq!(conflict, ConflictKind::SharedMismatch);
            assert_eq!(choice, ConflictChoice::MoveAndUnshare);
        }
        other => panic!("expected invalid choice, got {other:?}"),
    }
    assert_eq!(dump(&store), before);
}

#[test]
fn leaving_shared_folder_with_unshare_clears_grants_and_legacy_membership() {
    let store = MemoryStore::new();
    let mut parent = shared_folder("P", ALICE, None, &["u1"]);
    parent.subject_ids = vec!["S".into(), "T".into()];
    put_folder(&store, &parent);
    put_subject(&store, &shared_subject("S", ALICE, Some("P"), &["u1"]));
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));

    let conflict =
        unshare_on_exit(engine.move_item(&subject_ref("S", Some("P")), &Destination::Root).unwrap());
    assert_eq!(
        conflict.choices(),
        [
            ConflictChoice::MoveAndUnshare,
            ConflictChoice::MoveAndPreserveSharing
        ]
    );
    assert_eq!(conflict.source_folder_id.as_deref(), Some("P"));

    let applied = moved(
        engine
            .resolve_move_conflict(&conflict, ConflictChoice::MoveAndUnshare)
            .unwrap(),
    );
    assert_eq!(applied.sharing, SharingChange::Unshared);
    assert!(applied.pending.is_empty());

    let moved_subject = load_subject(&store, "S");
    assert_eq!(moved_subject.folder_id, None);
    assert!(!moved_subject.sharing.is_shared);
    assert!(moved_subject.sharing.uid_set().is_empty());

    let parent = load_folder(&store, "P");
    assert_eq!(parent.subject_ids, vec!["T"]);
    assert!(parent.sharing.is_shared);
}

#[test]
fn preserve_keeps_grants_inherited_from_source_folder() {
    let store = MemoryStore::new();
    put_folder(&store, &shared_folder("P", ALICE, None, &["u1"]));
    put_folder(&store, &folder("plain", ALICE, None));
    put_subject(&store, &subject("S", ALICE, Some("P")));
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));

    let conflict =
        unshare_on_exit(engine.move_item(&subject_ref("S", Some("P")), &into_folder("plain")).unwrap());
    let applied = moved(
        engine
            .resolve_move_conflict(&conflict, ConflictChoice::MoveAndPreserveSharing)
            .unwrap(),
    );

    assert_eq!(applied.sharing, SharingChange::Preserved);
    let moved_subject = load_subject(&store, "S");
    assert_eq!(moved_subject.folder_id.as_deref(), Some("plain"));
    assert!(moved_subject.sharing.is_shared);
    assert_eq!(moved_subject.sharing.uid_set(), vec!["u1"]);
}

#[test]
fn folder_unshare_cascade_reports_pending_and_finishes_on_retry() {
    let store = FlakyStore::new();
    put_folder(&store, &shared_folder("team", ALICE, None, &["u1"]));
    put_folder(&store, &shared_folder("F", ALICE, Some("team"), &["u1"]));
    put_folder(&store, &folder("plain", ALICE, None));
    put_subject(&store, &shared_subject("a", ALICE, Some("F"), &["u1"]));
    put_subject(&store, &shared_subject("b", ALICE, Some("F"), &["u1"]));
    put_subject(&store, &subject("c", ALICE, Some("F")));
    store.fail_writes_to("b");
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));

    let dragged = DraggedRef::node("F", ItemKind::Folder, Some("team".into()));
    let conflict = unshare_on_exit(engine.move_item(&dragged, &into_folder("plain")).unwrap());
    let applied = moved(
        engine
            .resolve_move_conflict(&conflict, ConflictChoice::MoveAndUnshare)
            .unwrap(),
    );

    assert_eq!(applied.pending, vec!["b"]);
    let folder_after = load_folder(&store, "F");
    assert_eq!(folder_after.parent_id.as_deref(), Some("plain"));
    assert!(!folder_after.sharing.is_shared);
    assert!(!load_subject(&store, "a").sharing.is_shared);
    assert!(load_subject(&store, "b").sharing.is_shared);

    store.heal();
    assert_eq!(
        engine
            .resolve_move_conflict(&conflict, ConflictChoice::MoveAndUnshare)
            .unwrap(),
        MoveOutcome::Unchanged
    );
    assert!(!load_subject(&store, "b").sharing.is_shared);
    assert!(!load_subject(&store, "c").sharing.is_shared);
}

#[test]
fn cascade_can_be_disabled() {
    let store = MemoryStore::new();
    put_folder(&store, &shared_folder("team", ALICE, None, &["u1"]));
    put_folder(&store, &shared_folder("F", ALICE, Some("team"), &["u1"]));
    put_subject(&store, &shared_subject("a", ALICE, Some("F"), &["u1"]));
    let config = refgraph_core::EngineConfig::from_json_str(
        r#"{"cascade_unshare_to_subjects": false}"#,
    )
    .unwrap();
    let engine = ReferenceGraphEngine::with_config(&store, viewer(ALICE), config).unwrap();
    put_folder(&store, &folder("plain", ALICE, None));

    let dragged = DraggedRef::node("F", ItemKind::Folder, Some("team".into()));
    let conflict = unshare_on_exit(engine.move_item(&dragged, &into_folder("plain")).unwrap());
    engine
        .resolve_move_conflict(&conflict, ConflictChoice::MoveAndUnshare)
        .unwrap();

    assert!(!load_folder(&store, "F").sharing.is_shared);
    assert!(load_subject(&store, "a").sharing.is_shared);
}

#[test]
fn own_shared_subject_between_unshared_folders_moves_directly() {
    let store = MemoryStore::new();
    put_folder(&store, &folder("A", ALICE, None));
    put_folder(&store, &folder("B", ALICE, None));
    put_subject(&store, &shared_subject("S", ALICE, Some("A"), &["u1"]));
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));

    let applied = moved(engine.move_item(&subject_ref("S", Some("A")), &into_folder("B")).unwrap());

    assert_eq!(applied.sharing, SharingChange::None);
    let moved_subject = load_subject(&store, "S");
    assert_eq!(moved_subject.folder_id.as_deref(), Some("B"));
    assert!(moved_subject.sharing.is_shared);
    assert_eq!(moved_subject.sharing.uid_set(), vec!["u1"]);
}

#[test]
fn moves_inside_one_shared_subtree_never_prompt_to_unshare() {
    let store = MemoryStore::new();
    put_folder(&store, &shared_folder("team", ALICE, None, &["u1"]));
    put_folder(&store, &folder("notes", ALICE, Some("team")));
    put_folder(&store, &folder("drafts", ALICE, Some("team")));
    put_subject(&store, &subject("S", ALICE, Some("notes")));
    put_folder(&store, &folder("mine", ALICE, None));
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));

    let applied = moved(
        engine
            .move_item(&subject_ref("S", Some("notes")), &into_folder("drafts"))
            .unwrap(),
    );
    assert_eq!(applied.sharing, SharingChange::None);

    // Leaving the subtree from a nested folder still prompts.
    let conflict = unshare_on_exit(
        engine
            .move_item(&subject_ref("S", Some("drafts")), &into_folder("mine"))
            .unwrap(),
    );
    assert_eq!(conflict.source_uids, vec!["u1"]);
}

#[test]
fn shared_item_in_unshared_folder_can_still_mismatch() {
    let store = MemoryStore::new();
    put_folder(&store, &folder("A", ALICE, None));
    put_folder(&store, &shared_folder("D", ALICE, None, &["u2"]));
    put_subject(&store, &shared_subject("S", ALICE, Some("A"), &["u1"]));
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));

    let conflict = mismatch(engine.move_item(&subject_ref("S", Some("A")), &into_folder("D")).unwrap());
    assert_eq!(conflict.source_uids, vec!["u1"]);
    assert_eq!(conflict.destination_uids, vec!["u2"]);

    engine
        .resolve_move_conflict(&conflict, ConflictChoice::Merge)
        .unwrap();
    assert_eq!(load_folder(&store, "D").sharing.uid_set(), vec!["u1", "u2"]);
    assert_eq!(load_subject(&store, "S").sharing.uid_set(), vec!["u1", "u2"]);
}

#[test]
fn destination_superset_is_adopted_without_prompt() {
    let store = MemoryStore::new();
    put_folder(&store, &shared_folder("P", ALICE, None, &["u1"]));
    put_folder(&store, &shared_folder("D", ALICE, None, &["u1", "u2"]));
    put_subject(&store, &subject("S", ALICE, Some("P")));
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));

    let applied = moved(engine.move_item(&subject_ref("S", Some("P")), &into_folder("D")).unwrap());

    assert_eq!(applied.sharing, SharingChange::AdoptedDestination);
    let moved_subject = load_subject(&store, "S");
    assert_eq!(moved_subject.folder_id.as_deref(), Some("D"));
    assert_eq!(moved_subject.sharing, load_folder(&store, "D").sharing);
}

#[test]
fn plain_move_is_direct_and_idempotent() {
    let store = MemoryStore::new();
    put_folder(&store, &folder("one", ALICE, None));
    put_folder(&store, &folder("two", ALICE, None));
    put_subject(&store, &subject("S", ALICE, Some("one")));
    put_subject(&store, &subject("near", ALICE, Some("two")));
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));

    // Dropping onto a subject lands in that subject's folder.
    let onto = Destination::Onto(TargetRef {
        id: "near".into(),
        kind: ItemKind::Subject,
        parent_id: Some("two".into()),
    });
    let applied = moved(engine.move_item(&subject_ref("S", Some("one")), &onto).unwrap());
    assert_eq!(applied.sharing, SharingChange::None);
    assert_eq!(applied.from.as_deref(), Some("one"));
    assert_eq!(applied.to.as_deref(), Some("two"));

    let once = dump(&store);
    assert_eq!(
        engine.move_item(&subject_ref("S", Some("one")), &onto).unwrap(),
        MoveOutcome::Unchanged
    );
    assert_eq!(dump(&store), once);
}

#[test]
fn missing_destination_or_item_is_not_found() {
    let store = MemoryStore::new();
    put_subject(&store, &subject("S", ALICE, None));
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));

    assert_eq!(
        engine.move_item(&subject_ref("S", None), &into_folder("nowhere")).unwrap(),
        MoveOutcome::Rejected(MoveRejection::NotFound)
    );
    assert_eq!(
        engine.move_item(&subject_ref("ghost", None), &Destination::Root).unwrap(),
        MoveOutcome::Rejected(MoveRejection::NotFound)
    );
}

#[test]
fn read_only_share_cannot_move_content() {
    let store = MemoryStore::new();
    let mut source = folder("bf", BOB, None);
    source.sharing.is_shared = true;
    source.sharing.viewer_uids = vec![ALICE.into()];
    put_folder(&store, &source);
    let mut other = folder("bf2", BOB, None);
    other.sharing.is_shared = true;
    other.sharing.viewer_uids = vec![ALICE.into()];
    put_folder(&store, &other);
    put_subject(&store, &subject("doc", BOB, Some("bf")));
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));
    let before = dump(&store);

    assert_eq!(
        engine.move_item(&subject_ref("doc", Some("bf")), &into_folder("bf2")).unwrap(),
        MoveOutcome::Rejected(MoveRejection::PermissionDenied)
    );
    assert_eq!(dump(&store), before);
}

#[test]
fn editor_of_shared_ancestor_may_reorganize_inside_it() {
    let store = MemoryStore::new();
    let mut team = folder("team", BOB, None);
    team.sharing.is_shared = true;
    team.sharing.editor_uids = vec![ALICE.into()];
    put_folder(&store, &team);
    put_folder(&store, &folder("sub", BOB, Some("team")));
    put_folder(&store, &folder("sub2", BOB, Some("team")));
    put_subject(&store, &subject("doc", BOB, Some("sub")));
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));

    let applied = moved(engine.move_item(&subject_ref("doc", Some("sub")), &into_folder("sub2")).unwrap());
    assert_eq!(applied.sharing, SharingChange::None);
    assert_eq!(load_subject(&store, "doc").folder_id.as_deref(), Some("sub2"));
    assert_eq!(load_subject(&store, "doc").owner_id, BOB);
}

#[test]
fn foreign_item_dropped_into_own_tree_becomes_a_shortcut() {
    let store = MemoryStore::new();
    put_folder(&store, &folder("mine", ALICE, None));
    put_subject(&store, &shared_subject("x", BOB, None, &[ALICE]));
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));

    let first = engine.move_item(&subject_ref("x", None), &into_folder("mine")).unwrap();
    let MoveOutcome::ShortcutPlaced { shortcut_id } = first else {
        panic!("expected a placed shortcut, got {first:?}");
    };
    let again = engine.move_item(&subject_ref("x", None), &into_folder("mine")).unwrap();
    assert_eq!(again, MoveOutcome::ShortcutPlaced { shortcut_id: shortcut_id.clone() });

    let shortcuts = shortcuts_of(&store, ALICE);
    assert_eq!(shortcuts.len(), 1);
    assert_eq!(shortcuts[0].id, shortcut_id);
    assert_eq!(shortcuts[0].parent_id.as_deref(), Some("mine"));
    let target = load_subject(&store, "x");
    assert_eq!(target.owner_id, BOB);
    assert_eq!(target.folder_id, None);
}

#[test]
fn shortcut_moves_only_touch_the_shortcut_record() {
    let store = MemoryStore::new();
    put_folder(&store, &folder("mine", ALICE, None));
    put_subject(&store, &shared_subject("x", BOB, None, &[ALICE]));
    put_shortcut(&store, &shortcut("s1", ALICE, "x", ItemKind::Subject, None, 1));
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));
    let target_before = load_subject(&store, "x");

    let dragged = DraggedRef::shortcut("s1", "x", ItemKind::Subject, None);
    let applied = moved(engine.move_item(&dragged, &into_folder("mine")).unwrap());
    assert_eq!(applied.id, "s1");
    assert_eq!(
        store.get_shortcut("s1").unwrap().unwrap().parent_id.as_deref(),
        Some("mine")
    );
    assert_eq!(load_subject(&store, "x"), target_before);

    assert_eq!(
        engine.move_item(&dragged, &into_folder("mine")).unwrap(),
        MoveOutcome::Unchanged
    );
    let foreign = DraggedRef::shortcut("s1", "x", ItemKind::Subject, Some("mine".into()));
    let bob_engine = ReferenceGraphEngine::new(&store, viewer(BOB));
    assert_eq!(
        bob_engine.move_item(&foreign, &Destination::Root).unwrap(),
        MoveOutcome::Rejected(MoveRejection::PermissionDenied)
    );
}

#[test]
fn shortcut_into_shared_folder_needs_target_owner() {
    let store = MemoryStore::new();
    put_folder(&store, &shared_folder("ash", ALICE, None, &["u1"]));
    put_subject(&store, &shared_subject("x", BOB, None, &[ALICE]));
    put_shortcut(&store, &shortcut("s1", ALICE, "x", ItemKind::Subject, None, 1));
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));
    let before = dump(&store);

    let dragged = DraggedRef::shortcut("s1", "x", ItemKind::Subject, None);
    match engine.move_item(&dragged, &into_folder("ash")).unwrap() {
        MoveOutcome::RequestOwnerMove(request) => {
            assert_eq!(request.shortcut_id, "s1");
            assert_eq!(request.target_owner_id.as_deref(), Some(BOB));
            assert_eq!(request.destination_folder_id, "ash");
        }
        other => panic!("expected owner move request, got {other:?}"),
    }
    assert_eq!(dump(&store), before);
}

#[test]
fn folder_shortcut_cannot_enter_its_own_target() {
    let store = MemoryStore::new();
    let mut top = folder("bA", BOB, None);
    top.sharing.is_shared = true;
    top.sharing.editor_uids = vec![ALICE.into()];
    put_folder(&store, &top);
    put_folder(&store, &folder("bB", BOB, Some("bA")));
    put_shortcut(&store, &shortcut("sf", ALICE, "bA", ItemKind::Folder, None, 1));
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));

    let dragged = DraggedRef::shortcut("sf", "bA", ItemKind::Folder, None);
    assert_eq!(
        engine.move_item(&dragged, &into_folder("bB")).unwrap(),
        MoveOutcome::Rejected(MoveRejection::StructuralViolation)
    );
    assert_eq!(store.get_shortcut("sf").unwrap().unwrap().parent_id, None);
}

#[test]
fn store_failure_surfaces_without_partial_state() {
    let store = FlakyStore::new();
    put_folder(&store, &folder("one", ALICE, None));
    put_subject(&store, &subject("S", ALICE, None));
    store.fail_writes_to("S");
    let engine = ReferenceGraphEngine::new(&store, viewer(ALICE));
    let before = dump(&store);

    assert!(matches!(
        engine.move_item(&subject_ref("S", None), &into_folder("one")),
        Err(MoveError::Store(_))
    ));
    assert_eq!(dump(&store), before);

    store.heal();
    store.fail_reads_of("one");
    assert!(matches!(
        engine.move_item(&subject_ref("S", None), &into_folder("one")),
        Err(MoveError::Store(_))
    ));
    assert_eq!(dump(&store), before);
}
