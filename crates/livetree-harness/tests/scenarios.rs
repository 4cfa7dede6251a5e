//! End-to-end mirroring scenarios against the simulated scene.

use std::sync::Arc;
use std::time::{Duration, Instant};

use livetree_core::{
    AttributeKinds, EditOperation, Handle, MirrorError, ModelEvent, ModelIndex, NodeFlags,
    TreeSource, TypeTag,
};
use livetree_harness::{SceneGraph, SharedReplica, SharedScene};
use livetree_runtime::{
    DELETED_LABEL, Mirror, MirrorConfig, MirrorTask, ModelData, Role, task_channel,
};

struct Fixture {
    scene: Arc<SharedScene>,
    mirror: Mirror<SharedScene>,
    replica: SharedReplica,
    root: Handle,
    a: Handle,
    b: Handle,
    c: Handle,
}

fn config() -> MirrorConfig {
    MirrorConfig::default()
        .with_strict_consistency(true)
        .with_diagnostics(true)
        .with_coalesce_delay(Duration::from_millis(100))
}

/// Root `R` with children `[a, b, c]`, identity order a < b < c, mirrored.
fn fixture() -> Fixture {
    let mut graph = SceneGraph::new();
    let root = graph.create_root("R", TypeTag::ROOT).unwrap();
    let a = graph.create(root, "a", TypeTag::ITEM).unwrap();
    let b = graph.create(root, "b", TypeTag::ITEM).unwrap();
    let c = graph.create(root, "c", TypeTag::ITEM).unwrap();
    graph.take_notifications();
    assert!(a < b && b < c);

    let scene = Arc::new(SharedScene::new(graph));
    let mut mirror = Mirror::new(Arc::clone(&scene), config());
    let replica = SharedReplica::new();
    mirror.observe(replica.observer());
    assert!(mirror.reconcile().reset);
    replica.lock().take_events();

    Fixture {
        scene,
        mirror,
        replica,
        root,
        a,
        b,
        c,
    }
}

impl Fixture {
    fn assert_consistent(&self) {
        self.mirror.store().check_invariants().unwrap();
        let replica = self.replica.lock();
        assert!(replica.mismatches().is_empty(), "{:?}", replica.mismatches());
        assert!(replica.matches(&self.mirror.model()));
    }
}

#[test]
fn scenario_a_external_removal() {
    let mut f = fixture();
    f.scene.mutate(|g| g.destroy(f.b)).unwrap();

    let report = f.mirror.reconcile();
    assert_eq!(report.script.ops(), &[EditOperation::remove(f.root, 1)]);
    assert_eq!(f.mirror.store().children(f.root), &[f.a, f.c]);
    assert_eq!(report.deleted, 1);
    assert!(f.replica.lock().deleted().contains(&f.b));
    f.assert_consistent();
}

#[test]
fn scenario_b_insert_between() {
    let mut f = fixture();
    f.scene.mutate(|g| g.destroy(f.b)).unwrap();
    f.mirror.reconcile();

    // The freed slot comes back with a new generation, so `d` sorts
    // between `a` and `c` without aliasing `b`.
    let d = f.scene.mutate(|g| g.create(f.root, "d", TypeTag::ITEM)).unwrap();
    assert!(f.a < d && d < f.c);
    assert_ne!(d, f.b);

    let report = f.mirror.reconcile();
    assert_eq!(report.script.ops(), &[EditOperation::insert(f.root, 1, d)]);
    assert_eq!(f.mirror.store().children(f.root), &[f.a, d, f.c]);
    f.assert_consistent();
}

#[test]
fn scenario_c_move_is_remove_then_insert() {
    let mut f = fixture();
    f.scene.mutate(|g| g.reparent(f.c, f.a)).unwrap();

    let report = f.mirror.reconcile();
    assert_eq!(
        report.script.ops(),
        &[
            EditOperation::remove(f.root, 2),
            EditOperation::insert(f.a, 0, f.c)
        ]
    );
    assert_eq!(report.relocated, 1);
    assert_eq!(report.deleted, 0);
    assert_eq!(f.mirror.store().parent(f.c), Some(f.a));
    assert!(!f.mirror.store().children(f.root).contains(&f.c));

    let events = f.replica.lock().take_events();
    assert!(!events.iter().any(|e| matches!(e, ModelEvent::NodeDeleted(_))));
    assert!(matches!(events[0], ModelEvent::RowsAboutToBeRemoved { first: 2, .. }));
    f.assert_consistent();
}

#[test]
fn scenario_d_validate_before_reconcile() {
    let mut f = fixture();
    f.scene.mutate(|g| g.destroy(f.b)).unwrap();

    assert!(!f.mirror.validate(f.b));
    assert!(f.mirror.resync_pending());
    assert_eq!(f.mirror.resolve(f.b), Err(MirrorError::StaleHandle(f.b)));

    let outcome = f.mirror.tick(Instant::now());
    let pass = outcome.pass.expect("resync pass");
    assert_eq!(pass.script.ops(), &[EditOperation::remove(f.root, 1)]);
    assert!(!f.mirror.resync_pending());
    assert_eq!(f.mirror.resolve(f.c), Ok(ModelIndex::new(1, f.c)));
    f.assert_consistent();
}

#[test]
fn second_pass_is_empty() {
    let mut f = fixture();
    f.scene.mutate(|g| {
        let x = g.create(f.a, "x", TypeTag::GEOMETRY).unwrap();
        g.create(x, "y", TypeTag::BASIC).unwrap();
        g.reparent(f.b, f.c).unwrap();
        g.raise(f.a).unwrap();
    });
    assert!(!f.mirror.reconcile().is_noop());
    assert!(f.mirror.reconcile().is_noop());
    f.assert_consistent();
}

#[test]
fn paint_order_changes_are_invisible() {
    let mut f = fixture();
    f.scene.mutate(|g| g.raise(f.a)).unwrap();
    assert_eq!(f.scene.children(f.root), vec![f.b, f.c, f.a]);
    assert!(f.mirror.reconcile().is_noop());
}

#[test]
fn new_siblings_arrive_as_one_batch() {
    let mut f = fixture();
    let fresh: Vec<Handle> = f.scene.mutate(|g| {
        (0..5)
            .map(|i| g.create(f.b, format!("k{i}"), TypeTag::ITEM).unwrap())
            .collect()
    });
    let report = f.mirror.reconcile();
    assert_eq!(
        report.script.ops(),
        &[EditOperation::Insert {
            parent: f.b,
            first: 0,
            handles: fresh,
        }]
    );
    assert_eq!(report.inserted, 5);
    f.assert_consistent();
}

#[test]
fn fresh_subtree_is_filled_silently() {
    let mut f = fixture();
    let (x, y) = f.scene.mutate(|g| {
        let x = g.create(f.c, "x", TypeTag::ITEM).unwrap();
        let y = g.create(x, "y", TypeTag::ITEM).unwrap();
        g.create(y, "z", TypeTag::ITEM).unwrap();
        (x, y)
    });
    let report = f.mirror.reconcile();
    assert_eq!(report.script.len(), 1);
    assert_eq!(f.mirror.store().parent(y), Some(x));
    assert_eq!(f.mirror.store().descendants(x).len(), 2);
    f.assert_consistent();
}

#[test]
fn removals_come_before_insertions() {
    let mut f = fixture();
    f.scene.mutate(|g| {
        g.create(f.a, "fresh", TypeTag::ITEM).unwrap();
        g.destroy(f.c).unwrap();
    });
    let report = f.mirror.reconcile();
    let ops = report.script.ops();
    assert_eq!(ops.len(), 2);
    assert!(ops[0].is_remove());
    assert!(!ops[1].is_remove());
    f.assert_consistent();
}

#[test]
fn root_replacement_resets_model() {
    let mut f = fixture();
    let new_root = f.scene.mutate(|g| {
        g.destroy(f.root).unwrap();
        let r = g.create_root("R2", TypeTag::ROOT).unwrap();
        g.create(r, "only", TypeTag::ITEM).unwrap();
        r
    });
    let report = f.mirror.reconcile();
    assert!(report.reset);
    assert_eq!(
        report.recovered,
        vec![MirrorError::RootReplaced {
            previous: Some(f.root),
            current: Some(new_root),
        }]
    );
    assert_eq!(report.deleted, 4);
    assert_eq!(f.mirror.store().len(), 2);
    assert_eq!(f.replica.lock().resets(), 2);
    f.assert_consistent();
}

#[test]
fn vanished_root_leaves_empty_model() {
    let mut f = fixture();
    f.scene.mutate(|g| g.destroy(f.root)).unwrap();
    let report = f.mirror.reconcile();
    assert!(report.reset);
    let model = f.mirror.model();
    assert_eq!(model.row_count(None), 0);
    assert_eq!(model.index(0, 0, None), None);
    drop(model);
    f.assert_consistent();
}

#[test]
fn model_shows_labels_kinds_and_deleted_placeholder() {
    let f = fixture();
    f.scene
        .mutate(|g| g.set_flags(f.a, NodeFlags::INVISIBLE))
        .unwrap();
    f.scene.take_notifications();
    {
        let model = f.mirror.model();
        let a = model.index_for_node(f.a).unwrap();
        assert_eq!(model.data(&a, Role::Display), Some(ModelData::Text("a".into())));
        assert_eq!(
            model.data(&a.sibling_column(1), Role::Display),
            Some(ModelData::Text("Item".into()))
        );
        assert_eq!(
            model.data(&a, Role::ItemFlags),
            Some(ModelData::Flags(NodeFlags::INVISIBLE))
        );
        assert_eq!(model.header_data(1), Some("Type"));
    }

    f.scene.mutate(|g| g.destroy(f.a)).unwrap();
    let model = f.mirror.model();
    let a = model.index_for_node(f.a).unwrap();
    assert_eq!(
        model.data(&a, Role::Display),
        Some(ModelData::Text(f.a.address_string()))
    );
    assert_eq!(
        model.data(&a.sibling_column(1), Role::Display),
        Some(ModelData::Text(DELETED_LABEL.into()))
    );
    assert_eq!(model.data(&a, Role::Kind), None);
}

#[test]
fn attribute_changes_flush_once_per_window() {
    let mut f = fixture();
    let (sender, queue) = task_channel();
    f.scene.mutate(|g| {
        g.set_flags(f.a, NodeFlags::HAS_FOCUS).unwrap();
        g.set_flags(f.a, NodeFlags::HAS_FOCUS | NodeFlags::ZERO_SIZE)
            .unwrap();
        g.set_label(f.a, "a!").unwrap();
        g.set_flags(f.c, NodeFlags::OUT_OF_VIEW).unwrap();
    });
    for notification in f.scene.take_notifications() {
        sender.post(notification.into()).unwrap();
    }
    // Removed before the flush, so never reported.
    f.scene.mutate(|g| g.destroy(f.c)).unwrap();

    let t0 = Instant::now();
    f.mirror.drain(&queue, t0);
    f.mirror.reconcile();
    assert_eq!(f.mirror.tick(t0 + Duration::from_millis(50)).flushed, 0);
    assert_eq!(f.mirror.tick(t0 + Duration::from_millis(100)).flushed, 1);

    let events = f.replica.lock().take_events();
    let changes: Vec<&ModelEvent> = events
        .iter()
        .filter(|e| matches!(e, ModelEvent::DataChanged { .. }))
        .collect();
    assert_eq!(
        changes,
        vec![&ModelEvent::DataChanged {
            index: ModelIndex::new(0, f.a),
            last_column: 1,
            kinds: AttributeKinds::FOCUS | AttributeKinds::SIZE | AttributeKinds::LABEL,
        }]
    );
}

#[test]
fn incremental_point_edits() {
    let mut f = fixture();
    let (x, y) = f.scene.mutate(|g| {
        let x = g.create(f.a, "x", TypeTag::ITEM).unwrap();
        let y = g.create(x, "y", TypeTag::ITEM).unwrap();
        (x, y)
    });
    f.scene.take_notifications();

    // Only the deepest node is announced: its missing ancestor comes first.
    let now = Instant::now();
    let report = f.mirror.handle(MirrorTask::EnteredTree(y), now);
    assert_eq!(report.script.ops(), &[EditOperation::insert(f.a, 0, x)]);
    assert_eq!(f.mirror.store().parent(y), Some(x));

    // A repeated addition is ignored.
    assert!(f.mirror.handle(MirrorTask::EnteredTree(x), now).is_noop());

    f.scene.mutate(|g| g.reparent(x, f.c)).unwrap();
    let report = f.mirror.handle(MirrorTask::Reparented(x), now);
    assert_eq!(
        report.script.ops(),
        &[EditOperation::remove(f.a, 0), EditOperation::insert(f.c, 0, x)]
    );

    f.scene.mutate(|g| g.destroy(x)).unwrap();
    let report = f.mirror.handle(MirrorTask::LeftTree(x), now);
    assert_eq!(report.script.ops(), &[EditOperation::remove(f.c, 0)]);
    assert_eq!(report.deleted, 2);

    // Removing something never tracked is ignored.
    assert!(f.mirror.handle(MirrorTask::LeftTree(y), now).is_noop());
    assert_eq!(f.mirror.passes(), 1);
    assert!(f.mirror.reconcile().is_noop());
    f.assert_consistent();
}

#[test]
fn notifier_feeds_the_incremental_path() {
    let (sender, queue) = task_channel();
    let mut graph = SceneGraph::new();
    let root = graph.create_root("R", TypeTag::ROOT).unwrap();
    graph.take_notifications();
    let scene = Arc::new(SharedScene::new(graph).with_notifier(sender));
    let mut mirror = Mirror::new(Arc::clone(&scene), config());
    let replica = SharedReplica::new();
    mirror.observe(replica.observer());

    let child = scene.mutate(|g| g.create(root, "child", TypeTag::ITEM)).unwrap();
    // The mirror starts empty: the first addition adopts the root.
    mirror.handle(MirrorTask::EnteredTree(root), Instant::now());
    mirror.drain(&queue, Instant::now());
    assert_eq!(mirror.store().children(root), &[child]);
    assert_eq!(mirror.passes(), 0);
    assert!(mirror.incremental().applied() >= 1);

    scene.cycle_completed().unwrap();
    let report = mirror.drain(&queue, Instant::now());
    assert!(report.is_noop());
    assert_eq!(mirror.passes(), 1);
    assert!(replica.lock().matches(&mirror.model()));
}
