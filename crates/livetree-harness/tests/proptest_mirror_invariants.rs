//! Property-based invariant tests for the mirror under random scene
//! mutation.
//!
//! After every pass, for any sequence of creations, destructions,
//! reparentings, reorders, flag changes and root replacements:
//!
//! 1. Parent and child links in the store agree, with no duplicates.
//! 2. Every node's recorded children equal its live children, sorted.
//! 3. A second pass with no mutation in between emits nothing.
//! 4. Every relocated handle is removed before it is inserted again.
//! 5. A consumer applying the notifications in order shows the same tree
//!    as the model.
//!
//! The incremental path is held to 1 and 5 after each batch of
//! notifications, and to 2 once a closing pass has run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use livetree_core::{EditOperation, Handle, MirrorStore, NodeFlags, TreeSource, TypeTag};
use livetree_harness::{SceneGraph, SceneOp, SharedReplica, SharedScene, populate};
use livetree_runtime::{Mirror, MirrorConfig, PassReport};
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────────

fn op_strategy() -> impl Strategy<Value = SceneOp> {
    prop_oneof![
        4 => (any::<usize>(), 0u32..8).prop_map(|(parent, tag)| SceneOp::Create {
            parent,
            tag: TypeTag(tag),
        }),
        2 => any::<usize>().prop_map(|target| SceneOp::Destroy { target }),
        3 => (any::<usize>(), any::<usize>())
            .prop_map(|(target, parent)| SceneOp::Reparent { target, parent }),
        1 => any::<usize>().prop_map(|target| SceneOp::Raise { target }),
        1 => (any::<usize>(), any::<u8>()).prop_map(|(target, bits)| SceneOp::SetFlags {
            target,
            flags: NodeFlags::from_bits_truncate(bits),
        }),
        1 => Just(SceneOp::ReplaceRoot),
    ]
}

fn frames_strategy() -> impl Strategy<Value = Vec<Vec<SceneOp>>> {
    proptest::collection::vec(proptest::collection::vec(op_strategy(), 1..12), 1..8)
}

fn setup(breadth: usize, depth: usize) -> (Arc<SharedScene>, Mirror<SharedScene>, SharedReplica) {
    let mut graph = SceneGraph::new();
    populate(&mut graph, breadth, depth);
    graph.take_notifications();
    let scene = Arc::new(SharedScene::new(graph));
    let mut mirror = Mirror::new(
        Arc::clone(&scene),
        MirrorConfig::default().with_strict_consistency(true),
    );
    let replica = SharedReplica::new();
    mirror.observe(replica.observer());
    mirror.reconcile();
    (scene, mirror, replica)
}

fn tracked(store: &MirrorStore) -> HashSet<Handle> {
    match store.root() {
        Some(root) => std::iter::once(root).chain(store.descendants(root)).collect(),
        None => HashSet::new(),
    }
}

fn check_complete(scene: &SharedScene, store: &MirrorStore) -> Result<(), TestCaseError> {
    let snapshot = scene.snapshot();
    prop_assert_eq!(store.root(), snapshot.root());
    prop_assert_eq!(store.len(), snapshot.len());
    for h in snapshot.handles() {
        prop_assert_eq!(store.children(h), snapshot.children(h), "children of {}", h);
    }
    Ok(())
}

fn check_relocations(report: &PassReport, before: &HashSet<Handle>) -> Result<(), TestCaseError> {
    let mut removed_rows = 0usize;
    for op in report.script.ops() {
        match op {
            EditOperation::Remove { .. } => removed_rows += 1,
            EditOperation::Insert { handles, .. } => {
                if handles.iter().any(|h| before.contains(h)) {
                    prop_assert!(removed_rows > 0, "tracked handle inserted with no prior removal");
                }
            }
        }
    }
    Ok(())
}

fn check_replica(mirror: &Mirror<SharedScene>, replica: &SharedReplica) -> Result<(), TestCaseError> {
    let replica = replica.lock();
    prop_assert!(
        replica.mismatches().is_empty(),
        "replica mismatches: {:?}",
        replica.mismatches()
    );
    prop_assert!(replica.matches(&mirror.model()), "replica diverged from model");
    Ok(())
}

// ═════════════════════════════════════════════════════════════════════════
// Periodic reconciliation
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn reconcile_converges_after_any_mutation(
        breadth in 0usize..4,
        depth in 0usize..3,
        frames in frames_strategy(),
    ) {
        let (scene, mut mirror, replica) = setup(breadth, depth);
        for frame in &frames {
            scene.mutate(|g| {
                for op in frame {
                    op.apply(g);
                }
            });
            let before = tracked(mirror.store());
            let report = mirror.reconcile();

            prop_assert!(mirror.store().check_invariants().is_ok());
            check_complete(&scene, mirror.store())?;
            check_relocations(&report, &before)?;
            check_replica(&mirror, &replica)?;
            prop_assert!(mirror.reconcile().is_noop(), "second pass was not empty");
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Notification-driven point edits
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn notifications_keep_model_consistent(
        breadth in 0usize..4,
        depth in 0usize..3,
        frames in frames_strategy(),
    ) {
        let (scene, mut mirror, replica) = setup(breadth, depth);
        let now = Instant::now();
        for frame in &frames {
            scene.mutate(|g| {
                for op in frame {
                    op.apply(g);
                }
            });
            for notification in scene.take_notifications() {
                mirror.handle(notification.into(), now);
            }
            prop_assert!(mirror.store().check_invariants().is_ok());
            check_replica(&mirror, &replica)?;

            mirror.tick(now);
            mirror.reconcile();
            check_complete(&scene, mirror.store())?;
            check_replica(&mirror, &replica)?;
        }
    }
}
