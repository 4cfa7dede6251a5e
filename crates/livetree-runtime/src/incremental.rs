#![forbid(unsafe_code)]

//! Point edits driven by structural notifications.
//!
//! Trees that report `entered`, `left` and `reparented` events directly do
//! not need periodic re-walks; each notification becomes a single insert or
//! remove, applied immediately. A reparent is a removal followed by a fresh
//! insertion, never a move.
//!
//! Notifications may arrive late or out of order relative to the source's
//! current state, so every handler re-reads the source and ignores events
//! that no longer apply: double additions, additions of nodes that are
//! already gone, and removals of handles the mirror never tracked.

use livetree_core::{Handle, LiveSnapshot, MirrorError};
use tracing::{debug, trace, warn};

use crate::sync::SyncContext;

/// Upper bound on the ancestor chain walked when adding a node whose parent
/// is not tracked yet.
const MAX_ANCESTOR_CHAIN: usize = 4096;

/// Notification-driven synchronizer.
#[derive(Debug, Clone, Default)]
pub struct IncrementalMirror {
    applied: u64,
    ignored: u64,
}

impl IncrementalMirror {
    /// Create a synchronizer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications that changed the mirror.
    #[must_use]
    pub fn applied(&self) -> u64 {
        self.applied
    }

    /// Notifications dropped as stale or redundant.
    #[must_use]
    pub fn ignored(&self) -> u64 {
        self.ignored
    }

    /// `node` joined the tree.
    pub(crate) fn entered(&mut self, ctx: &mut SyncContext<'_>, node: Handle) {
        if ctx.store.contains(node) {
            trace!(node = %node, "entered: already tracked");
            self.ignored += 1;
            return;
        }
        if !ctx.source.contains(node) {
            trace!(node = %node, "entered: no longer live");
            self.ignored += 1;
            return;
        }

        // Climb to the nearest tracked ancestor; the topmost untracked node
        // is inserted with its whole subtree, which covers `node`.
        let mut top = node;
        let mut chain = 1usize;
        let parent = loop {
            match ctx.source.parent(top) {
                Some(parent) if ctx.store.contains(parent) => break parent,
                Some(parent) => {
                    chain += 1;
                    if chain > MAX_ANCESTOR_CHAIN || parent == node {
                        warn!(node = %node, "ancestor chain does not terminate; requesting resync");
                        ctx.report.resync_requested = true;
                        return;
                    }
                    top = parent;
                }
                None => {
                    self.adopt_root(ctx, top);
                    return;
                }
            }
        };

        let fill = ctx.source.snapshot_subtree(top);
        if fill.is_empty() {
            self.ignored += 1;
            return;
        }
        ctx.evict_tracked(&[top], &fill);
        if !ctx.store.contains(parent) {
            // The eviction took the insertion point with it; the mirror is
            // too far behind for point edits.
            warn!(node = %node, parent = %parent, "insertion parent evicted; requesting resync");
            ctx.report.resync_requested = true;
            return;
        }
        let row = ctx.store.insertion_row(parent, top);
        ctx.insert_rows(parent, row, &[top], &fill);
        self.applied += 1;
        if top != node {
            debug!(node = %node, ancestor = %top, "entered with untracked ancestors");
        }
    }

    /// A parentless live node: becomes the root if the mirror is empty.
    fn adopt_root(&mut self, ctx: &mut SyncContext<'_>, top: Handle) {
        if !ctx.store.is_empty() || ctx.source.root() != Some(top) {
            trace!(node = %top, "entered: detached from any tracked tree");
            self.ignored += 1;
            return;
        }
        let fill = ctx.source.snapshot_subtree(top);
        ctx.reset(Some(top), &fill);
        self.applied += 1;
    }

    /// `node` left the tree.
    pub(crate) fn left(&mut self, ctx: &mut SyncContext<'_>, node: Handle) {
        if !ctx.store.contains(node) {
            trace!(node = %node, "left: not tracked");
            self.ignored += 1;
            return;
        }
        if ctx.store.root() == Some(node) {
            ctx.reset(None, &LiveSnapshot::empty());
            ctx.report.recovered.push(MirrorError::RootReplaced {
                previous: Some(node),
                current: None,
            });
        } else {
            ctx.remove_node(node);
        }
        self.applied += 1;
    }

    /// `node` moved under a different parent.
    pub(crate) fn reparented(&mut self, ctx: &mut SyncContext<'_>, node: Handle) {
        if !ctx.store.contains(node) {
            self.entered(ctx, node);
            return;
        }
        if !ctx.source.contains(node) {
            self.left(ctx, node);
            return;
        }
        let live_parent = ctx.source.parent(node);
        if live_parent == ctx.store.parent(node) {
            trace!(node = %node, "reparented: parent unchanged");
            self.ignored += 1;
            return;
        }
        if ctx.store.root() == Some(node) {
            warn!(node = %node, "root gained a parent; requesting resync");
            ctx.report.resync_requested = true;
            return;
        }

        ctx.remove_node(node);
        self.entered(ctx, node);
        if ctx.store.contains(node) {
            ctx.report.relocated += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Emitter;
    use livetree_core::{EditOperation, KindRegistry, MirrorStore, NodeInfo, TreeSource};
    use std::collections::HashMap;

    /// Parent map standing in for a live tree.
    #[derive(Default)]
    struct Links {
        root: Option<Handle>,
        parents: HashMap<Handle, Handle>,
    }

    impl Links {
        fn new(root: u64, edges: &[(u64, u64)]) -> Self {
            Self {
                root: Some(h(root)),
                parents: edges.iter().map(|&(p, c)| (h(c), h(p))).collect(),
            }
        }
    }

    impl TreeSource for Links {
        fn root(&self) -> Option<Handle> {
            self.root
        }
        fn children(&self, node: Handle) -> Vec<Handle> {
            self.parents
                .iter()
                .filter(|&(_, &p)| p == node)
                .map(|(&c, _)| c)
                .collect()
        }
        fn parent(&self, node: Handle) -> Option<Handle> {
            self.parents.get(&node).copied()
        }
        fn contains(&self, node: Handle) -> bool {
            self.root == Some(node) || self.parents.contains_key(&node)
        }
        fn describe(&self, node: Handle) -> Option<NodeInfo> {
            self.contains(node).then(NodeInfo::default)
        }
    }

    fn h(raw: u64) -> Handle {
        Handle::from_raw(raw)
    }

    fn apply(
        store: &mut MirrorStore,
        source: &Links,
        f: impl FnOnce(&mut IncrementalMirror, &mut SyncContext<'_>),
    ) -> crate::sync::PassReport {
        let kinds = KindRegistry::default();
        let mut emitter = Emitter::default();
        let mut ctx = SyncContext::new(store, source, &kinds, &mut emitter);
        let mut mirror = IncrementalMirror::new();
        f(&mut mirror, &mut ctx);
        ctx.report
    }

    fn seeded(source: &Links) -> MirrorStore {
        let mut store = MirrorStore::new();
        apply(&mut store, source, |m, ctx| m.entered(ctx, h(1)));
        store
    }

    #[test]
    fn entering_root_into_empty_mirror_resets() {
        let source = Links::new(1, &[(1, 2)]);
        let mut store = MirrorStore::new();
        let report = apply(&mut store, &source, |m, ctx| m.entered(ctx, h(1)));
        assert!(report.reset);
        assert_eq!(store.children(h(1)), &[h(2)]);
    }

    #[test]
    fn entering_adds_missing_ancestors_first() {
        let mut source = Links::new(1, &[]);
        let mut store = seeded(&source);
        source.parents.insert(h(5), h(1));
        source.parents.insert(h(6), h(5));
        source.parents.insert(h(7), h(6));

        let report = apply(&mut store, &source, |m, ctx| m.entered(ctx, h(7)));
        assert_eq!(report.script.ops(), &[EditOperation::insert(h(1), 0, h(5))]);
        assert_eq!(store.parent(h(7)), Some(h(6)));
        store.check_invariants().unwrap();
    }

    #[test]
    fn redundant_notifications_are_ignored() {
        let source = Links::new(1, &[(1, 2)]);
        let mut store = seeded(&source);
        let report = apply(&mut store, &source, |m, ctx| {
            m.entered(ctx, h(2));
            m.entered(ctx, h(99));
            m.left(ctx, h(42));
            assert_eq!(m.ignored(), 3);
        });
        assert!(report.is_noop());
    }

    #[test]
    fn left_prunes_and_reports_deleted() {
        let mut source = Links::new(1, &[(1, 2), (2, 3)]);
        let mut store = seeded(&source);
        source.parents.remove(&h(2));
        source.parents.remove(&h(3));

        let report = apply(&mut store, &source, |m, ctx| m.left(ctx, h(2)));
        assert_eq!(report.script.ops(), &[EditOperation::remove(h(1), 0)]);
        assert_eq!(report.deleted, 2);
        assert!(store.children(h(1)).is_empty());
    }

    #[test]
    fn reparent_is_remove_then_insert() {
        let mut source = Links::new(1, &[(1, 2), (1, 3), (3, 4)]);
        let mut store = seeded(&source);
        source.parents.insert(h(3), h(2));

        let report = apply(&mut store, &source, |m, ctx| m.reparented(ctx, h(3)));
        assert_eq!(
            report.script.ops(),
            &[EditOperation::remove(h(1), 1), EditOperation::insert(h(2), 0, h(3))]
        );
        assert_eq!(report.deleted, 0);
        assert_eq!(report.relocated, 1);
        assert_eq!(store.children(h(3)), &[h(4)]);
        store.check_invariants().unwrap();
    }

    #[test]
    fn reparent_under_own_former_child() {
        // 2 -> 3 becomes 3 -> 2, both under 1.
        let mut source = Links::new(1, &[(1, 2), (2, 3)]);
        let mut store = seeded(&source);
        source.parents.insert(h(3), h(1));
        source.parents.insert(h(2), h(3));

        apply(&mut store, &source, |m, ctx| {
            m.reparented(ctx, h(2));
            m.reparented(ctx, h(3));
        });
        assert_eq!(store.children(h(1)), &[h(3)]);
        assert_eq!(store.children(h(3)), &[h(2)]);
        store.check_invariants().unwrap();
    }

    #[test]
    fn removing_root_empties_mirror() {
        let mut source = Links::new(1, &[(1, 2)]);
        let mut store = seeded(&source);
        source.root = None;
        source.parents.clear();

        let report = apply(&mut store, &source, |m, ctx| m.left(ctx, h(1)));
        assert!(report.reset);
        assert!(store.is_empty());
        assert_eq!(report.deleted, 2);
    }
}
