#![forbid(unsafe_code)]

//! Periodic full-tree diff.
//!
//! A pass compares the mirror against a [`LiveSnapshot`] captured at its
//! start and emits the edits that bring the two into agreement. It runs in
//! two sweeps over the tree:
//!
//! 1. **Removals.** Post-order over the mirror: children that are no longer
//!    live anywhere are removed in contiguous runs, deepest first and from
//!    the highest row down, so a consumer never has to recompute an index
//!    it is about to use.
//! 2. **Merge.** Pre-order over the live tree: the recorded and live child
//!    lists of each node are merged with two cursors. Matching handles are
//!    recursed into, handles tracked elsewhere are relocated, and runs of
//!    unseen handles are inserted as one batch with their subtrees filled
//!    in silently.
//!
//! A relocation is always a removal at the old location followed by an
//! insertion at the new one. No move notification exists.
//!
//! Edit order: every removal of a dead node precedes every edit of the
//! merge sweep. Within the merge, edits follow pre-order over the live
//! tree and ascending rows under each parent, so a relocation or a
//! moved-away removal can sit between two pure insertions and split what
//! would otherwise be one batch.
//!
//! Row lookups (`index_of`) are only made when an edit is actually
//! emitted; a pass over an unchanged tree performs none.

use livetree_core::{Handle, LiveSnapshot, MirrorError};
use tracing::{debug, error};

use crate::sync::SyncContext;

/// Full-subtree diff engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotReconciler {
    strict: bool,
}

impl SnapshotReconciler {
    /// Create a reconciler. With `strict`, a failed postcondition panics
    /// instead of re-deriving the subtree.
    #[must_use]
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    /// Whether failed postconditions panic.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Bring the mirror in line with `snapshot`.
    pub(crate) fn run(&self, ctx: &mut SyncContext<'_>, snapshot: &LiveSnapshot) {
        let previous = ctx.store.root();
        let current = snapshot.root();
        if previous != current {
            debug!(
                previous = ?previous.map(|h| h.to_string()),
                current = ?current.map(|h| h.to_string()),
                "root changed; resetting model"
            );
            ctx.reset(current, snapshot);
            if previous.is_some() {
                ctx.report
                    .recovered
                    .push(MirrorError::RootReplaced { previous, current });
            }
            return;
        }
        let Some(root) = current else {
            return;
        };

        self.remove_dead(ctx, snapshot, root);
        self.diff_node(ctx, snapshot, root);
    }

    /// Sweep 1: drop recorded children that are not live anywhere.
    fn remove_dead(&self, ctx: &mut SyncContext<'_>, snapshot: &LiveSnapshot, node: Handle) {
        let kids = ctx.store.children(node).to_vec();
        for &child in &kids {
            if snapshot.contains(child) {
                self.remove_dead(ctx, snapshot, child);
            }
        }

        // Recursion only touched grandchildren, so `kids` is still current.
        let mut end = kids.len();
        while end > 0 {
            if snapshot.contains(kids[end - 1]) {
                end -= 1;
                continue;
            }
            let mut start = end - 1;
            while start > 0 && !snapshot.contains(kids[start - 1]) {
                start -= 1;
            }
            ctx.remove_rows(node, start, end - 1);
            end = start;
        }
    }

    /// Sweep 2: merge recorded children of `node` with its live children.
    fn diff_node(&self, ctx: &mut SyncContext<'_>, snapshot: &LiveSnapshot, node: Handle) {
        let live = snapshot.children(node);
        let mut i = 0;
        let mut j = 0;

        while j < live.len() {
            let wanted = live[j];
            // Re-read each round: edits below may have shifted rows >= i.
            let recorded = ctx.store.children(node).get(i).copied();

            match recorded {
                Some(old) if old == wanted => {
                    self.diff_node(ctx, snapshot, old);
                    i += 1;
                    j += 1;
                }
                Some(old) if old < wanted => {
                    // Still live but no longer here: moved away. Its new
                    // parent picks it up as a fresh insertion.
                    let end = {
                        let old_kids = ctx.store.children(node);
                        let mut end = i + 1;
                        while end < old_kids.len() && old_kids[end] < wanted {
                            end += 1;
                        }
                        end
                    };
                    ctx.remove_rows(node, i, end - 1);
                }
                _ if ctx.store.contains(wanted) => {
                    if ctx.relocate(wanted, node) {
                        self.diff_node(ctx, snapshot, wanted);
                        i += 1;
                        j += 1;
                    } else {
                        // Unreachable for a consistent store; skip and let
                        // the postcondition repair the node.
                        j += 1;
                    }
                }
                _ => {
                    let mut k = j;
                    while k < live.len()
                        && !ctx.store.contains(live[k])
                        && recorded.is_none_or(|bound| live[k] < bound)
                    {
                        k += 1;
                    }
                    let fresh = &live[j..k];
                    if ctx.evict_tracked(fresh, snapshot) {
                        continue;
                    }
                    ctx.insert_rows(node, i, fresh, snapshot);
                    i += fresh.len();
                    j = k;
                }
            }
        }

        let recorded_len = ctx.store.children(node).len();
        if i < recorded_len {
            ctx.remove_rows(node, i, recorded_len - 1);
        }

        self.check_postcondition(ctx, snapshot, node);
    }

    fn check_postcondition(&self, ctx: &mut SyncContext<'_>, snapshot: &LiveSnapshot, node: Handle) {
        let live = snapshot.children(node);
        let recorded = ctx.store.children(node);
        if recorded == live {
            return;
        }
        let actual = recorded.len();
        if self.strict {
            panic!(
                "children of {node} diverged after diff: expected {:?}, recorded {:?}",
                live, recorded
            );
        }
        error!(
            node = %node,
            expected = live.len(),
            actual,
            "diff postcondition failed; re-deriving subtree"
        );

        if actual > 0 {
            ctx.remove_rows(node, 0, actual - 1);
        }
        for &child in live {
            if ctx.store.contains(child) {
                ctx.remove_node(child);
            }
        }
        ctx.evict_tracked(live, snapshot);
        if ctx.store.contains(node) {
            ctx.insert_rows(node, 0, live, snapshot);
        }
        ctx.report.recovered.push(MirrorError::InconsistentSnapshot {
            node,
            expected: live.len(),
            actual,
        });
    }
}
