#![forbid(unsafe_code)]

//! Consistent captures of the live tree.
//!
//! A [`LiveSnapshot`] is taken at the start of a reconciliation step and is
//! the only view of the observed tree the diff ever consults, so a pass sees
//! one coherent shape even if the producer keeps mutating the real tree.
//!
//! Children are stored sorted by identity, matching the order the mirror
//! store keeps, not the tree's native order.

use std::collections::HashMap;

use crate::handle::Handle;

/// Sorted child lists and parent links of a captured (sub)tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSnapshot {
    root: Option<Handle>,
    children: HashMap<Handle, Vec<Handle>>,
    parents: HashMap<Handle, Handle>,
}

impl LiveSnapshot {
    /// Snapshot of an absent tree.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture the tree rooted at `root`, walking `children_of` depth-first.
    ///
    /// A handle reported a second time (under another parent, or as its own
    /// ancestor) is ignored; the first occurrence wins.
    pub fn capture(root: Handle, mut children_of: impl FnMut(Handle) -> Vec<Handle>) -> Self {
        let mut snapshot = Self {
            root: Some(root),
            children: HashMap::new(),
            parents: HashMap::new(),
        };
        snapshot.children.insert(root, Vec::new());

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let mut kids = children_of(node);
            kids.sort_unstable();
            kids.dedup();
            kids.retain(|child| {
                if snapshot.children.contains_key(child) {
                    crate::warn!(
                        parent = %node,
                        child = %child,
                        "duplicate handle in live tree ignored"
                    );
                    false
                } else {
                    true
                }
            });
            for &child in &kids {
                snapshot.children.insert(child, Vec::new());
                snapshot.parents.insert(child, node);
                stack.push(child);
            }
            snapshot.children.insert(node, kids);
        }
        snapshot
    }

    /// Build a snapshot from explicit parent/child edges.
    ///
    /// Useful for sources that already hold their structure in memory.
    pub fn from_edges(root: Handle, edges: impl IntoIterator<Item = (Handle, Handle)>) -> Self {
        let mut map: HashMap<Handle, Vec<Handle>> = HashMap::new();
        for (parent, child) in edges {
            map.entry(parent).or_default().push(child);
        }
        Self::capture(root, |node| map.get(&node).cloned().unwrap_or_default())
    }

    /// Captured root.
    #[inline]
    #[must_use]
    pub fn root(&self) -> Option<Handle> {
        self.root
    }

    /// Whether `node` was live at capture time.
    #[inline]
    #[must_use]
    pub fn contains(&self, node: Handle) -> bool {
        self.children.contains_key(&node)
    }

    /// Sorted live children of `node` (empty if not captured).
    #[must_use]
    pub fn children(&self, node: Handle) -> &[Handle] {
        self.children.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Live parent of `node`; `None` for the root and unknown handles.
    #[must_use]
    pub fn parent(&self, node: Handle) -> Option<Handle> {
        self.parents.get(&node).copied()
    }

    /// Number of captured nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Iterate over all captured handles in no particular order.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.children.keys().copied()
    }

    /// Handles of the subtree below `node` (excluding `node`), pre-order.
    #[must_use]
    pub fn descendants(&self, node: Handle) -> Vec<Handle> {
        let mut out = Vec::new();
        let mut stack: Vec<Handle> = self.children(node).iter().rev().copied().collect();
        while let Some(h) = stack.pop() {
            out.push(h);
            stack.extend(self.children(h).iter().rev().copied());
        }
        out
    }
}
