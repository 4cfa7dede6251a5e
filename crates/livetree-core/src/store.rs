#![forbid(unsafe_code)]

//! The engine's own record of tree shape.
//!
//! [`MirrorStore`] keeps two maps keyed by [`Handle`]: parent-of and
//! children-of. Child lists are sorted by raw identity, not by the observed
//! tree's paint order, which makes membership tests and row lookups a
//! binary search and lets the reconciler diff two sorted sequences.
//!
//! # Invariants
//!
//! - `h ∈ children(p)` exactly when `parent(h) == Some(p)`.
//! - No handle has two parents or appears twice under one parent.
//! - The root has no parent entry.
//!
//! All mutation is silent: the store never notifies anyone. Callers that
//! need notifications (the synchronizers) emit them around these calls.

use std::collections::HashMap;

use crate::handle::Handle;

/// Parent/children maps mirroring the observed tree.
#[derive(Debug, Clone, Default)]
pub struct MirrorStore {
    root: Option<Handle>,
    parent_of: HashMap<Handle, Handle>,
    children_of: HashMap<Handle, Vec<Handle>>,
}

impl MirrorStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current root handle.
    #[inline]
    #[must_use]
    pub fn root(&self) -> Option<Handle> {
        self.root
    }

    /// Drop everything and start over with `root` (or nothing).
    pub fn reset(&mut self, root: Option<Handle>) {
        self.parent_of.clear();
        self.children_of.clear();
        self.root = root;
    }

    /// Number of tracked handles, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parent_of.len() + usize::from(self.root.is_some())
    }

    /// Whether the store tracks nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Whether `h` is tracked anywhere.
    #[inline]
    #[must_use]
    pub fn contains(&self, h: Handle) -> bool {
        self.root == Some(h) || self.parent_of.contains_key(&h)
    }

    /// Recorded parent of `h`. The root and unknown handles have none.
    #[inline]
    #[must_use]
    pub fn parent(&self, h: Handle) -> Option<Handle> {
        self.parent_of.get(&h).copied()
    }

    /// Recorded children of `h`, sorted by identity.
    #[inline]
    #[must_use]
    pub fn children(&self, h: Handle) -> &[Handle] {
        self.children_of.get(&h).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Row of `h` under its parent; the root is row 0 of the top level.
    #[must_use]
    pub fn index_of(&self, h: Handle) -> Option<usize> {
        if self.root == Some(h) {
            return Some(0);
        }
        let parent = self.parent(h)?;
        self.children(parent).binary_search(&h).ok()
    }

    /// Row `h` would occupy if inserted under `parent`.
    #[must_use]
    pub fn insertion_row(&self, parent: Handle, h: Handle) -> usize {
        match self.children(parent).binary_search(&h) {
            Ok(row) | Err(row) => row,
        }
    }

    /// Record `h` as a child of `parent` and return its row.
    ///
    /// `h` must not be tracked yet; `parent` must be.
    pub fn insert(&mut self, parent: Handle, h: Handle) -> usize {
        debug_assert!(self.contains(parent), "insert under untracked parent {parent}");
        debug_assert!(!self.contains(h), "insert of already tracked handle {h}");
        let siblings = self.children_of.entry(parent).or_default();
        let row = match siblings.binary_search(&h) {
            Ok(row) | Err(row) => row,
        };
        siblings.insert(row, h);
        self.parent_of.insert(h, parent);
        row
    }

    /// Detach `h` from its parent, keeping its recorded subtree.
    ///
    /// Returns the former parent and row. The root cannot be detached.
    pub fn detach(&mut self, h: Handle) -> Option<(Handle, usize)> {
        let parent = self.parent_of.remove(&h)?;
        let siblings = self.children_of.get_mut(&parent)?;
        let row = siblings.binary_search(&h).ok()?;
        siblings.remove(row);
        if siblings.is_empty() {
            self.children_of.remove(&parent);
        }
        Some((parent, row))
    }

    /// Re-attach a detached `h` (with its subtree) under `parent`.
    pub fn attach(&mut self, parent: Handle, h: Handle) -> usize {
        debug_assert!(!self.parent_of.contains_key(&h), "attach of attached handle {h}");
        let siblings = self.children_of.entry(parent).or_default();
        let row = match siblings.binary_search(&h) {
            Ok(row) | Err(row) => row,
        };
        siblings.insert(row, h);
        self.parent_of.insert(h, parent);
        row
    }

    /// Remove `h` and its whole recorded subtree.
    ///
    /// Returns every pruned handle, `h` first, in pre-order. Removing the
    /// root empties the store.
    pub fn remove(&mut self, h: Handle) -> Vec<Handle> {
        if !self.contains(h) {
            return Vec::new();
        }
        if self.root == Some(h) {
            let mut pruned = vec![h];
            pruned.extend(self.descendants(h));
            self.reset(None);
            return pruned;
        }
        self.detach(h);
        self.prune_detached(h)
    }

    /// Remove everything below `h`, keeping `h` itself.
    pub fn remove_children(&mut self, h: Handle) -> Vec<Handle> {
        let kids = self.children_of.remove(&h).unwrap_or_default();
        let mut pruned = Vec::new();
        for child in kids {
            self.parent_of.remove(&child);
            pruned.extend(self.prune_detached(child));
        }
        pruned
    }

    fn prune_detached(&mut self, h: Handle) -> Vec<Handle> {
        let mut pruned = Vec::new();
        let mut stack = vec![h];
        while let Some(node) = stack.pop() {
            pruned.push(node);
            self.parent_of.remove(&node);
            if let Some(kids) = self.children_of.remove(&node) {
                stack.extend(kids.into_iter().rev());
            }
        }
        pruned
    }

    /// Recorded subtree below `h` (excluding `h`), pre-order.
    #[must_use]
    pub fn descendants(&self, h: Handle) -> Vec<Handle> {
        let mut out = Vec::new();
        let mut stack: Vec<Handle> = self.children(h).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// Whether `h` reaches the root by following recorded parent links,
    /// with every link confirmed by the parent's child list.
    #[must_use]
    pub fn is_reachable(&self, h: Handle) -> bool {
        let Some(root) = self.root else {
            return false;
        };
        let mut node = h;
        let mut steps = 0usize;
        while node != root {
            let Some(parent) = self.parent(node) else {
                return false;
            };
            if self.children(parent).binary_search(&node).is_err() {
                return false;
            }
            node = parent;
            steps += 1;
            if steps > self.parent_of.len() {
                return false;
            }
        }
        true
    }

    /// Check every structural invariant; returns a description of the
    /// first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        if let Some(root) = self.root
            && self.parent_of.contains_key(&root)
        {
            return Err(format!("root {root} has a parent entry"));
        }
        for (&parent, kids) in &self.children_of {
            if !self.contains(parent) {
                return Err(format!("children recorded for untracked {parent}"));
            }
            if kids.windows(2).any(|w| w[0] >= w[1]) {
                return Err(format!("children of {parent} not strictly sorted"));
            }
            for &child in kids {
                if self.parent(child) != Some(parent) {
                    return Err(format!("{child} listed under {parent} but parent differs"));
                }
            }
        }
        for (&child, &parent) in &self.parent_of {
            if self.children(parent).binary_search(&child).is_err() {
                return Err(format!("{child} has parent {parent} but is not listed"));
            }
            if !self.is_reachable(child) {
                return Err(format!("{child} is not reachable from the root"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(raw: u64) -> Handle {
        Handle::from_raw(raw)
    }

    fn sample() -> MirrorStore {
        // 1 -> [10, 20, 30], 20 -> [21, 22]
        let mut store = MirrorStore::new();
        store.reset(Some(h(1)));
        store.insert(h(1), h(30));
        store.insert(h(1), h(10));
        store.insert(h(1), h(20));
        store.insert(h(20), h(22));
        store.insert(h(20), h(21));
        store
    }

    #[test]
    fn insert_keeps_children_sorted() {
        let store = sample();
        assert_eq!(store.children(h(1)), &[h(10), h(20), h(30)]);
        assert_eq!(store.children(h(20)), &[h(21), h(22)]);
        assert_eq!(store.parent(h(22)), Some(h(20)));
        assert_eq!(store.parent(h(1)), None);
        assert_eq!(store.len(), 6);
        store.check_invariants().unwrap();
    }

    #[test]
    fn index_of_uses_sorted_position() {
        let store = sample();
        assert_eq!(store.index_of(h(1)), Some(0));
        assert_eq!(store.index_of(h(30)), Some(2));
        assert_eq!(store.index_of(h(21)), Some(0));
        assert_eq!(store.index_of(h(99)), None);
        assert_eq!(store.insertion_row(h(1), h(15)), 1);
    }

    #[test]
    fn remove_prunes_subtree_silently() {
        let mut store = sample();
        let pruned = store.remove(h(20));
        assert_eq!(pruned, vec![h(20), h(21), h(22)]);
        assert_eq!(store.children(h(1)), &[h(10), h(30)]);
        assert!(!store.contains(h(21)));
        store.check_invariants().unwrap();
    }

    #[test]
    fn remove_root_empties_store() {
        let mut store = sample();
        let pruned = store.remove(h(1));
        assert_eq!(pruned.len(), 6);
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn detach_and_attach_keep_subtree() {
        let mut store = sample();
        assert_eq!(store.detach(h(20)), Some((h(1), 1)));
        assert!(!store.is_reachable(h(21)));
        let row = store.attach(h(30), h(20));
        assert_eq!(row, 0);
        assert_eq!(store.children(h(20)), &[h(21), h(22)]);
        assert!(store.is_reachable(h(22)));
        store.check_invariants().unwrap();
    }

    #[test]
    fn remove_children_keeps_node() {
        let mut store = sample();
        let pruned = store.remove_children(h(20));
        assert_eq!(pruned, vec![h(21), h(22)]);
        assert!(store.contains(h(20)));
        assert!(store.children(h(20)).is_empty());
        store.check_invariants().unwrap();
    }

    #[test]
    fn unknown_handles_are_harmless() {
        let mut store = sample();
        assert!(store.remove(h(99)).is_empty());
        assert_eq!(store.detach(h(99)), None);
        assert!(!store.is_reachable(h(99)));
    }
}
