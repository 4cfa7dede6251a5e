#![forbid(unsafe_code)]

//! Liveness checks for handles held outside a pass.

use livetree_core::{Handle, MirrorStore, TreeSource};

/// Why a handle failed validation, or that it passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    /// The mirror does not track the handle.
    Untracked,
    /// Tracked, but its parent links no longer lead to the root.
    Unreachable,
    /// The source no longer knows the node.
    Dead,
    /// The node is live but sits somewhere the mirror has not caught up
    /// with, which also covers a reused identity.
    Moved,
}

impl Validity {
    #[must_use]
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Untracked => "untracked",
            Self::Unreachable => "unreachable",
            Self::Dead => "dead",
            Self::Moved => "moved",
        }
    }
}

/// Confirms a handle by walking the mirror from the root anchor and,
/// optionally, cross-checking the live source.
#[derive(Debug, Clone, Copy)]
pub struct ValidityGuard {
    check_live: bool,
}

impl Default for ValidityGuard {
    fn default() -> Self {
        Self { check_live: true }
    }
}

impl ValidityGuard {
    #[must_use]
    pub fn new(check_live: bool) -> Self {
        Self { check_live }
    }

    /// Classify `node`.
    #[must_use]
    pub fn check(&self, store: &MirrorStore, source: &dyn TreeSource, node: Handle) -> Validity {
        if !store.contains(node) {
            return Validity::Untracked;
        }
        if !store.is_reachable(node) {
            return Validity::Unreachable;
        }
        if !self.check_live {
            return Validity::Valid;
        }
        if !source.contains(node) {
            return Validity::Dead;
        }
        let placed = if store.root() == Some(node) {
            source.root() == Some(node)
        } else {
            source.parent(node) == store.parent(node)
        };
        if placed {
            Validity::Valid
        } else {
            Validity::Moved
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livetree_core::NodeInfo;
    use std::collections::HashMap;

    struct Parents(Option<Handle>, HashMap<Handle, Handle>);

    impl TreeSource for Parents {
        fn root(&self) -> Option<Handle> {
            self.0
        }
        fn children(&self, _node: Handle) -> Vec<Handle> {
            Vec::new()
        }
        fn parent(&self, node: Handle) -> Option<Handle> {
            self.1.get(&node).copied()
        }
        fn contains(&self, node: Handle) -> bool {
            self.0 == Some(node) || self.1.contains_key(&node)
        }
        fn describe(&self, _node: Handle) -> Option<NodeInfo> {
            None
        }
    }

    fn h(raw: u64) -> Handle {
        Handle::from_raw(raw)
    }

    fn fixture() -> (MirrorStore, Parents) {
        let mut store = MirrorStore::new();
        store.reset(Some(h(1)));
        store.insert(h(1), h(2));
        store.insert(h(2), h(3));
        let live = Parents(Some(h(1)), HashMap::from([(h(2), h(1)), (h(3), h(2))]));
        (store, live)
    }

    #[test]
    fn tracked_and_live_is_valid() {
        let (store, live) = fixture();
        let guard = ValidityGuard::default();
        assert!(guard.check(&store, &live, h(3)).is_valid());
        assert!(guard.check(&store, &live, h(1)).is_valid());
        assert_eq!(guard.check(&store, &live, h(9)), Validity::Untracked);
    }

    #[test]
    fn externally_removed_is_dead() {
        let (store, mut live) = fixture();
        live.1.remove(&h(3));
        let guard = ValidityGuard::default();
        assert_eq!(guard.check(&store, &live, h(3)), Validity::Dead);
        // Without the live check only the mirror is consulted.
        assert!(ValidityGuard::new(false).check(&store, &live, h(3)).is_valid());
    }

    #[test]
    fn unreconciled_move_is_reported() {
        let (store, mut live) = fixture();
        live.1.insert(h(3), h(1));
        assert_eq!(
            ValidityGuard::default().check(&store, &live, h(3)),
            Validity::Moved
        );
        assert_eq!(Validity::Moved.as_str(), "moved");
    }
}
