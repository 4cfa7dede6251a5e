#![forbid(unsafe_code)]

//! Read-only access to the observed tree.

use crate::handle::Handle;
use crate::kind::{NodeFlags, TypeTag};
use crate::snapshot::LiveSnapshot;

/// What a source can tell about one live node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeInfo {
    /// Human-readable name; may be empty.
    pub label: String,
    /// Raw type discriminator, resolved through a `KindRegistry`.
    pub type_tag: TypeTag,
    /// Current state flags.
    pub flags: NodeFlags,
}

impl NodeInfo {
    /// Info with a label and type tag and no flags set.
    #[must_use]
    pub fn new(label: impl Into<String>, type_tag: TypeTag) -> Self {
        Self {
            label: label.into(),
            type_tag,
            flags: NodeFlags::empty(),
        }
    }

    /// Set the state flags.
    #[must_use]
    pub fn with_flags(mut self, flags: NodeFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// The observed tree, as seen by the mirroring engine.
///
/// Implementations wrap a tree owned and mutated elsewhere, possibly by
/// another thread. The engine only ever reads through this trait.
pub trait TreeSource: Send + Sync {
    /// Current root, if the tree exists.
    fn root(&self) -> Option<Handle>;

    /// Live children of `node` in the tree's native order.
    ///
    /// Unknown or dead nodes have no children.
    fn children(&self, node: Handle) -> Vec<Handle>;

    /// Live parent of `node`.
    fn parent(&self, node: Handle) -> Option<Handle>;

    /// Whether `node` still refers to a live node.
    fn contains(&self, node: Handle) -> bool;

    /// Display information for a live node.
    fn describe(&self, node: Handle) -> Option<NodeInfo>;

    /// Capture the whole tree reachable from [`root`](Self::root).
    ///
    /// Sources guarded by a lock should override this to walk the tree under
    /// a single acquisition, so the capture is consistent.
    fn snapshot(&self) -> LiveSnapshot {
        match self.root() {
            Some(root) => LiveSnapshot::capture(root, |node| self.children(node)),
            None => LiveSnapshot::empty(),
        }
    }

    /// Capture the subtree rooted at `node`.
    fn snapshot_subtree(&self, node: Handle) -> LiveSnapshot {
        if self.contains(node) {
            LiveSnapshot::capture(node, |h| self.children(h))
        } else {
            LiveSnapshot::empty()
        }
    }
}
