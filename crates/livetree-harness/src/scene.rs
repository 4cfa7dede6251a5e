#![forbid(unsafe_code)]

//! A simulated observed application.
//!
//! [`SceneGraph`] is a small retained scene: a slot/generation arena of
//! labelled nodes whose children are kept in native (paint) order. Every
//! structural or attribute mutation appends a [`SceneNotification`] to a
//! feed, the same kind of feed a real toolkit exposes to an inspector.
//!
//! [`SharedScene`] puts the graph behind a lock so a producer thread can
//! mutate it while the mirror reads it through [`TreeSource`]. When a
//! [`TaskSender`] is attached, notifications are forwarded to the model
//! thread as [`MirrorTask`]s after each mutation.

use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use livetree_core::{
    AttributeKinds, Handle, LiveSnapshot, MirrorResult, NodeFlags, NodeInfo, TreeSource, TypeTag,
};
use livetree_runtime::{MirrorTask, TaskSender};
use serde_json::{Value, json};

/// Why a scene mutation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneError {
    /// The handle does not name a live node.
    UnknownNode(Handle),
    /// A root already exists.
    RootExists,
    /// The root cannot be reparented.
    RootMove(Handle),
    /// Reparenting `node` under `parent` would create a cycle.
    WouldCycle { node: Handle, parent: Handle },
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNode(node) => write!(f, "unknown node {node}"),
            Self::RootExists => write!(f, "scene already has a root"),
            Self::RootMove(node) => write!(f, "cannot reparent root {node}"),
            Self::WouldCycle { node, parent } => {
                write!(f, "reparenting {node} under {parent} would create a cycle")
            }
        }
    }
}

impl std::error::Error for SceneError {}

/// Result type for scene mutations.
pub type SceneResult<T> = Result<T, SceneError>;

/// One entry of the scene's notification feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneNotification {
    /// A node (and any subtree it carries) joined the tree.
    Entered(Handle),
    /// A node and its subtree left the tree.
    Left(Handle),
    /// A node moved under a different parent.
    Reparented(Handle),
    /// Non-structural state changed.
    Attributes { node: Handle, kinds: AttributeKinds },
}

impl From<SceneNotification> for MirrorTask {
    fn from(notification: SceneNotification) -> Self {
        match notification {
            SceneNotification::Entered(node) => Self::EnteredTree(node),
            SceneNotification::Left(node) => Self::LeftTree(node),
            SceneNotification::Reparented(node) => Self::Reparented(node),
            SceneNotification::Attributes { node, kinds } => {
                Self::AttributesChanged { node, kinds }
            }
        }
    }
}

#[derive(Debug, Clone)]
struct SceneNode {
    label: String,
    type_tag: TypeTag,
    flags: NodeFlags,
    parent: Option<Handle>,
    children: Vec<Handle>,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<SceneNode>,
}

/// Attribute kinds affected by a flag transition.
fn flag_kinds(before: NodeFlags, after: NodeFlags) -> AttributeKinds {
    let changed = before ^ after;
    let mut kinds = AttributeKinds::empty();
    if changed.contains(NodeFlags::INVISIBLE) {
        kinds |= AttributeKinds::VISIBILITY;
    }
    if changed.contains(NodeFlags::ZERO_SIZE) {
        kinds |= AttributeKinds::SIZE;
    }
    if changed.contains(NodeFlags::OUT_OF_VIEW) {
        kinds |= AttributeKinds::POSITION;
    }
    if changed.intersects(NodeFlags::HAS_FOCUS | NodeFlags::HAS_ACTIVE_FOCUS) {
        kinds |= AttributeKinds::FOCUS;
    }
    if changed.contains(NodeFlags::JUST_RECEIVED_EVENT) {
        kinds |= AttributeKinds::EVENT;
    }
    kinds
}

/// Arena-backed scene tree with generation-tagged handles.
///
/// Freed slots are reused, but each reuse bumps the slot generation, so a
/// handle to a destroyed node never names its successor.
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: Option<Handle>,
    live: usize,
    notifications: Vec<SceneNotification>,
}

impl SceneGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current root.
    #[must_use]
    pub fn root(&self) -> Option<Handle> {
        self.root
    }

    /// Live node count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn node(&self, h: Handle) -> Option<&SceneNode> {
        let slot = self.slots.get(h.index() as usize)?;
        if slot.generation != h.generation() {
            return None;
        }
        slot.node.as_ref()
    }

    fn node_mut(&mut self, h: Handle) -> Option<&mut SceneNode> {
        let slot = self.slots.get_mut(h.index() as usize)?;
        if slot.generation != h.generation() {
            return None;
        }
        slot.node.as_mut()
    }

    fn require(&self, h: Handle) -> SceneResult<&SceneNode> {
        self.node(h).ok_or(SceneError::UnknownNode(h))
    }

    /// Whether `h` names a live node.
    #[must_use]
    pub fn contains(&self, h: Handle) -> bool {
        self.node(h).is_some()
    }

    /// Children of `h` in paint order; empty for unknown handles.
    #[must_use]
    pub fn children(&self, h: Handle) -> &[Handle] {
        self.node(h).map_or(&[], |n| n.children.as_slice())
    }

    #[must_use]
    pub fn parent(&self, h: Handle) -> Option<Handle> {
        self.node(h)?.parent
    }

    #[must_use]
    pub fn label(&self, h: Handle) -> Option<&str> {
        self.node(h).map(|n| n.label.as_str())
    }

    #[must_use]
    pub fn flags(&self, h: Handle) -> Option<NodeFlags> {
        self.node(h).map(|n| n.flags)
    }

    /// Display information for a live node.
    #[must_use]
    pub fn describe(&self, h: Handle) -> Option<NodeInfo> {
        let node = self.node(h)?;
        Some(NodeInfo::new(node.label.clone(), node.type_tag).with_flags(node.flags))
    }

    /// Every live handle, in pre-order from the root.
    #[must_use]
    pub fn handles(&self) -> Vec<Handle> {
        let mut out = Vec::with_capacity(self.live);
        let mut stack: Vec<Handle> = self.root.into_iter().collect();
        while let Some(h) = stack.pop() {
            out.push(h);
            stack.extend(self.children(h).iter().rev().copied());
        }
        out
    }

    fn allocate(&mut self, node: SceneNode) -> Handle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.node = Some(node);
            return Handle::from_parts(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            node: Some(node),
        });
        Handle::from_parts(index, 1)
    }

    fn release(&mut self, h: Handle) -> Option<SceneNode> {
        let slot = self.slots.get_mut(h.index() as usize)?;
        if slot.generation != h.generation() {
            return None;
        }
        let node = slot.node.take()?;
        self.free.push(h.index());
        self.live -= 1;
        Some(node)
    }

    /// Create the root node.
    pub fn create_root(&mut self, label: impl Into<String>, type_tag: TypeTag) -> SceneResult<Handle> {
        if self.root.is_some() {
            return Err(SceneError::RootExists);
        }
        let h = self.allocate(SceneNode {
            label: label.into(),
            type_tag,
            flags: NodeFlags::empty(),
            parent: None,
            children: Vec::new(),
        });
        self.root = Some(h);
        self.notifications.push(SceneNotification::Entered(h));
        Ok(h)
    }

    /// Create a node as the last child of `parent`.
    pub fn create(
        &mut self,
        parent: Handle,
        label: impl Into<String>,
        type_tag: TypeTag,
    ) -> SceneResult<Handle> {
        self.require(parent)?;
        let h = self.allocate(SceneNode {
            label: label.into(),
            type_tag,
            flags: NodeFlags::empty(),
            parent: Some(parent),
            children: Vec::new(),
        });
        if let Some(p) = self.node_mut(parent) {
            p.children.push(h);
        }
        self.notifications.push(SceneNotification::Entered(h));
        Ok(h)
    }

    /// Destroy `node` and its whole subtree, returning how many nodes died.
    ///
    /// Destroying the root leaves the scene empty.
    pub fn destroy(&mut self, node: Handle) -> SceneResult<usize> {
        let parent = self.require(node)?.parent;
        match parent {
            Some(p) => {
                if let Some(p) = self.node_mut(p) {
                    p.children.retain(|&c| c != node);
                }
            }
            None => self.root = None,
        }
        self.notifications.push(SceneNotification::Left(node));

        let mut stack = vec![node];
        let mut count = 0;
        while let Some(h) = stack.pop() {
            if let Some(dead) = self.release(h) {
                stack.extend(dead.children);
                count += 1;
            }
        }
        Ok(count)
    }

    /// Move `node` to the end of `new_parent`'s children.
    pub fn reparent(&mut self, node: Handle, new_parent: Handle) -> SceneResult<()> {
        let old_parent = self.require(node)?.parent.ok_or(SceneError::RootMove(node))?;
        self.require(new_parent)?;

        let mut cursor = Some(new_parent);
        while let Some(h) = cursor {
            if h == node {
                return Err(SceneError::WouldCycle {
                    node,
                    parent: new_parent,
                });
            }
            cursor = self.parent(h);
        }

        if let Some(p) = self.node_mut(old_parent) {
            p.children.retain(|&c| c != node);
        }
        if let Some(p) = self.node_mut(new_parent) {
            p.children.push(node);
        }
        if let Some(n) = self.node_mut(node) {
            n.parent = Some(new_parent);
        }
        self.notifications.push(SceneNotification::Reparented(node));
        Ok(())
    }

    /// Move `node` to the top of its siblings' paint order.
    ///
    /// Only the native order changes, so no notification is produced.
    pub fn raise(&mut self, node: Handle) -> SceneResult<()> {
        let Some(parent) = self.require(node)?.parent else {
            return Ok(());
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|&c| c != node);
            p.children.push(node);
        }
        Ok(())
    }

    pub fn set_label(&mut self, node: Handle, label: impl Into<String>) -> SceneResult<()> {
        let n = self.node_mut(node).ok_or(SceneError::UnknownNode(node))?;
        n.label = label.into();
        self.notifications.push(SceneNotification::Attributes {
            node,
            kinds: AttributeKinds::LABEL,
        });
        Ok(())
    }

    /// Replace the state flags, notifying the kinds that changed.
    pub fn set_flags(&mut self, node: Handle, flags: NodeFlags) -> SceneResult<AttributeKinds> {
        let n = self.node_mut(node).ok_or(SceneError::UnknownNode(node))?;
        let kinds = flag_kinds(n.flags, flags);
        n.flags = flags;
        if !kinds.is_empty() {
            self.notifications
                .push(SceneNotification::Attributes { node, kinds });
        }
        Ok(kinds)
    }

    /// Drain the notification feed.
    pub fn take_notifications(&mut self) -> Vec<SceneNotification> {
        std::mem::take(&mut self.notifications)
    }

    #[must_use]
    pub fn pending_notifications(&self) -> usize {
        self.notifications.len()
    }

    /// JSON dump of the tree in paint order.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self.root {
            Some(root) => self.node_json(root),
            None => Value::Null,
        }
    }

    fn node_json(&self, h: Handle) -> Value {
        let Some(node) = self.node(h) else {
            return Value::Null;
        };
        let children: Vec<Value> = node.children.iter().map(|&c| self.node_json(c)).collect();
        json!({
            "handle": h.to_string(),
            "label": node.label,
            "type": node.type_tag.0,
            "flags": node.flags.bits(),
            "children": children,
        })
    }
}

/// A [`SceneGraph`] shared between a producer thread and the mirror.
#[derive(Debug, Default)]
pub struct SharedScene {
    graph: RwLock<SceneGraph>,
    notifier: Option<TaskSender>,
}

impl SharedScene {
    #[must_use]
    pub fn new(graph: SceneGraph) -> Self {
        Self {
            graph: RwLock::new(graph),
            notifier: None,
        }
    }

    /// Forward notifications to the model thread through `sender`.
    #[must_use]
    pub fn with_notifier(mut self, sender: TaskSender) -> Self {
        self.notifier = Some(sender);
        self
    }

    /// Read access; a poisoned lock still yields the last written state.
    pub fn read(&self) -> RwLockReadGuard<'_, SceneGraph> {
        self.graph.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SceneGraph> {
        self.graph.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate the scene under the write lock.
    ///
    /// With a notifier attached, the notifications produced by `f` are
    /// posted after the lock is released; otherwise they stay queued for
    /// [`take_notifications`](Self::take_notifications).
    pub fn mutate<R>(&self, f: impl FnOnce(&mut SceneGraph) -> R) -> R {
        let (result, notifications) = {
            let mut graph = self.write();
            let result = f(&mut graph);
            let notifications = if self.notifier.is_some() {
                graph.take_notifications()
            } else {
                Vec::new()
            };
            (result, notifications)
        };
        if let Some(sender) = &self.notifier {
            for notification in notifications {
                if sender.post(notification.into()).is_err() {
                    tracing::debug!("model thread gone, dropping scene notifications");
                    break;
                }
            }
        }
        result
    }

    /// Drain notifications held back because no notifier is attached.
    pub fn take_notifications(&self) -> Vec<SceneNotification> {
        self.write().take_notifications()
    }

    /// Signal the end of a producer cycle.
    pub fn cycle_completed(&self) -> MirrorResult<()> {
        match &self.notifier {
            Some(sender) => sender.post(MirrorTask::CycleCompleted),
            None => Ok(()),
        }
    }
}

impl TreeSource for SharedScene {
    fn root(&self) -> Option<Handle> {
        self.read().root()
    }

    fn children(&self, node: Handle) -> Vec<Handle> {
        self.read().children(node).to_vec()
    }

    fn parent(&self, node: Handle) -> Option<Handle> {
        self.read().parent(node)
    }

    fn contains(&self, node: Handle) -> bool {
        self.read().contains(node)
    }

    fn describe(&self, node: Handle) -> Option<NodeInfo> {
        self.read().describe(node)
    }

    fn snapshot(&self) -> LiveSnapshot {
        let graph = self.read();
        match graph.root() {
            Some(root) => LiveSnapshot::capture(root, |h| graph.children(h).to_vec()),
            None => LiveSnapshot::empty(),
        }
    }

    fn snapshot_subtree(&self, node: Handle) -> LiveSnapshot {
        let graph = self.read();
        if graph.contains(node) {
            LiveSnapshot::capture(node, |h| graph.children(h).to_vec())
        } else {
            LiveSnapshot::empty()
        }
    }
}
