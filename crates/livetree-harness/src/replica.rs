#![forbid(unsafe_code)]

//! A model consumer that keeps its own copy of the tree.
//!
//! [`ConsumerReplica`] behaves like a view attached to the model: it never
//! reads the mirror store directly, only the notifications it receives and
//! the [`ModelView`] handed to it alongside them. It applies every edit
//! sequentially using its own row bookkeeping, so if the engine ever emits
//! an edit whose rows are stale, the replica drifts from the model and
//! [`matches`](ConsumerReplica::matches) reports it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use livetree_core::{Handle, ModelEvent, ModelIndex};
use livetree_runtime::{ModelObserver, ModelView};

/// Tree shape as seen through a model: node -> ordered children.
pub type ModelShape = BTreeMap<Handle, Vec<Handle>>;

/// Walk the model from the top level.
#[must_use]
pub fn model_shape(model: &ModelView<'_>) -> ModelShape {
    let mut shape = ModelShape::new();
    let Some(top) = model.index(0, 0, None) else {
        return shape;
    };
    let mut stack = vec![top];
    while let Some(index) = stack.pop() {
        let rows = model.row_count(Some(&index));
        let mut kids = Vec::with_capacity(rows);
        for row in 0..rows {
            if let Some(child) = model.index(row, 0, Some(&index)) {
                kids.push(child.node);
                stack.push(child);
            }
        }
        shape.insert(index.node, kids);
    }
    shape
}

/// A consumer's private copy of the model.
#[derive(Debug, Default)]
pub struct ConsumerReplica {
    root: Option<Handle>,
    children: HashMap<Handle, Vec<Handle>>,
    deleted: BTreeSet<Handle>,
    data_changes: u64,
    resets: u64,
    events: Vec<ModelEvent>,
    mismatches: Vec<String>,
}

impl ConsumerReplica {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one notification.
    pub fn apply(&mut self, event: &ModelEvent, model: &ModelView<'_>) {
        self.events.push(event.clone());
        match event {
            ModelEvent::ModelAboutToBeReset => {}
            ModelEvent::ModelReset => {
                self.resets += 1;
                self.rebuild(model);
            }
            ModelEvent::RowsAboutToBeRemoved {
                parent,
                first,
                last,
            } => self.check_rows(parent.as_ref(), *first, *last, model),
            ModelEvent::RowsRemoved {
                parent,
                first,
                last,
            } => self.remove_rows(parent.as_ref(), *first, *last),
            ModelEvent::RowsAboutToBeInserted {
                parent,
                first,
                ..
            } => {
                let len = self.rows(parent.as_ref()).len();
                if *first > len {
                    self.mismatch(format!("insert at row {first} past end {len}"));
                }
            }
            ModelEvent::RowsInserted {
                parent,
                first,
                last,
            } => self.insert_rows(parent.as_ref(), *first, *last, model),
            ModelEvent::DataChanged { .. } => self.data_changes += 1,
            ModelEvent::NodeDeleted(node) => {
                self.deleted.insert(*node);
            }
        }
    }

    fn rows(&self, parent: Option<&ModelIndex>) -> Vec<Handle> {
        match parent {
            None => self.root.into_iter().collect(),
            Some(index) => self.children.get(&index.node).cloned().unwrap_or_default(),
        }
    }

    fn mismatch(&mut self, message: String) {
        tracing::warn!(%message, "replica mismatch");
        self.mismatches.push(message);
    }

    /// Before a removal the model still shows the old rows; ours must agree.
    fn check_rows(
        &mut self,
        parent: Option<&ModelIndex>,
        first: usize,
        last: usize,
        model: &ModelView<'_>,
    ) {
        let ours = self.rows(parent);
        for row in first..=last {
            let mine = ours.get(row).copied();
            let theirs = model.index(row, 0, parent).map(|i| i.node);
            if mine.is_none() || mine != theirs {
                self.mismatch(format!(
                    "row {row} about to be removed: replica {mine:?}, model {theirs:?}"
                ));
            }
        }
    }

    fn forget_subtree(&mut self, node: Handle) {
        let mut stack = vec![node];
        while let Some(h) = stack.pop() {
            if let Some(kids) = self.children.remove(&h) {
                stack.extend(kids);
            }
        }
    }

    fn remove_rows(&mut self, parent: Option<&ModelIndex>, first: usize, last: usize) {
        let Some(parent) = parent else {
            if let Some(root) = self.root.take() {
                self.forget_subtree(root);
            }
            return;
        };
        let Some(list) = self.children.get_mut(&parent.node) else {
            self.mismatch(format!("remove under unknown parent {}", parent.node));
            return;
        };
        if last >= list.len() || first > last {
            let len = list.len();
            self.mismatch(format!("remove rows {first}..={last} of {len}"));
            return;
        }
        let gone: Vec<Handle> = list.drain(first..=last).collect();
        for node in gone {
            self.forget_subtree(node);
        }
    }

    /// After an insertion the model shows the new rows with their subtrees.
    fn insert_rows(
        &mut self,
        parent: Option<&ModelIndex>,
        first: usize,
        last: usize,
        model: &ModelView<'_>,
    ) {
        let mut fresh = Vec::new();
        for row in first..=last {
            match model.index(row, 0, parent) {
                Some(index) => fresh.push(index),
                None => self.mismatch(format!("inserted row {row} not in model")),
            }
        }
        match parent {
            None => {
                if let Some(index) = fresh.first() {
                    self.root = Some(index.node);
                }
            }
            Some(parent) => {
                let Some(list) = self.children.get_mut(&parent.node) else {
                    self.mismatch(format!("insert under unknown parent {}", parent.node));
                    return;
                };
                if first > list.len() {
                    let len = list.len();
                    self.mismatch(format!("insert at row {first} past end {len}"));
                    return;
                }
                for (offset, index) in fresh.iter().enumerate() {
                    list.insert(first + offset, index.node);
                }
            }
        }
        for index in fresh {
            self.adopt(index, model);
        }
    }

    fn adopt(&mut self, top: ModelIndex, model: &ModelView<'_>) {
        let mut stack = vec![top];
        while let Some(index) = stack.pop() {
            let rows = model.row_count(Some(&index));
            let mut kids = Vec::with_capacity(rows);
            for row in 0..rows {
                if let Some(child) = model.index(row, 0, Some(&index)) {
                    kids.push(child.node);
                    stack.push(child);
                }
            }
            self.children.insert(index.node, kids);
        }
    }

    fn rebuild(&mut self, model: &ModelView<'_>) {
        self.children.clear();
        self.root = None;
        if let Some(top) = model.index(0, 0, None) {
            self.root = Some(top.node);
            self.adopt(top, model);
        }
    }

    /// The replica's shape, in the same form as [`model_shape`].
    #[must_use]
    pub fn shape(&self) -> ModelShape {
        self.children
            .iter()
            .map(|(&node, kids)| (node, kids.clone()))
            .collect()
    }

    /// Whether the replica and `model` show the same tree.
    #[must_use]
    pub fn matches(&self, model: &ModelView<'_>) -> bool {
        self.root == model.index(0, 0, None).map(|i| i.node) && self.shape() == model_shape(model)
    }

    #[must_use]
    pub fn root(&self) -> Option<Handle> {
        self.root
    }

    /// Problems found while applying notifications.
    #[must_use]
    pub fn mismatches(&self) -> &[String] {
        &self.mismatches
    }

    /// Handles reported as deleted.
    #[must_use]
    pub fn deleted(&self) -> &BTreeSet<Handle> {
        &self.deleted
    }

    #[must_use]
    pub fn data_changes(&self) -> u64 {
        self.data_changes
    }

    #[must_use]
    pub fn resets(&self) -> u64 {
        self.resets
    }

    /// Every notification received, in order.
    #[must_use]
    pub fn events(&self) -> &[ModelEvent] {
        &self.events
    }

    /// Drain the received notifications.
    pub fn take_events(&mut self) -> Vec<ModelEvent> {
        std::mem::take(&mut self.events)
    }
}

/// A [`ConsumerReplica`] that can be registered as an observer and still
/// inspected afterwards.
#[derive(Debug, Clone, Default)]
pub struct SharedReplica(Arc<Mutex<ConsumerReplica>>);

impl SharedReplica {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, ConsumerReplica> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Boxed clone for [`Mirror::observe`](livetree_runtime::Mirror::observe).
    #[must_use]
    pub fn observer(&self) -> Box<dyn ModelObserver> {
        Box::new(self.clone())
    }
}

impl ModelObserver for SharedReplica {
    fn on_event(&mut self, event: &ModelEvent, model: &ModelView<'_>) {
        self.lock().apply(event, model);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livetree_core::{KindRegistry, MirrorStore, NodeInfo, TreeSource, TypeTag};

    struct Empty;

    impl TreeSource for Empty {
        fn root(&self) -> Option<Handle> {
            None
        }
        fn children(&self, _node: Handle) -> Vec<Handle> {
            Vec::new()
        }
        fn parent(&self, _node: Handle) -> Option<Handle> {
            None
        }
        fn contains(&self, _node: Handle) -> bool {
            true
        }
        fn describe(&self, _node: Handle) -> Option<NodeInfo> {
            Some(NodeInfo::new("", TypeTag::BASIC))
        }
    }

    fn h(raw: u64) -> Handle {
        Handle::from_raw(raw)
    }

    #[test]
    fn follows_removals_and_insertions() {
        let kinds = KindRegistry::default();
        let mut store = MirrorStore::new();
        store.reset(Some(h(1)));
        store.insert(h(1), h(2));
        store.insert(h(1), h(4));
        store.insert(h(4), h(5));

        let mut replica = ConsumerReplica::new();
        replica.apply(&ModelEvent::ModelReset, &ModelView::new(&store, &Empty, &kinds));
        assert_eq!(replica.root(), Some(h(1)));

        let root = ModelIndex::new(0, h(1));
        let removal = ModelEvent::RowsAboutToBeRemoved {
            parent: Some(root),
            first: 1,
            last: 1,
        };
        replica.apply(&removal, &ModelView::new(&store, &Empty, &kinds));
        store.remove(h(4));
        replica.apply(
            &ModelEvent::RowsRemoved {
                parent: Some(root),
                first: 1,
                last: 1,
            },
            &ModelView::new(&store, &Empty, &kinds),
        );

        store.insert(h(1), h(3));
        store.insert(h(3), h(6));
        replica.apply(
            &ModelEvent::RowsInserted {
                parent: Some(root),
                first: 1,
                last: 1,
            },
            &ModelView::new(&store, &Empty, &kinds),
        );

        let model = ModelView::new(&store, &Empty, &kinds);
        assert!(replica.mismatches().is_empty(), "{:?}", replica.mismatches());
        assert!(replica.matches(&model));
        assert_eq!(replica.shape().get(&h(3)), Some(&vec![h(6)]));
        assert_eq!(replica.events().len(), 4);
    }

    #[test]
    fn stale_removal_is_reported() {
        let kinds = KindRegistry::default();
        let mut store = MirrorStore::new();
        store.reset(Some(h(1)));
        store.insert(h(1), h(2));

        let mut replica = ConsumerReplica::new();
        replica.apply(&ModelEvent::ModelReset, &ModelView::new(&store, &Empty, &kinds));
        replica.apply(
            &ModelEvent::RowsAboutToBeRemoved {
                parent: Some(ModelIndex::new(0, h(1))),
                first: 3,
                last: 3,
            },
            &ModelView::new(&store, &Empty, &kinds),
        );
        assert_eq!(replica.mismatches().len(), 1);
    }

    #[test]
    fn shared_replica_records_deletions() {
        let kinds = KindRegistry::default();
        let store = MirrorStore::new();
        let shared = SharedReplica::new();
        let mut observer = shared.observer();
        observer.on_event(
            &ModelEvent::NodeDeleted(h(9)),
            &ModelView::new(&store, &Empty, &kinds),
        );
        assert!(shared.lock().deleted().contains(&h(9)));
        assert_eq!(shared.lock().take_events().len(), 1);
    }
}
