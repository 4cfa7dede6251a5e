#![forbid(unsafe_code)]

//! Shared plumbing for the two synchronizers.
//!
//! [`SyncContext`] bundles everything a synchronizer touches during one
//! step: the mirror store, the read-only source, the observers, and the
//! report being built. Its helpers are the only places that both mutate the
//! store and notify observers, so every begin/end pair brackets exactly one
//! store mutation.

use std::collections::HashMap;

use livetree_core::{
    EditOperation, EditScript, Handle, KindRegistry, LiveSnapshot, MirrorError, MirrorStore,
    ModelEvent, ModelIndex, TreeSource,
};
use tracing::{trace, warn};

use crate::model::{ModelObserver, ModelView};

/// Outcome of one synchronization step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Structural edits, in emission order.
    pub script: EditScript,
    /// Rows removed (top-level rows of each removal, not pruned descendants).
    pub removed: usize,
    /// Rows inserted.
    pub inserted: usize,
    /// Tracked nodes moved to a new parent.
    pub relocated: usize,
    /// `NodeDeleted` notifications sent.
    pub deleted: usize,
    /// Whether the model was reset.
    pub reset: bool,
    /// Set when the step could not finish and wants a full pass.
    pub resync_requested: bool,
    /// Conditions detected and recovered from.
    pub recovered: Vec<MirrorError>,
}

impl PassReport {
    /// Whether the step left the model untouched.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.script.is_empty() && !self.reset
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: PassReport) {
        for op in other.script {
            self.script.push(op);
        }
        self.removed += other.removed;
        self.inserted += other.inserted;
        self.relocated += other.relocated;
        self.deleted += other.deleted;
        self.reset |= other.reset;
        self.resync_requested |= other.resync_requested;
        self.recovered.extend(other.recovered);
    }
}

/// Registered observers.
#[derive(Default)]
pub(crate) struct Emitter {
    observers: Vec<Box<dyn ModelObserver>>,
    emitted: u64,
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("observers", &self.observers.len())
            .field("emitted", &self.emitted)
            .finish()
    }
}

impl Emitter {
    pub(crate) fn subscribe(&mut self, observer: Box<dyn ModelObserver>) {
        self.observers.push(observer);
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Total notifications delivered so far.
    pub(crate) fn emitted(&self) -> u64 {
        self.emitted
    }

    pub(crate) fn emit(&mut self, event: &ModelEvent, model: &ModelView<'_>) {
        self.emitted += 1;
        for observer in &mut self.observers {
            observer.on_event(event, model);
        }
    }
}

pub(crate) struct SyncContext<'a> {
    pub store: &'a mut MirrorStore,
    pub source: &'a dyn TreeSource,
    pub kinds: &'a KindRegistry,
    pub emitter: &'a mut Emitter,
    /// Liveness oracle for the step; falls back to the source when unset.
    pub live: Option<&'a LiveSnapshot>,
    pub report: PassReport,
    /// Last known row of each parent an edit was emitted under.
    rows: HashMap<Handle, usize>,
    /// Store row searches made for parent indexes.
    pub row_lookups: usize,
}

impl<'a> SyncContext<'a> {
    pub(crate) fn new(
        store: &'a mut MirrorStore,
        source: &'a dyn TreeSource,
        kinds: &'a KindRegistry,
        emitter: &'a mut Emitter,
    ) -> Self {
        Self {
            store,
            source,
            kinds,
            emitter,
            live: None,
            report: PassReport::default(),
            rows: HashMap::new(),
            row_lookups: 0,
        }
    }

    #[must_use]
    pub(crate) fn with_live(mut self, live: &'a LiveSnapshot) -> Self {
        self.live = Some(live);
        self
    }

    pub(crate) fn is_live(&self, h: Handle) -> bool {
        match self.live {
            Some(snapshot) => snapshot.contains(h),
            None => self.source.contains(h),
        }
    }

    fn emit(&mut self, event: ModelEvent) {
        let model = ModelView::new(&*self.store, self.source, self.kinds);
        self.emitter.emit(&event, &model);
    }

    /// Model index of a tracked parent.
    ///
    /// A remembered row is reused while the handle still sits at it, so a
    /// node with several edits is searched for once unless its own row
    /// shifted in between.
    fn parent_index(&mut self, parent: Handle) -> Option<ModelIndex> {
        if let Some(&row) = self.rows.get(&parent)
            && self.still_at(parent, row)
        {
            return Some(ModelIndex::new(row, parent));
        }
        self.row_lookups += 1;
        match self.store.index_of(parent) {
            Some(row) => {
                self.rows.insert(parent, row);
                Some(ModelIndex::new(row, parent))
            }
            None => {
                self.rows.remove(&parent);
                None
            }
        }
    }

    fn still_at(&self, h: Handle, row: usize) -> bool {
        if self.store.root() == Some(h) {
            return row == 0;
        }
        self.store
            .parent(h)
            .is_some_and(|p| self.store.children(p).get(row) == Some(&h))
    }

    fn announce_deleted(&mut self, pruned: &[Handle]) {
        for &h in pruned {
            if !self.store.contains(h) && !self.is_live(h) {
                self.emit(ModelEvent::NodeDeleted(h));
                self.report.deleted += 1;
            }
        }
    }

    /// Remove rows `first..=last` under `parent` and prune their subtrees.
    pub(crate) fn remove_rows(&mut self, parent: Handle, first: usize, last: usize) {
        let Some(victims) = self.store.children(parent).get(first..=last) else {
            warn!(%parent, first, last, "removal outside recorded rows skipped");
            return;
        };
        let victims = victims.to_vec();
        let parent_index = self.parent_index(parent);

        self.emit(ModelEvent::RowsAboutToBeRemoved {
            parent: parent_index,
            first,
            last,
        });
        let mut pruned = Vec::new();
        for h in victims {
            pruned.extend(self.store.remove(h));
        }
        self.emit(ModelEvent::RowsRemoved {
            parent: parent_index,
            first,
            last,
        });

        trace!(%parent, first, last, pruned = pruned.len(), "rows removed");
        self.report
            .script
            .push(EditOperation::Remove { parent, first, last });
        self.report.removed += last - first + 1;
        self.announce_deleted(&pruned);
    }

    /// Remove a tracked non-root node from wherever it currently sits.
    pub(crate) fn remove_node(&mut self, h: Handle) -> bool {
        let Some(parent) = self.store.parent(h) else {
            return false;
        };
        let Some(row) = self.store.index_of(h) else {
            return false;
        };
        self.remove_rows(parent, row, row);
        true
    }

    /// Insert `handles` (consecutive once sorted in) under `parent` starting
    /// at `first`, filling their subtrees from `fill` without notifications.
    pub(crate) fn insert_rows(
        &mut self,
        parent: Handle,
        first: usize,
        handles: &[Handle],
        fill: &LiveSnapshot,
    ) {
        if handles.is_empty() {
            return;
        }
        let last = first + handles.len() - 1;
        let parent_index = self.parent_index(parent);

        self.emit(ModelEvent::RowsAboutToBeInserted {
            parent: parent_index,
            first,
            last,
        });
        for &h in handles {
            self.store.insert(parent, h);
            self.populate(h, fill);
        }
        debug_assert_eq!(
            self.store.children(parent).get(first..=last),
            Some(handles),
            "inserted rows are not contiguous"
        );
        self.emit(ModelEvent::RowsInserted {
            parent: parent_index,
            first,
            last,
        });

        trace!(%parent, first, last, "rows inserted");
        self.report.script.push(EditOperation::Insert {
            parent,
            first,
            handles: handles.to_vec(),
        });
        self.report.inserted += handles.len();
    }

    /// Move a tracked node, subtree included, under `parent`.
    ///
    /// Reported as a removal at the old location followed by an insertion
    /// at the new one.
    pub(crate) fn relocate(&mut self, h: Handle, parent: Handle) -> bool {
        let Some(from) = self.store.parent(h) else {
            return false;
        };
        let Some(old_row) = self.store.index_of(h) else {
            return false;
        };
        let from_index = self.parent_index(from);

        self.emit(ModelEvent::RowsAboutToBeRemoved {
            parent: from_index,
            first: old_row,
            last: old_row,
        });
        self.store.detach(h);
        self.emit(ModelEvent::RowsRemoved {
            parent: from_index,
            first: old_row,
            last: old_row,
        });
        self.report.script.push(EditOperation::remove(from, old_row));
        self.report.removed += 1;

        let row = self.store.insertion_row(parent, h);
        let parent_index = self.parent_index(parent);
        self.emit(ModelEvent::RowsAboutToBeInserted {
            parent: parent_index,
            first: row,
            last: row,
        });
        self.store.attach(parent, h);
        self.emit(ModelEvent::RowsInserted {
            parent: parent_index,
            first: row,
            last: row,
        });
        self.report.script.push(EditOperation::insert(parent, row, h));
        self.report.inserted += 1;
        self.report.relocated += 1;

        trace!(node = %h, %from, to = %parent, "relocated");
        true
    }

    /// Remove every tracked node that `fill` places below one of `roots`.
    ///
    /// Returns whether anything was removed.
    pub(crate) fn evict_tracked(&mut self, roots: &[Handle], fill: &LiveSnapshot) -> bool {
        let mut evicted = false;
        for &root in roots {
            for h in fill.descendants(root) {
                if self.store.contains(h) && self.remove_node(h) {
                    self.report.relocated += 1;
                    evicted = true;
                }
            }
        }
        evicted
    }

    /// Replace the whole model with `root` and its subtree from `fill`.
    pub(crate) fn reset(&mut self, root: Option<Handle>, fill: &LiveSnapshot) {
        let previous: Vec<Handle> = match self.store.root() {
            Some(old) => std::iter::once(old)
                .chain(self.store.descendants(old))
                .collect(),
            None => Vec::new(),
        };

        self.emit(ModelEvent::ModelAboutToBeReset);
        self.store.reset(root);
        if let Some(root) = root {
            self.populate(root, fill);
        }
        self.emit(ModelEvent::ModelReset);

        self.report.reset = true;
        self.announce_deleted(&previous);
    }

    fn populate(&mut self, h: Handle, fill: &LiveSnapshot) {
        for node in fill.descendants(h) {
            let Some(parent) = fill.parent(node) else {
                continue;
            };
            if self.store.contains(node) {
                warn!(node = %node, "already tracked during populate; skipped");
                continue;
            }
            if self.store.contains(parent) {
                self.store.insert(parent, node);
            }
        }
    }
}
