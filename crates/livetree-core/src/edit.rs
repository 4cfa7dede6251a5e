#![forbid(unsafe_code)]

//! Edit scripts and model notifications.
//!
//! A pass produces an [`EditScript`]: the ordered remove/insert operations
//! that turn the previous mirror into the current one. The same edits reach
//! consumers as begin/end [`ModelEvent`] pairs addressed by [`ModelIndex`].
//! There is no move operation; a relocation is always a
//! remove followed later by an insert.

use crate::handle::Handle;
use crate::kind::AttributeKinds;

/// Address of a cell in the tree model.
///
/// Valid only until the next structural notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelIndex {
    /// Row under the parent.
    pub row: usize,
    /// Column.
    pub column: usize,
    /// Node shown in this row.
    pub node: Handle,
}

impl ModelIndex {
    /// Column-0 index of `node` at `row`.
    #[must_use]
    pub const fn new(row: usize, node: Handle) -> Self {
        Self {
            row,
            column: 0,
            node,
        }
    }

    /// Same row, different column.
    #[must_use]
    pub const fn sibling_column(self, column: usize) -> Self {
        Self { column, ..self }
    }
}

/// One structural edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOperation {
    /// Rows `first..=last` under `parent` went away.
    Remove {
        parent: Handle,
        first: usize,
        last: usize,
    },
    /// `handles` appeared under `parent`, starting at row `first`.
    Insert {
        parent: Handle,
        first: usize,
        handles: Vec<Handle>,
    },
}

impl EditOperation {
    /// Single-row removal.
    #[must_use]
    pub fn remove(parent: Handle, row: usize) -> Self {
        Self::Remove {
            parent,
            first: row,
            last: row,
        }
    }

    /// Single-row insertion.
    #[must_use]
    pub fn insert(parent: Handle, row: usize, handle: Handle) -> Self {
        Self::Insert {
            parent,
            first: row,
            handles: vec![handle],
        }
    }

    /// Parent the edit applies to.
    #[must_use]
    pub fn parent(&self) -> Handle {
        match self {
            Self::Remove { parent, .. } | Self::Insert { parent, .. } => *parent,
        }
    }

    /// Number of rows touched.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Remove { first, last, .. } => last - first + 1,
            Self::Insert { handles, .. } => handles.len(),
        }
    }

    /// Whether the edit touches no rows (never produced by the engine).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this is a removal.
    #[must_use]
    pub fn is_remove(&self) -> bool {
        matches!(self, Self::Remove { .. })
    }
}

/// Ordered edits of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditScript {
    ops: Vec<EditOperation>,
}

impl EditScript {
    /// Empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an edit.
    pub fn push(&mut self, op: EditOperation) {
        self.ops.push(op);
    }

    /// Edits in emission order.
    #[must_use]
    pub fn ops(&self) -> &[EditOperation] {
        &self.ops
    }

    /// Number of edits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the pass changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Total rows removed.
    #[must_use]
    pub fn removed_rows(&self) -> usize {
        self.ops.iter().filter(|op| op.is_remove()).map(EditOperation::len).sum()
    }

    /// Total rows inserted.
    #[must_use]
    pub fn inserted_rows(&self) -> usize {
        self.ops.iter().filter(|op| !op.is_remove()).map(EditOperation::len).sum()
    }

    /// Drain the edits, leaving the script empty.
    pub fn take(&mut self) -> Vec<EditOperation> {
        std::mem::take(&mut self.ops)
    }
}

impl IntoIterator for EditScript {
    type Item = EditOperation;
    type IntoIter = std::vec::IntoIter<EditOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

/// Notification delivered to model consumers.
///
/// `parent: None` addresses the invisible top level, whose only row is the
/// tree root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    /// Rows are about to disappear; the model still shows them.
    RowsAboutToBeRemoved {
        parent: Option<ModelIndex>,
        first: usize,
        last: usize,
    },
    /// Rows are gone.
    RowsRemoved {
        parent: Option<ModelIndex>,
        first: usize,
        last: usize,
    },
    /// Rows are about to appear.
    RowsAboutToBeInserted {
        parent: Option<ModelIndex>,
        first: usize,
        last: usize,
    },
    /// Rows are present; the model now shows them and their subtrees.
    RowsInserted {
        parent: Option<ModelIndex>,
        first: usize,
        last: usize,
    },
    /// Everything is about to be discarded.
    ModelAboutToBeReset,
    /// The model was rebuilt from scratch.
    ModelReset,
    /// Attributes of one row changed.
    DataChanged {
        index: ModelIndex,
        last_column: usize,
        kinds: AttributeKinds,
    },
    /// The node behind a handle no longer exists.
    NodeDeleted(Handle),
}

impl ModelEvent {
    /// Whether this event changes the shape of the model.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::DataChanged { .. } | Self::NodeDeleted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(raw: u64) -> Handle {
        Handle::from_raw(raw)
    }

    #[test]
    fn script_counts_rows() {
        let mut script = EditScript::new();
        script.push(EditOperation::Remove {
            parent: h(1),
            first: 2,
            last: 4,
        });
        script.push(EditOperation::Insert {
            parent: h(1),
            first: 0,
            handles: vec![h(5), h(6)],
        });
        script.push(EditOperation::insert(h(5), 0, h(9)));
        assert_eq!(script.len(), 3);
        assert_eq!(script.removed_rows(), 3);
        assert_eq!(script.inserted_rows(), 3);
        assert_eq!(script.ops()[2].parent(), h(5));
    }

    #[test]
    fn single_row_helpers() {
        assert_eq!(EditOperation::remove(h(1), 3).len(), 1);
        assert!(EditOperation::remove(h(1), 3).is_remove());
        assert!(!EditOperation::insert(h(1), 0, h(2)).is_remove());
    }

    #[test]
    fn structural_classification() {
        assert!(ModelEvent::ModelReset.is_structural());
        assert!(!ModelEvent::NodeDeleted(h(1)).is_structural());
        let idx = ModelIndex::new(0, h(1));
        assert_eq!(idx.sibling_column(1).column, 1);
    }
}
