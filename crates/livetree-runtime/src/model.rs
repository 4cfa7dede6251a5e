#![forbid(unsafe_code)]

//! Row/column tree-model view over the mirror store.
//!
//! [`ModelView`] is a borrowed, read-only view: it answers the tree-model
//! contract (`row_count`, `index`, `parent`, `data`) from the mirror store
//! and fetches display details for live nodes from the source. Indices it
//! hands out stay valid only until the next structural notification.
//!
//! The invisible top level (`parent == None`) has exactly one row: the
//! tree root.

use livetree_core::{
    Handle, KindRegistry, MirrorStore, ModelEvent, ModelIndex, NodeFlags, NodeKind, TreeSource,
};

/// Number of columns: node, type.
pub const COLUMN_COUNT: usize = 2;

/// Placeholder shown for tracked handles whose node is gone.
pub const DELETED_LABEL: &str = "<deleted>";

/// Data roles a consumer can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Human-readable text for the cell.
    Display,
    /// Resolved node kind.
    Kind,
    /// Whether the row is the tree root.
    IsRoot,
    /// The raw handle behind the row.
    Handle,
    /// State flags reported by the source.
    ItemFlags,
}

/// Value returned by [`ModelView::data`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelData {
    Text(String),
    Kind(NodeKind),
    Bool(bool),
    Handle(Handle),
    Flags(NodeFlags),
}

impl ModelData {
    /// Text payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Receives model notifications as they happen.
///
/// `on_event` runs synchronously while the engine is mid-pass: for
/// "about to" events `model` still shows the old shape, for completed
/// events it shows the new one. Observers must not assume anything about
/// rows outside the notified range.
pub trait ModelObserver {
    fn on_event(&mut self, event: &ModelEvent, model: &ModelView<'_>);
}

impl<F> ModelObserver for F
where
    F: FnMut(&ModelEvent, &ModelView<'_>),
{
    fn on_event(&mut self, event: &ModelEvent, model: &ModelView<'_>) {
        self(event, model);
    }
}

/// Tree-model contract over a [`MirrorStore`].
#[derive(Clone, Copy)]
pub struct ModelView<'a> {
    store: &'a MirrorStore,
    source: &'a dyn TreeSource,
    kinds: &'a KindRegistry,
}

impl std::fmt::Debug for ModelView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelView")
            .field("root", &self.store.root())
            .field("len", &self.store.len())
            .finish()
    }
}

impl<'a> ModelView<'a> {
    /// View `store`, describing nodes through `source` and `kinds`.
    #[must_use]
    pub fn new(store: &'a MirrorStore, source: &'a dyn TreeSource, kinds: &'a KindRegistry) -> Self {
        Self {
            store,
            source,
            kinds,
        }
    }

    /// Underlying store.
    #[must_use]
    pub fn store(&self) -> &'a MirrorStore {
        self.store
    }

    /// Number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        COLUMN_COUNT
    }

    /// Rows under `parent` (`None` = top level).
    #[must_use]
    pub fn row_count(&self, parent: Option<&ModelIndex>) -> usize {
        match parent {
            None => usize::from(self.store.root().is_some()),
            Some(index) if index.column != 0 => 0,
            Some(index) => self.store.children(index.node).len(),
        }
    }

    /// Index of the cell at `row`/`column` under `parent`.
    #[must_use]
    pub fn index(&self, row: usize, column: usize, parent: Option<&ModelIndex>) -> Option<ModelIndex> {
        if column >= COLUMN_COUNT {
            return None;
        }
        let node = match parent {
            None if row == 0 => self.store.root()?,
            None => return None,
            Some(index) => *self.store.children(index.node).get(row)?,
        };
        Some(ModelIndex { row, column, node })
    }

    /// Parent of `index`; `None` for top-level rows and unknown nodes.
    #[must_use]
    pub fn parent(&self, index: &ModelIndex) -> Option<ModelIndex> {
        let parent = self.store.parent(index.node)?;
        self.index_for_node(parent)
    }

    /// Current column-0 index of `node`, if it is reachable in the model.
    #[must_use]
    pub fn index_for_node(&self, node: Handle) -> Option<ModelIndex> {
        if self.store.root() == Some(node) {
            return Some(ModelIndex::new(0, node));
        }
        let parent = self.store.parent(node)?;
        // The parent must itself resolve, otherwise the node is orphaned.
        self.index_for_node(parent)?;
        let row = self.store.children(parent).binary_search(&node).ok()?;
        Some(ModelIndex::new(row, node))
    }

    /// Data for `index` under `role`.
    #[must_use]
    pub fn data(&self, index: &ModelIndex, role: Role) -> Option<ModelData> {
        let node = index.node;
        match role {
            Role::Handle => return Some(ModelData::Handle(node)),
            Role::IsRoot => return Some(ModelData::Bool(self.store.root() == Some(node))),
            _ => {}
        }

        let Some(info) = self.source.describe(node) else {
            return match (role, index.column) {
                (Role::Display, 0) => Some(ModelData::Text(node.address_string())),
                (Role::Display, _) => Some(ModelData::Text(DELETED_LABEL.to_string())),
                _ => None,
            };
        };

        match role {
            Role::Display if index.column == 0 => {
                if info.label.is_empty() {
                    Some(ModelData::Text(node.address_string()))
                } else {
                    Some(ModelData::Text(info.label))
                }
            }
            Role::Display if index.column == 1 => {
                Some(ModelData::Text(self.kinds.type_name(info.type_tag)))
            }
            Role::Kind => Some(ModelData::Kind(self.kinds.resolve(info.type_tag))),
            Role::ItemFlags => Some(ModelData::Flags(info.flags)),
            _ => None,
        }
    }

    /// Column titles.
    #[must_use]
    pub fn header_data(&self, section: usize) -> Option<&'static str> {
        match section {
            0 => Some("Node"),
            1 => Some("Type"),
            _ => None,
        }
    }
}
