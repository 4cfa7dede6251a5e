#![forbid(unsafe_code)]

//! livetree runtime
//!
//! The synchronizers that keep a row/column tree model in step with a tree
//! owned and mutated by someone else.
//!
//! # Key Components
//!
//! - [`Mirror`] - Model-thread facade owning the mirror store
//! - [`SnapshotReconciler`] - Periodic full-tree diff producing minimal edits
//! - [`IncrementalMirror`] - Point edits from structural notifications
//! - [`ChangeCoalescer`] - Per-node batching of attribute changes
//! - [`ModelView`] - Tree-model contract over the mirror
//! - [`ValidityGuard`] - Liveness checks for handles held by consumers
//! - [`task_channel`] - Funnel from producer threads to the model thread
//!
//! # Role in livetree
//! `livetree-runtime` is the engine. It reads the observed tree through
//! `livetree-core`'s `TreeSource`, keeps a `MirrorStore` current, and
//! notifies [`ModelObserver`]s with begin/end edit pairs. It never mutates
//! the observed tree and never emits a move.

pub mod coalescer;
pub mod config;
pub mod diagnostics;
pub mod dispatch;
pub mod guard;
pub mod incremental;
pub mod mirror;
pub mod model;
pub mod reconciler;
mod sync;

pub use coalescer::ChangeCoalescer;
pub use config::{DEFAULT_COALESCE_DELAY, MirrorConfig};
pub use diagnostics::{DiagnosticEntry, DiagnosticEventKind, DiagnosticLog};
pub use dispatch::{MirrorTask, TaskQueue, TaskSender, task_channel};
pub use guard::{Validity, ValidityGuard};
pub use incremental::IncrementalMirror;
pub use mirror::{Mirror, TickOutcome};
pub use model::{COLUMN_COUNT, DELETED_LABEL, ModelData, ModelObserver, ModelView, Role};
pub use reconciler::SnapshotReconciler;
pub use sync::PassReport;
