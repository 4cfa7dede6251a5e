#![forbid(unsafe_code)]

//! livetree public facade crate.
//!
//! Keeps a row/column tree model in step with a tree owned and mutated by
//! another part of the program. This crate re-exports the types most
//! consumers touch and offers a prelude for day-to-day usage.
//!
//! ```ignore
//! use livetree::prelude::*;
//!
//! let mut mirror = Mirror::new(source, MirrorConfig::from_env());
//! mirror.observe(Box::new(my_view));
//! mirror.reconcile();
//! ```

// --- Core re-exports -------------------------------------------------------

pub use livetree_core::{
    AttributeKinds, EditOperation, EditScript, Handle, KindRegistry, LiveSnapshot, MirrorError,
    MirrorResult, MirrorStore, ModelEvent, ModelIndex, NodeFlags, NodeInfo, NodeKind,
    TreeSource, TypeTag,
};

// --- Runtime re-exports ----------------------------------------------------

pub use livetree_runtime::{
    COLUMN_COUNT, ChangeCoalescer, DELETED_LABEL, DiagnosticEntry, DiagnosticEventKind,
    DiagnosticLog, IncrementalMirror, Mirror, MirrorConfig, MirrorTask, ModelData, ModelObserver,
    ModelView, PassReport, Role, SnapshotReconciler, TaskQueue, TaskSender, TickOutcome, Validity,
    ValidityGuard, task_channel,
};

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        Handle, Mirror, MirrorConfig, MirrorError, MirrorResult, MirrorTask, ModelData,
        ModelEvent, ModelIndex, ModelObserver, ModelView, NodeInfo, Role, TaskSender, TreeSource,
        task_channel,
    };

    pub use crate::{core, runtime};
}

pub use livetree_core as core;
pub use livetree_runtime as runtime;
