#![forbid(unsafe_code)]

//! Core: handles, the mirror store, live snapshots, and model types.
//!
//! # Role in livetree
//! `livetree-core` holds everything the synchronizers share without owning
//! any policy: the identity type used for externally-owned nodes, the
//! engine's own record of tree shape, the read-only interface to the
//! observed tree, and the vocabulary of edits and model notifications.
//!
//! # How it fits in the system
//! `livetree-runtime` drives the [`MirrorStore`] from a [`TreeSource`] and
//! publishes [`ModelEvent`]s. Nothing in this crate ever mutates the
//! observed tree.

pub mod edit;
pub mod error;
pub mod handle;
pub mod kind;
pub mod logging;
pub mod snapshot;
pub mod source;
pub mod store;

// Re-export tracing macros at crate root for ergonomic use.
#[cfg(feature = "tracing")]
pub use logging::{debug, trace, warn};

pub use edit::{EditOperation, EditScript, ModelEvent, ModelIndex};
pub use error::{MirrorError, MirrorResult};
pub use handle::Handle;
pub use kind::{AttributeKinds, KindRegistry, NodeFlags, NodeKind, TypeTag};
pub use snapshot::LiveSnapshot;
pub use source::{NodeInfo, TreeSource};
pub use store::MirrorStore;
