#![forbid(unsafe_code)]

//! Simulated observed application and consistency checks for livetree.
//!
//! - [`scene`]: a slot/generation arena scene with a notification feed,
//!   shareable across threads as a [`TreeSource`](livetree_core::TreeSource).
//! - [`replica`]: a consumer that applies model notifications sequentially
//!   and can be compared against the model.
//! - [`storm`]: seeded mutation sequences for the producer thread.
//! - [`driver`]: a producer thread and a model thread running a storm
//!   against a live mirror.
//!
//! # Quick Start
//!
//! ```ignore
//! use livetree_harness::driver::{RunConfig, SyncMode, run};
//!
//! let summary = run(&RunConfig::default().with_mode(SyncMode::Incremental));
//! assert!(summary.is_clean());
//! ```

pub mod driver;
pub mod replica;
pub mod scene;
pub mod storm;

pub use driver::{RunConfig, RunSummary, SyncMode, run};
pub use replica::{ConsumerReplica, ModelShape, SharedReplica, model_shape};
pub use scene::{SceneError, SceneGraph, SceneNotification, SceneResult, SharedScene};
pub use storm::{MutationStorm, SceneOp, StormConfig, populate, storm_seed};
