#![forbid(unsafe_code)]

//! Error types.
//!
//! None of these are fatal. The engine handles each locally and degrades to
//! a partial view plus a retry; they surface only through pass reports,
//! diagnostics, and [`MirrorResult`] returns at the consumer boundary.

use std::fmt;

use crate::handle::Handle;

/// Conditions detected while mirroring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorError {
    /// A consumer-held handle no longer resolves to a tracked, live node.
    StaleHandle(Handle),
    /// The observed root changed between passes; the model was reset.
    RootReplaced {
        previous: Option<Handle>,
        current: Option<Handle>,
    },
    /// After a diff, the recorded children of `node` did not match the
    /// snapshot; the subtree was re-derived.
    InconsistentSnapshot {
        node: Handle,
        expected: usize,
        actual: usize,
    },
    /// The model-thread queue is gone.
    Disconnected,
}

impl fmt::Display for MirrorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaleHandle(h) => write!(f, "stale handle {h}"),
            Self::RootReplaced { previous, current } => {
                let show = |h: &Option<Handle>| h.map_or_else(|| "none".to_string(), |h| h.to_string());
                write!(f, "root replaced: {} -> {}", show(previous), show(current))
            }
            Self::InconsistentSnapshot {
                node,
                expected,
                actual,
            } => write!(
                f,
                "inconsistent snapshot under {node}: expected {expected} children, recorded {actual}"
            ),
            Self::Disconnected => write!(f, "mirror task queue disconnected"),
        }
    }
}

impl std::error::Error for MirrorError {}

/// Result type for mirror operations.
pub type MirrorResult<T> = Result<T, MirrorError>;
