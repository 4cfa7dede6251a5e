#![forbid(unsafe_code)]

//! Attribute-change coalescing.
//!
//! Attribute changes (visibility, size, focus, ...) can arrive once per
//! frame or per input event. The coalescer keeps one [`AttributeKinds`]
//! accumulator per node and releases them all together when a fixed window
//! elapses.
//!
//! # Invariants
//!
//! - **Union**: a flush reports, per node, every kind recorded since that
//!   node was last flushed.
//! - **Fixed window**: the deadline is armed by the first change after an
//!   idle period and is not pushed back by later changes, so a steady
//!   stream still flushes every `delay`.
//! - **No ghosts**: [`forget`](ChangeCoalescer::forget) drops a node's
//!   pending kinds; the mirror calls it for removed nodes and filters the
//!   flush against the store.
//!
//! Time is passed in explicitly so tests can drive the clock.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use livetree_core::{AttributeKinds, Handle};

#[inline]
fn duration_since_or_zero(now: Instant, earlier: Instant) -> Duration {
    now.checked_duration_since(earlier).unwrap_or(Duration::ZERO)
}

/// Per-node batching of attribute changes.
#[derive(Debug, Clone)]
pub struct ChangeCoalescer {
    delay: Duration,
    pending: BTreeMap<Handle, AttributeKinds>,
    /// When the current window opened; `None` while idle.
    window_start: Option<Instant>,
    recorded: u64,
    flushes: u64,
}

impl ChangeCoalescer {
    /// Coalescer with a fixed window of `delay`.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: BTreeMap::new(),
            window_start: None,
            recorded: 0,
            flushes: 0,
        }
    }

    /// Window length.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Note that `kinds` changed on `node` at `now`.
    pub fn record(&mut self, node: Handle, kinds: AttributeKinds, now: Instant) {
        if kinds.is_empty() {
            return;
        }
        *self.pending.entry(node).or_default() |= kinds;
        self.recorded += 1;
        if self.window_start.is_none() {
            self.window_start = Some(now);
        }
    }

    /// Drop anything pending for `node`.
    pub fn forget(&mut self, node: Handle) {
        self.pending.remove(&node);
        if self.pending.is_empty() {
            self.window_start = None;
        }
    }

    /// Keep only nodes for which `keep` holds.
    pub fn retain(&mut self, mut keep: impl FnMut(Handle) -> bool) {
        self.pending.retain(|&node, _| keep(node));
        if self.pending.is_empty() {
            self.window_start = None;
        }
    }

    /// Whether anything is waiting.
    #[inline]
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of nodes with pending changes.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Pending kinds for `node`.
    #[must_use]
    pub fn pending_for(&self, node: Handle) -> Option<AttributeKinds> {
        self.pending.get(&node).copied()
    }

    /// When the open window closes.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.window_start.map(|start| start + self.delay)
    }

    /// Time left until the open window closes.
    #[must_use]
    pub fn time_until_flush(&self, now: Instant) -> Option<Duration> {
        let start = self.window_start?;
        let elapsed = duration_since_or_zero(now, start);
        Some(self.delay.saturating_sub(elapsed))
    }

    /// Release the batch if the window has elapsed by `now`.
    pub fn flush_due(&mut self, now: Instant) -> Vec<(Handle, AttributeKinds)> {
        match self.window_start {
            Some(start) if duration_since_or_zero(now, start) >= self.delay => self.flush(),
            _ => Vec::new(),
        }
    }

    /// Release the batch now, in handle order.
    pub fn flush(&mut self) -> Vec<(Handle, AttributeKinds)> {
        self.window_start = None;
        if self.pending.is_empty() {
            return Vec::new();
        }
        self.flushes += 1;
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    /// Changes recorded so far.
    #[must_use]
    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    /// Non-empty flushes so far.
    #[must_use]
    pub fn flushes(&self) -> u64 {
        self.flushes
    }
}

impl Default for ChangeCoalescer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_COALESCE_DELAY)
    }
}
