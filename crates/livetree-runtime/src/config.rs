#![forbid(unsafe_code)]

//! Mirror configuration.
//!
//! # Environment
//!
//! | Variable | Field | Format |
//! |----------|-------|--------|
//! | `LIVETREE_COALESCE_MS` | `coalesce_delay` | integer milliseconds |
//! | `LIVETREE_STRICT` | `strict_consistency` | `1` / `true` / `0` / `false` |
//! | `LIVETREE_DIAGNOSTICS` | `diagnostics` | `1` / `true` / `0` / `false` |
//! | `LIVETREE_MAX_DIAGNOSTICS` | `max_diagnostic_entries` | integer |
//!
//! Unparseable values are ignored and the default is kept.

use std::time::Duration;

/// Default coalescing window for attribute changes.
pub const DEFAULT_COALESCE_DELAY: Duration = Duration::from_millis(500);

/// Configuration for a [`Mirror`](crate::Mirror).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    /// Fixed delay between the first attribute change after an idle period
    /// and the batched flush.
    pub coalesce_delay: Duration,

    /// Panic when a diff postcondition fails instead of re-deriving the
    /// affected subtree. Defaults to on in debug builds.
    pub strict_consistency: bool,

    /// Consult the live source (not only the mirror) when validating
    /// consumer-held handles.
    pub validate_live: bool,

    /// Record JSONL diagnostics for passes, resets, and flushes.
    pub diagnostics: bool,

    /// Bound on retained diagnostic entries (0 = unbounded).
    pub max_diagnostic_entries: usize,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            coalesce_delay: DEFAULT_COALESCE_DELAY,
            strict_consistency: cfg!(debug_assertions),
            validate_live: true,
            diagnostics: false,
            max_diagnostic_entries: 5000,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    if value == "1" || value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value == "0" || value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

impl MirrorConfig {
    /// Defaults overridden by `LIVETREE_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by values from `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(ms) = lookup("LIVETREE_COALESCE_MS").and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.coalesce_delay = Duration::from_millis(ms);
        }
        if let Some(strict) = lookup("LIVETREE_STRICT").and_then(|v| parse_flag(v.trim())) {
            config.strict_consistency = strict;
        }
        if let Some(enabled) = lookup("LIVETREE_DIAGNOSTICS").and_then(|v| parse_flag(v.trim())) {
            config.diagnostics = enabled;
        }
        if let Some(max) =
            lookup("LIVETREE_MAX_DIAGNOSTICS").and_then(|v| v.trim().parse::<usize>().ok())
        {
            config.max_diagnostic_entries = max;
        }
        config
    }

    /// Set the coalescing window.
    #[must_use]
    pub fn with_coalesce_delay(mut self, delay: Duration) -> Self {
        self.coalesce_delay = delay;
        self
    }

    /// Choose between panicking and re-deriving on a failed postcondition.
    #[must_use]
    pub fn with_strict_consistency(mut self, strict: bool) -> Self {
        self.strict_consistency = strict;
        self
    }

    /// Enable or disable consulting the live source during validation.
    #[must_use]
    pub fn with_validate_live(mut self, enabled: bool) -> Self {
        self.validate_live = enabled;
        self
    }

    /// Enable or disable diagnostics.
    #[must_use]
    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    /// Bound the diagnostic log.
    #[must_use]
    pub fn with_max_diagnostic_entries(mut self, max: usize) -> Self {
        self.max_diagnostic_entries = max;
        self
    }
}
