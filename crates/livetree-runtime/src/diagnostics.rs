#![forbid(unsafe_code)]

//! JSONL diagnostics for mirror activity.
//!
//! When enabled through [`MirrorConfig::diagnostics`](crate::MirrorConfig),
//! the mirror records one [`DiagnosticEntry`] per pass, reset, resync,
//! stale handle, recovered inconsistency and coalescer flush. Entries carry
//! a monotonic sequence number and an FNV-1a checksum of their payload so
//! two runs can be compared line by line.
//!
//! Set `LIVETREE_DETERMINISTIC=true` to derive timestamps from the sequence
//! number instead of the wall clock.

use std::io::Write as _;
use std::sync::OnceLock;
use std::time::Instant;

use livetree_core::Handle;

/// FNV-1a 64-bit offset basis.
const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
/// FNV-1a 64-bit prime.
const FNV_PRIME: u64 = 0x100000001b3;

/// Whether `LIVETREE_DETERMINISTIC` asks for clock-free timestamps.
pub fn is_deterministic_mode() -> bool {
    std::env::var("LIVETREE_DETERMINISTIC")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// What a diagnostic entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticEventKind {
    /// A full reconciliation pass finished.
    PassCompleted,
    /// A structural notification was applied.
    NotificationApplied,
    /// The model was reset.
    ModelReset,
    /// An out-of-band resync was requested.
    ResyncRequested,
    /// A consumer-held handle failed validation.
    StaleHandle,
    /// A diff postcondition failed and the subtree was re-derived.
    InconsistencyRecovered,
    /// Coalesced attribute changes were flushed.
    AttributesFlushed,
}

impl DiagnosticEventKind {
    /// JSONL event name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PassCompleted => "pass_completed",
            Self::NotificationApplied => "notification_applied",
            Self::ModelReset => "model_reset",
            Self::ResyncRequested => "resync_requested",
            Self::StaleHandle => "stale_handle",
            Self::InconsistencyRecovered => "inconsistency_recovered",
            Self::AttributesFlushed => "attributes_flushed",
        }
    }
}

/// One JSONL diagnostic line.
#[derive(Debug, Clone)]
pub struct DiagnosticEntry {
    /// Monotonic sequence number within the log.
    pub seq: u64,
    /// Timestamp in microseconds.
    pub timestamp_us: u64,
    pub kind: DiagnosticEventKind,
    /// Node the entry is about, if any.
    pub node: Option<Handle>,
    pub removed: Option<usize>,
    pub inserted: Option<usize>,
    pub relocated: Option<usize>,
    pub deleted: Option<usize>,
    /// Tracked handles after the event.
    pub tracked: Option<usize>,
    pub duration_us: Option<u64>,
    /// Free-form detail.
    pub context: Option<String>,
    /// Checksum for determinism verification.
    pub checksum: u64,
}

impl DiagnosticEntry {
    /// Entry of `kind` with every optional field unset.
    pub fn new(kind: DiagnosticEventKind) -> Self {
        Self {
            seq: 0,
            timestamp_us: 0,
            kind,
            node: None,
            removed: None,
            inserted: None,
            relocated: None,
            deleted: None,
            tracked: None,
            duration_us: None,
            context: None,
            checksum: 0,
        }
    }

    #[must_use]
    pub fn with_node(mut self, node: Handle) -> Self {
        self.node = Some(node);
        self
    }

    /// Set the edit counters.
    #[must_use]
    pub fn with_counts(mut self, removed: usize, inserted: usize, relocated: usize, deleted: usize) -> Self {
        self.removed = Some(removed);
        self.inserted = Some(inserted);
        self.relocated = Some(relocated);
        self.deleted = Some(deleted);
        self
    }

    #[must_use]
    pub fn with_tracked(mut self, tracked: usize) -> Self {
        self.tracked = Some(tracked);
        self
    }

    #[must_use]
    pub fn with_duration_us(mut self, duration_us: u64) -> Self {
        self.duration_us = Some(duration_us);
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// FNV-1a hash of the payload (sequence and timestamp excluded).
    fn compute_checksum(&self) -> u64 {
        let payload = format!(
            "{:?}{:?}{:?}{:?}{:?}{:?}{:?}{:?}",
            self.kind,
            self.node.map(Handle::raw),
            self.removed,
            self.inserted,
            self.relocated,
            self.deleted,
            self.tracked,
            self.context.as_deref().unwrap_or("")
        );
        let mut hash = FNV_OFFSET_BASIS;
        for &b in payload.as_bytes() {
            hash ^= u64::from(b);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }

    /// Format as one JSONL line.
    pub fn to_jsonl(&self) -> String {
        let mut parts = vec![
            format!("\"seq\":{}", self.seq),
            format!("\"ts_us\":{}", self.timestamp_us),
            format!("\"kind\":\"{}\"", self.kind.as_str()),
        ];
        if let Some(node) = self.node {
            parts.push(format!("\"node\":\"{node}\""));
        }
        for (name, value) in [
            ("removed", self.removed),
            ("inserted", self.inserted),
            ("relocated", self.relocated),
            ("deleted", self.deleted),
            ("tracked", self.tracked),
        ] {
            if let Some(value) = value {
                parts.push(format!("\"{name}\":{value}"));
            }
        }
        if let Some(us) = self.duration_us {
            parts.push(format!("\"duration_us\":{us}"));
        }
        if let Some(context) = &self.context {
            let escaped = context.replace('\\', "\\\\").replace('"', "\\\"");
            parts.push(format!("\"context\":\"{escaped}\""));
        }
        parts.push(format!("\"checksum\":\"{:016x}\"", self.checksum));
        format!("{{{}}}", parts.join(","))
    }
}

/// Bounded collector of diagnostic entries.
#[derive(Debug)]
pub struct DiagnosticLog {
    entries: Vec<DiagnosticEntry>,
    max_entries: usize,
    next_seq: u64,
    deterministic: bool,
    write_stderr: bool,
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticLog {
    /// Log keeping up to 5000 entries.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            max_entries: 5000,
            next_seq: 0,
            deterministic: is_deterministic_mode(),
            write_stderr: false,
        }
    }

    /// Keep at most `max` entries (0 = unbounded).
    #[must_use]
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Force deterministic timestamps on or off.
    #[must_use]
    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    /// Echo every entry to stderr as it is recorded.
    #[must_use]
    pub fn with_stderr(mut self) -> Self {
        self.write_stderr = true;
        self
    }

    /// Stamp and store `entry`, evicting the oldest one when full.
    pub fn record(&mut self, mut entry: DiagnosticEntry) {
        entry.seq = self.next_seq;
        self.next_seq += 1;
        entry.timestamp_us = if self.deterministic {
            entry.seq.saturating_mul(1_000)
        } else {
            static START: OnceLock<Instant> = OnceLock::new();
            let start = START.get_or_init(Instant::now);
            start.elapsed().as_micros() as u64
        };
        entry.checksum = entry.compute_checksum();

        if self.write_stderr {
            let _ = writeln!(std::io::stderr(), "{}", entry.to_jsonl());
        }
        if self.max_entries > 0 && self.entries.len() >= self.max_entries {
            self.entries.remove(0);
        }
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[DiagnosticEntry] {
        &self.entries
    }

    pub fn entries_of_kind(&self, kind: DiagnosticEventKind) -> Vec<&DiagnosticEntry> {
        self.entries.iter().filter(|e| e.kind == kind).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// All entries, one JSON object per line.
    pub fn to_jsonl(&self) -> String {
        self.entries
            .iter()
            .map(DiagnosticEntry::to_jsonl)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
