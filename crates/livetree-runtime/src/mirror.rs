#![forbid(unsafe_code)]

//! The model-thread facade.
//!
//! [`Mirror`] owns the mirror store and both synchronizers, and is the
//! only thing consumers talk to. It is single-threaded and
//! non-reentrant: cross-thread triggers reach it as [`MirrorTask`]s
//! drained from a [`TaskQueue`], and every pass runs to completion before
//! the next task is looked at.

use std::sync::Arc;
use std::time::Instant;

use livetree_core::{
    AttributeKinds, Handle, KindRegistry, MirrorError, MirrorResult, MirrorStore, ModelEvent,
    ModelIndex, TreeSource,
};
use tracing::{debug, debug_span, trace, warn};

use crate::coalescer::ChangeCoalescer;
use crate::config::MirrorConfig;
use crate::diagnostics::{DiagnosticEntry, DiagnosticEventKind, DiagnosticLog};
use crate::dispatch::{MirrorTask, TaskQueue};
use crate::guard::{Validity, ValidityGuard};
use crate::incremental::IncrementalMirror;
use crate::model::{COLUMN_COUNT, ModelObserver, ModelView};
use crate::reconciler::SnapshotReconciler;
use crate::sync::{Emitter, PassReport, SyncContext};

/// Result of [`Mirror::tick`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// The resync pass, if one was pending.
    pub pass: Option<PassReport>,
    /// Nodes reported through `DataChanged`.
    pub flushed: usize,
}

/// Live mirror of a [`TreeSource`], exposed as a tree model.
pub struct Mirror<S: TreeSource> {
    source: Arc<S>,
    store: MirrorStore,
    kinds: KindRegistry,
    emitter: Emitter,
    reconciler: SnapshotReconciler,
    incremental: IncrementalMirror,
    coalescer: ChangeCoalescer,
    guard: ValidityGuard,
    config: MirrorConfig,
    resync_requested: bool,
    passes: u64,
    diagnostics: Option<DiagnosticLog>,
}

impl<S: TreeSource> std::fmt::Debug for Mirror<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("root", &self.store.root())
            .field("tracked", &self.store.len())
            .field("passes", &self.passes)
            .field("resync_requested", &self.resync_requested)
            .field("emitter", &self.emitter)
            .finish()
    }
}

impl<S: TreeSource> Mirror<S> {
    /// Mirror `source`. Nothing is tracked until the first pass or
    /// notification.
    pub fn new(source: Arc<S>, config: MirrorConfig) -> Self {
        let diagnostics = config
            .diagnostics
            .then(|| DiagnosticLog::new().with_max_entries(config.max_diagnostic_entries));
        Self {
            source,
            store: MirrorStore::new(),
            kinds: KindRegistry::default(),
            emitter: Emitter::default(),
            reconciler: SnapshotReconciler::new(config.strict_consistency),
            incremental: IncrementalMirror::new(),
            coalescer: ChangeCoalescer::new(config.coalesce_delay),
            guard: ValidityGuard::new(config.validate_live),
            config,
            resync_requested: false,
            passes: 0,
            diagnostics,
        }
    }

    /// Use `kinds` to name node types.
    #[must_use]
    pub fn with_kinds(mut self, kinds: KindRegistry) -> Self {
        self.kinds = kinds;
        self
    }

    /// Register an observer for model notifications.
    pub fn observe(&mut self, observer: Box<dyn ModelObserver>) {
        self.emitter.subscribe(observer);
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.emitter.observer_count()
    }

    /// Notifications delivered since creation.
    #[must_use]
    pub fn events_emitted(&self) -> u64 {
        self.emitter.emitted()
    }

    #[must_use]
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    #[must_use]
    pub fn store(&self) -> &MirrorStore {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    #[must_use]
    pub fn incremental(&self) -> &IncrementalMirror {
        &self.incremental
    }

    #[must_use]
    pub fn coalescer(&self) -> &ChangeCoalescer {
        &self.coalescer
    }

    /// Full passes run so far.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Tree-model view of the current mirror.
    #[must_use]
    pub fn model(&self) -> ModelView<'_> {
        ModelView::new(&self.store, &*self.source, &self.kinds)
    }

    /// Diagnostic log, when enabled.
    #[must_use]
    pub fn diagnostics(&self) -> Option<&DiagnosticLog> {
        self.diagnostics.as_ref()
    }

    /// Whether a validation failure or a point edit asked for a full pass.
    #[must_use]
    pub fn resync_pending(&self) -> bool {
        self.resync_requested
    }

    /// Ask for a full pass on the next [`tick`](Self::tick).
    pub fn request_resync(&mut self) {
        if !self.resync_requested {
            self.resync_requested = true;
            self.record(DiagnosticEntry::new(DiagnosticEventKind::ResyncRequested));
        }
    }

    /// Run a full reconciliation pass against a fresh snapshot.
    pub fn reconcile(&mut self) -> PassReport {
        let span = debug_span!("reconcile", pass = self.passes);
        let _guard = span.enter();
        let start = Instant::now();

        let snapshot = self.source.snapshot();
        let mut ctx = SyncContext::new(
            &mut self.store,
            &*self.source,
            &self.kinds,
            &mut self.emitter,
        )
        .with_live(&snapshot);
        self.reconciler.run(&mut ctx, &snapshot);
        let report = ctx.report;

        self.passes += 1;
        self.resync_requested = false;
        self.forget_untracked();

        let duration_us = start.elapsed().as_micros() as u64;
        debug!(
            removed = report.removed,
            inserted = report.inserted,
            relocated = report.relocated,
            deleted = report.deleted,
            tracked = self.store.len(),
            duration_us,
            "pass complete"
        );
        self.record_report(DiagnosticEventKind::PassCompleted, None, &report, Some(duration_us));
        report
    }

    /// Apply one task.
    pub fn handle(&mut self, task: MirrorTask, now: Instant) -> PassReport {
        match task {
            MirrorTask::CycleCompleted | MirrorTask::Resync => self.reconcile(),
            MirrorTask::EnteredTree(node) => {
                self.notify(node, |mirror, ctx| mirror.entered(ctx, node))
            }
            MirrorTask::LeftTree(node) => self.notify(node, |mirror, ctx| mirror.left(ctx, node)),
            MirrorTask::Reparented(node) => {
                self.notify(node, |mirror, ctx| mirror.reparented(ctx, node))
            }
            MirrorTask::AttributesChanged { node, kinds } => {
                self.attributes_changed(node, kinds, now);
                PassReport::default()
            }
        }
    }

    /// Apply everything queued.
    ///
    /// Point edits and attribute changes apply in arrival order; any number
    /// of pass requests collapse into one pass run after them.
    pub fn drain(&mut self, queue: &TaskQueue, now: Instant) -> PassReport {
        let mut report = PassReport::default();
        let mut pass_due = false;
        for task in queue.drain() {
            if task.schedules_pass() {
                pass_due = true;
            } else {
                report.merge(self.handle(task, now));
            }
        }
        if pass_due {
            report.merge(self.reconcile());
        }
        report
    }

    /// Run a pending resync, then flush attribute changes whose window
    /// has elapsed.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let pass = self.resync_requested.then(|| self.reconcile());
        let batch = self.coalescer.flush_due(now);
        let flushed = self.publish_attributes(batch);
        TickOutcome { pass, flushed }
    }

    /// Flush every pending attribute change immediately.
    pub fn flush_attributes(&mut self) -> usize {
        let batch = self.coalescer.flush();
        self.publish_attributes(batch)
    }

    /// When the driving loop should call [`tick`](Self::tick) next.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.coalescer.next_deadline()
    }

    /// Record an attribute change for a tracked node.
    pub fn attributes_changed(&mut self, node: Handle, kinds: AttributeKinds, now: Instant) {
        if self.store.contains(node) {
            self.coalescer.record(node, kinds, now);
        } else {
            trace!(node = %node, "attribute change for untracked node dropped");
        }
    }

    /// Check a handle held outside a pass.
    ///
    /// A failed check requests a resync, run on the next
    /// [`tick`](Self::tick). The one exception is a handle the mirror never
    /// tracked that is also gone from the source: nothing is out of sync,
    /// so no resync is requested.
    pub fn validate(&mut self, node: Handle) -> bool {
        let validity = self.guard.check(&self.store, &*self.source, node);
        if validity.is_valid() {
            return true;
        }
        warn!(node = %node, reason = validity.as_str(), "stale handle");
        self.record(
            DiagnosticEntry::new(DiagnosticEventKind::StaleHandle)
                .with_node(node)
                .with_context(validity.as_str()),
        );
        if validity != Validity::Untracked || self.source.contains(node) {
            self.request_resync();
        }
        false
    }

    /// Current index of a consumer-held handle, after validation.
    pub fn resolve(&mut self, node: Handle) -> MirrorResult<ModelIndex> {
        if !self.validate(node) {
            return Err(MirrorError::StaleHandle(node));
        }
        self.model()
            .index_for_node(node)
            .ok_or(MirrorError::StaleHandle(node))
    }

    fn notify(
        &mut self,
        node: Handle,
        apply: impl FnOnce(&mut IncrementalMirror, &mut SyncContext<'_>),
    ) -> PassReport {
        let mut ctx = SyncContext::new(
            &mut self.store,
            &*self.source,
            &self.kinds,
            &mut self.emitter,
        );
        apply(&mut self.incremental, &mut ctx);
        let report = ctx.report;

        self.forget_untracked();
        if report.resync_requested {
            self.request_resync();
        }
        if !report.is_noop() {
            self.record_report(DiagnosticEventKind::NotificationApplied, Some(node), &report, None);
        }
        report
    }

    fn publish_attributes(&mut self, batch: Vec<(Handle, AttributeKinds)>) -> usize {
        let mut flushed = 0;
        for (node, kinds) in batch {
            let model = ModelView::new(&self.store, &*self.source, &self.kinds);
            let Some(index) = model.index_for_node(node) else {
                continue;
            };
            let event = ModelEvent::DataChanged {
                index,
                last_column: COLUMN_COUNT - 1,
                kinds,
            };
            self.emitter.emit(&event, &model);
            flushed += 1;
        }
        if flushed > 0 {
            trace!(flushed, "attribute changes flushed");
            let tracked = self.store.len();
            self.record(
                DiagnosticEntry::new(DiagnosticEventKind::AttributesFlushed)
                    .with_tracked(tracked)
                    .with_context(format!("{flushed} nodes")),
            );
        }
        flushed
    }

    fn forget_untracked(&mut self) {
        let store = &self.store;
        self.coalescer.retain(|node| store.contains(node));
    }

    fn record(&mut self, entry: DiagnosticEntry) {
        if let Some(log) = self.diagnostics.as_mut() {
            log.record(entry);
        }
    }

    fn record_report(
        &mut self,
        kind: DiagnosticEventKind,
        node: Option<Handle>,
        report: &PassReport,
        duration_us: Option<u64>,
    ) {
        if self.diagnostics.is_none() {
            return;
        }
        let tracked = self.store.len();
        let mut entry = DiagnosticEntry::new(kind)
            .with_counts(report.removed, report.inserted, report.relocated, report.deleted)
            .with_tracked(tracked);
        if let Some(node) = node {
            entry = entry.with_node(node);
        }
        if let Some(us) = duration_us {
            entry = entry.with_duration_us(us);
        }
        self.record(entry);

        if report.reset {
            self.record(DiagnosticEntry::new(DiagnosticEventKind::ModelReset).with_tracked(tracked));
        }
        for recovered in &report.recovered {
            if let MirrorError::InconsistentSnapshot { node, .. } = recovered {
                self.record(
                    DiagnosticEntry::new(DiagnosticEventKind::InconsistencyRecovered)
                        .with_node(*node)
                        .with_context(recovered.to_string()),
                );
            }
        }
    }
}
