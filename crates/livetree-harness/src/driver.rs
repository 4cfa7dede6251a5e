#![forbid(unsafe_code)]

//! Two-thread run of a mutation storm against a live mirror.
//!
//! The producer thread plays the observed application: it applies one
//! storm frame per cycle to the shared scene and then signals the end of
//! the cycle. The calling thread plays the model thread: it owns the
//! [`Mirror`], waits on the task queue with a timeout derived from the
//! coalescer deadline, and ticks the mirror between tasks. A
//! [`SharedReplica`] follows every notification so the run can check that
//! a sequential consumer ends up showing the same tree as the model.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use livetree_core::MirrorError;
use livetree_runtime::{Mirror, MirrorConfig, MirrorTask, TaskSender, task_channel};
use serde_json::{Value, json};
use tracing::{debug, error, info, info_span};

use crate::replica::{SharedReplica, model_shape};
use crate::scene::{SceneGraph, SceneNotification, SharedScene};
use crate::storm::{MutationStorm, StormConfig, populate};

/// Longest the model thread sleeps when no flush is due.
const IDLE_WAIT: Duration = Duration::from_millis(5);

/// How the mirror learns about structural changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Reconcile on every cycle-completion signal.
    #[default]
    Periodic,
    /// Apply structural notifications as point edits, reconciling on
    /// cycle completion as well.
    Incremental,
}

impl SyncMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Periodic => "periodic",
            Self::Incremental => "incremental",
        }
    }
}

/// Everything a run needs.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub storm: StormConfig,
    pub mirror: MirrorConfig,
    pub mode: SyncMode,
    /// Children per node in the initial scene.
    pub initial_breadth: usize,
    /// Levels in the initial scene.
    pub initial_depth: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            storm: StormConfig::default(),
            mirror: MirrorConfig::default(),
            mode: SyncMode::default(),
            initial_breadth: 4,
            initial_depth: 3,
        }
    }
}

impl RunConfig {
    #[must_use]
    pub fn with_storm(mut self, storm: StormConfig) -> Self {
        self.storm = storm;
        self
    }

    #[must_use]
    pub fn with_mirror(mut self, mirror: MirrorConfig) -> Self {
        self.mirror = mirror;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_initial_shape(mut self, breadth: usize, depth: usize) -> Self {
        self.initial_breadth = breadth;
        self.initial_depth = depth;
        self
    }
}

/// What a run observed.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub mode: SyncMode,
    pub seed: u64,
    pub frames: usize,
    /// Ops that changed the scene.
    pub ops_applied: usize,
    pub passes: u64,
    pub notifications_applied: u64,
    pub events: u64,
    /// Nodes tracked by the mirror at the end.
    pub tracked: usize,
    /// Live nodes in the scene at the end.
    pub live: usize,
    /// The closing pass found nothing to change.
    pub converged: bool,
    /// The replica shows the same tree as the model.
    pub replica_matches: bool,
    /// Store invariant violation, if any.
    pub invariant_error: Option<String>,
    pub mismatches: Vec<String>,
    pub deleted: usize,
    pub data_changes: u64,
    /// JSONL diagnostics, when enabled.
    pub diagnostics: Option<String>,
    /// Final scene in paint order.
    pub scene: Value,
}

impl RunSummary {
    /// Whether the run ended fully consistent.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.converged
            && self.replica_matches
            && self.invariant_error.is_none()
            && self.mismatches.is_empty()
            && self.tracked == self.live
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "mode": self.mode.as_str(),
            "seed": self.seed,
            "frames": self.frames,
            "ops_applied": self.ops_applied,
            "passes": self.passes,
            "notifications_applied": self.notifications_applied,
            "events": self.events,
            "tracked": self.tracked,
            "live": self.live,
            "converged": self.converged,
            "replica_matches": self.replica_matches,
            "invariant_error": self.invariant_error,
            "mismatches": self.mismatches,
            "deleted": self.deleted,
            "data_changes": self.data_changes,
            "clean": self.is_clean(),
        })
    }
}

/// Forward what the periodic mode still wants from the feed.
fn forward_attributes(scene: &SharedScene, sender: &TaskSender) -> Result<(), MirrorError> {
    for notification in scene.take_notifications() {
        if let SceneNotification::Attributes { .. } = notification {
            sender.post(notification.into())?;
        }
    }
    Ok(())
}

/// Run `config` to completion.
pub fn run(config: &RunConfig) -> RunSummary {
    let span = info_span!("run", mode = config.mode.as_str(), seed = config.storm.seed);
    let _guard = span.enter();

    let mut graph = SceneGraph::new();
    populate(&mut graph, config.initial_breadth, config.initial_depth);
    graph.take_notifications();

    let (sender, queue) = task_channel();
    let scene = match config.mode {
        SyncMode::Periodic => SharedScene::new(graph),
        SyncMode::Incremental => SharedScene::new(graph).with_notifier(sender.clone()),
    };
    let scene = Arc::new(scene);

    let mut mirror = Mirror::new(Arc::clone(&scene), config.mirror.clone());
    let replica = SharedReplica::new();
    mirror.observe(replica.observer());
    mirror.reconcile();

    let storm_config = config.storm.clone();
    let frames = MutationStorm::new(storm_config.clone()).into_frames();
    let frame_count = frames.len();
    let producer_scene = Arc::clone(&scene);
    let mode = config.mode;
    let producer = thread::spawn(move || {
        let mut applied = 0;
        for frame in &frames {
            applied += producer_scene
                .mutate(|g| MutationStorm::apply_frame(&storm_config, frame, g));
            let posted = match mode {
                SyncMode::Periodic => forward_attributes(&producer_scene, &sender)
                    .and_then(|()| sender.post(MirrorTask::CycleCompleted)),
                SyncMode::Incremental => producer_scene.cycle_completed(),
            };
            if posted.is_err() {
                debug!("model thread gone, producer stopping");
                break;
            }
            if !storm_config.frame_interval.is_zero() {
                thread::sleep(storm_config.frame_interval);
            }
        }
        applied
    });

    loop {
        let timeout = mirror
            .next_deadline()
            .map_or(IDLE_WAIT, |deadline| {
                deadline.saturating_duration_since(Instant::now()).min(IDLE_WAIT)
            });
        match queue.wait_timeout(timeout) {
            Ok(Some(task)) => {
                let now = Instant::now();
                mirror.handle(task, now);
                mirror.drain(&queue, now);
            }
            Ok(None) => {
                if producer.is_finished() {
                    break;
                }
            }
            Err(_) => break,
        }
        mirror.tick(Instant::now());
    }

    let ops_applied = producer.join().unwrap_or_else(|_| {
        error!("producer thread panicked");
        0
    });

    mirror.drain(&queue, Instant::now());
    mirror.flush_attributes();
    let closing = mirror.reconcile();

    let model = mirror.model();
    let replica = replica.lock();
    let summary = RunSummary {
        mode: config.mode,
        seed: config.storm.seed,
        frames: frame_count,
        ops_applied,
        passes: mirror.passes(),
        notifications_applied: mirror.incremental().applied(),
        events: mirror.events_emitted(),
        tracked: mirror.store().len(),
        live: scene.read().len(),
        converged: closing.is_noop(),
        replica_matches: replica.matches(&model),
        invariant_error: mirror.store().check_invariants().err(),
        mismatches: replica.mismatches().to_vec(),
        deleted: replica.deleted().len(),
        data_changes: replica.data_changes(),
        diagnostics: mirror.diagnostics().map(|log| log.to_jsonl()),
        scene: scene.read().to_json(),
    };
    if !summary.replica_matches {
        debug!(model = ?model_shape(&model), replica = ?replica.shape(), "replica diverged");
    }
    info!(
        passes = summary.passes,
        events = summary.events,
        tracked = summary.tracked,
        clean = summary.is_clean(),
        "run complete"
    );
    summary
}
