#![forbid(unsafe_code)]

//! Deterministic mutation storms.
//!
//! A [`MutationStorm`] is a seeded sequence of frames, each a list of
//! [`SceneOp`]s applied to a [`SceneGraph`] by the producer thread. Ops
//! address nodes by position in the scene's pre-order handle list (taken
//! modulo its length), so any op sequence is valid against any scene and
//! the same seed always replays the same storm.
//!
//! Set `LIVETREE_STORM_SEED` to pin the seed from the environment.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use livetree_core::{NodeFlags, TypeTag};

use crate::scene::SceneGraph;

/// One scene mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneOp {
    /// Append a new node under the picked parent.
    Create { parent: usize, tag: TypeTag },
    /// Destroy the picked node and its subtree (never the root).
    Destroy { target: usize },
    /// Move the picked node under the picked parent.
    Reparent { target: usize, parent: usize },
    /// Move the picked node to the top of the paint order.
    Raise { target: usize },
    /// Replace the picked node's flags.
    SetFlags { target: usize, flags: NodeFlags },
    /// Rename the picked node.
    Rename { target: usize },
    /// Tear the whole scene down and build a fresh root.
    ReplaceRoot,
}

impl SceneOp {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Destroy { .. } => "destroy",
            Self::Reparent { .. } => "reparent",
            Self::Raise { .. } => "raise",
            Self::SetFlags { .. } => "set_flags",
            Self::Rename { .. } => "rename",
            Self::ReplaceRoot => "replace_root",
        }
    }

    /// Apply to `graph`. Returns whether the scene changed.
    ///
    /// Ops that would be rejected (cycles, destroying the root) are
    /// skipped.
    pub fn apply(&self, graph: &mut SceneGraph) -> bool {
        let handles = graph.handles();
        let pick = |i: usize| {
            if handles.is_empty() {
                None
            } else {
                Some(handles[i % handles.len()])
            }
        };
        let root = graph.root();
        match *self {
            Self::Create { parent, tag } => match pick(parent) {
                Some(parent) => graph.create(parent, format!("n{}", handles.len()), tag).is_ok(),
                None => graph.create_root("root", TypeTag::ROOT).is_ok(),
            },
            Self::Destroy { target } => match pick(target) {
                Some(node) if Some(node) != root => graph.destroy(node).is_ok(),
                _ => false,
            },
            Self::Reparent { target, parent } => match (pick(target), pick(parent)) {
                (Some(node), Some(parent)) if graph.parent(node) != Some(parent) => {
                    graph.reparent(node, parent).is_ok()
                }
                _ => false,
            },
            Self::Raise { target } => pick(target).is_some_and(|node| graph.raise(node).is_ok()),
            Self::SetFlags { target, flags } => pick(target)
                .is_some_and(|node| graph.set_flags(node, flags).is_ok_and(|k| !k.is_empty())),
            Self::Rename { target } => pick(target).is_some_and(|node| {
                let label = format!("renamed{}", node.index());
                graph.set_label(node, label).is_ok()
            }),
            Self::ReplaceRoot => {
                if let Some(old) = root {
                    let _ = graph.destroy(old);
                }
                match graph.create_root("root", TypeTag::ROOT) {
                    Ok(new_root) => {
                        let _ = graph.create(new_root, "content", TypeTag::ITEM);
                        true
                    }
                    Err(_) => false,
                }
            }
        }
    }
}

/// Build a root with `breadth` children per node, `depth` levels deep.
pub fn populate(graph: &mut SceneGraph, breadth: usize, depth: usize) {
    let Ok(root) = graph
        .root()
        .map_or_else(|| graph.create_root("root", TypeTag::ROOT), Ok)
    else {
        return;
    };
    let mut level = vec![root];
    for d in 0..depth {
        let mut next = Vec::with_capacity(level.len() * breadth);
        for &parent in &level {
            for b in 0..breadth {
                let tag = if d % 2 == 0 { TypeTag::ITEM } else { TypeTag::GEOMETRY };
                if let Ok(child) = graph.create(parent, format!("d{d}b{b}"), tag) {
                    next.push(child);
                }
            }
        }
        level = next;
    }
}

/// Configuration for storm generation.
#[derive(Debug, Clone)]
pub struct StormConfig {
    /// Random seed for deterministic generation.
    pub seed: u64,
    /// Number of producer frames.
    pub frames: usize,
    /// Ops applied per frame.
    pub ops_per_frame: usize,
    /// Pause between frames.
    pub frame_interval: Duration,
    /// Chance per frame of tearing the scene down.
    pub replace_root_chance: f64,
    /// Stop creating nodes above this size.
    pub max_nodes: usize,
}

impl Default for StormConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            frames: 200,
            ops_per_frame: 8,
            frame_interval: Duration::from_millis(2),
            replace_root_chance: 0.01,
            max_nodes: 400,
        }
    }
}

impl StormConfig {
    /// Set the random seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_frames(mut self, frames: usize) -> Self {
        self.frames = frames;
        self
    }

    #[must_use]
    pub fn with_ops_per_frame(mut self, ops: usize) -> Self {
        self.ops_per_frame = ops;
        self
    }

    #[must_use]
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    #[must_use]
    pub fn with_replace_root_chance(mut self, chance: f64) -> Self {
        self.replace_root_chance = chance;
        self
    }

    #[must_use]
    pub fn with_max_nodes(mut self, max: usize) -> Self {
        self.max_nodes = max;
        self
    }
}

/// Simple LCG PRNG for deterministic generation.
#[derive(Debug, Clone)]
struct SeededRng {
    state: u64,
}

impl SeededRng {
    fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_add(1),
        }
    }

    fn next_u64(&mut self) -> u64 {
        // LCG parameters from Numerical Recipes
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    fn next_index(&mut self) -> usize {
        (self.next_u64() >> 16) as usize
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() as f64) / (u64::MAX as f64)
    }

    fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

/// A generated sequence of frames.
#[derive(Debug, Clone)]
pub struct MutationStorm {
    config: StormConfig,
    frames: Vec<Vec<SceneOp>>,
}

impl MutationStorm {
    /// Generate a storm from `config`.
    #[must_use]
    pub fn new(config: StormConfig) -> Self {
        let mut rng = SeededRng::new(config.seed);
        let frames = (0..config.frames)
            .map(|_| Self::generate_frame(&config, &mut rng))
            .collect();
        Self { config, frames }
    }

    fn generate_frame(config: &StormConfig, rng: &mut SeededRng) -> Vec<SceneOp> {
        let mut ops = Vec::with_capacity(config.ops_per_frame + 1);
        if rng.chance(config.replace_root_chance) {
            ops.push(SceneOp::ReplaceRoot);
        }
        for _ in 0..config.ops_per_frame {
            let target = rng.next_index();
            let other = rng.next_index();
            let op = match rng.next_u64() % 10 {
                0..=2 => SceneOp::Create {
                    parent: target,
                    tag: TypeTag((other % 8) as u32),
                },
                3 | 4 => SceneOp::Destroy { target },
                5 | 6 => SceneOp::Reparent {
                    target,
                    parent: other,
                },
                7 => SceneOp::Raise { target },
                8 => SceneOp::SetFlags {
                    target,
                    flags: NodeFlags::from_bits_truncate(other as u8),
                },
                _ => SceneOp::Rename { target },
            };
            ops.push(op);
        }
        ops
    }

    #[must_use]
    pub fn config(&self) -> &StormConfig {
        &self.config
    }

    /// Generated frames, in order.
    #[must_use]
    pub fn frames(&self) -> &[Vec<SceneOp>] {
        &self.frames
    }

    /// Consume into the frame list.
    #[must_use]
    pub fn into_frames(self) -> Vec<Vec<SceneOp>> {
        self.frames
    }

    /// Apply one frame, honouring the node cap. Returns ops that changed
    /// the scene.
    pub fn apply_frame(config: &StormConfig, frame: &[SceneOp], graph: &mut SceneGraph) -> usize {
        let mut applied = 0;
        for op in frame {
            if matches!(op, SceneOp::Create { .. }) && graph.len() >= config.max_nodes {
                continue;
            }
            if op.apply(graph) {
                applied += 1;
            }
        }
        applied
    }
}

/// Seed from `LIVETREE_STORM_SEED`, or derived from the clock.
pub fn storm_seed() -> u64 {
    std::env::var("LIVETREE_STORM_SEED")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or_else(|| {
            let pid = u64::from(std::process::id());
            let time = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0);
            time ^ (pid << 32)
        })
}
