#![forbid(unsafe_code)]

//! livetree harness
//!
//! Runs a seeded mutation storm on a producer "render" thread against a
//! mirror living on the main thread, then reports whether the mirror, the
//! model and a sequential consumer all ended up agreeing.
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=livetree_runtime=debug cargo run -p livetree-harness
//! ```
//!
//! # Environment
//!
//! - `LIVETREE_HARNESS_MODE`: `periodic` (default) or `incremental`
//! - `LIVETREE_HARNESS_FRAMES`: producer frames (default 200)
//! - `LIVETREE_HARNESS_OPS`: ops per frame (default 8)
//! - `LIVETREE_HARNESS_FRAME_MS`: pause between frames (default 2)
//! - `LIVETREE_HARNESS_JSON`: print the summary (and final scene) as JSON
//! - `LIVETREE_STORM_SEED`: storm seed (default: clock)
//!
//! Mirror settings come from the `LIVETREE_*` variables read by
//! `MirrorConfig::from_env`.

use std::process::ExitCode;
use std::time::Duration;

use livetree_harness::driver::{RunConfig, SyncMode, run};
use livetree_harness::storm::{StormConfig, storm_seed};
use livetree_runtime::MirrorConfig;
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(matches!(
        trimmed,
        "1" | "true" | "TRUE" | "True" | "yes" | "YES" | "on" | "ON"
    ))
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    init_tracing();

    let mode = match std::env::var("LIVETREE_HARNESS_MODE")
        .map(|v| v.to_ascii_lowercase())
        .as_deref()
    {
        Ok("incremental") => SyncMode::Incremental,
        _ => SyncMode::Periodic,
    };
    let mut storm = StormConfig::default().with_seed(storm_seed());
    if let Some(frames) = env_u64("LIVETREE_HARNESS_FRAMES") {
        storm = storm.with_frames(frames as usize);
    }
    if let Some(ops) = env_u64("LIVETREE_HARNESS_OPS") {
        storm = storm.with_ops_per_frame(ops as usize);
    }
    if let Some(ms) = env_u64("LIVETREE_HARNESS_FRAME_MS") {
        storm = storm.with_frame_interval(Duration::from_millis(ms));
    }

    let config = RunConfig::default()
        .with_mode(mode)
        .with_storm(storm)
        .with_mirror(MirrorConfig::from_env());
    let summary = run(&config);

    if env_flag("LIVETREE_HARNESS_JSON").unwrap_or(false) {
        println!(
            "{}",
            json!({ "summary": summary.to_json(), "scene": &summary.scene })
        );
    } else {
        println!(
            "{} seed={} frames={} ops={} passes={} events={} tracked={} live={} clean={}",
            mode.as_str(),
            summary.seed,
            summary.frames,
            summary.ops_applied,
            summary.passes,
            summary.events,
            summary.tracked,
            summary.live,
            summary.is_clean()
        );
        for mismatch in &summary.mismatches {
            println!("  mismatch: {mismatch}");
        }
        if let Some(error) = &summary.invariant_error {
            println!("  invariant: {error}");
        }
    }
    if let Some(jsonl) = summary.diagnostics.as_deref().filter(|s| !s.is_empty()) {
        eprintln!("{jsonl}");
    }

    if summary.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
