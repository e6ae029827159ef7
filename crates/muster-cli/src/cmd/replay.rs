//! `mstr replay`: drive a full engine from a scripted feed file.
//!
//! Deterministic harness: events come from an NDJSON script, the
//! authoritative backend is a JSON snapshot file, and the cache is
//! in-memory. Notifications print as they fire; the final list prints
//! once the engine settles.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use muster_core::cache::{CacheStore, MemoryCacheStore};
use muster_core::engine::{Callbacks, EngineDeps, SyncEngine};
use muster_core::error::FetchError;
use muster_core::model::Incident;
use muster_core::notify::DispatchNotice;
use muster_core::reconcile::{IncidentSource, OnlineFlag};

use crate::config::ClientConfig;
use crate::feed_input::{ReplayTransport, read_events};
use crate::output::{OutputMode, SnapshotReport, render_snapshot};

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// NDJSON file of feed events, one per line.
    #[arg(long)]
    pub events: PathBuf,

    /// JSON file with the backend's authoritative list, either
    /// `{"incidents": [...]}` or a bare array. Defaults to empty.
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Team id (overrides the config file).
    #[arg(long)]
    pub team: Option<String>,

    /// Gap between replayed events, in milliseconds.
    #[arg(long, default_value = "0")]
    pub event_gap_ms: u64,

    /// Extra settle time after the script drains, in milliseconds.
    /// Defaults to two coalescing windows.
    #[arg(long)]
    pub settle_ms: Option<u64>,
}

/// Backend standing in for the query endpoint during a replay.
struct SnapshotBackend {
    incidents: Vec<Incident>,
}

impl IncidentSource for SnapshotBackend {
    fn fetch_assigned(&self, _team_id: &str) -> Result<Vec<Incident>, FetchError> {
        Ok(self.incidents.clone())
    }
}

fn load_snapshot(path: Option<&Path>) -> Result<Vec<Incident>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let list = value.get("incidents").cloned().unwrap_or(value);

    serde_json::from_value(list).with_context(|| format!("Bad incident list in {}", path.display()))
}

fn print_notice(notice: &DispatchNotice, mode: OutputMode) {
    let mut stdout = std::io::stdout().lock();
    let _ = if mode.is_json() {
        serde_json::to_writer(&mut stdout, notice)
            .map_err(std::io::Error::other)
            .and_then(|()| writeln!(stdout))
    } else {
        writeln!(
            stdout,
            "[{}] {}: {} ({})",
            notice.kind.as_str(),
            notice.incident_id,
            notice.incident_type.as_deref().unwrap_or("incident"),
            notice.reporter_name,
        )
    };
}

pub fn run_replay(args: &ReplayArgs, config: &ClientConfig, output: OutputMode) -> Result<()> {
    let team_id = args
        .team
        .clone()
        .or_else(|| config.team_id.clone())
        .context("no team id: pass --team or set team_id in the config file")?;

    let events = read_events(&args.events)?;
    let event_count = events.len();
    let incidents = load_snapshot(args.snapshot.as_deref())?;

    let transport = Arc::new(ReplayTransport::new(
        events,
        Duration::from_millis(args.event_gap_ms),
    ));
    let notices = Arc::new(Mutex::new(Vec::<DispatchNotice>::new()));

    let callbacks = Callbacks {
        on_new_dispatch: Some({
            let notices = Arc::clone(&notices);
            Arc::new(move |notice| {
                print_notice(&notice, output);
                if let Ok(mut collected) = notices.lock() {
                    collected.push(notice);
                }
            })
        }),
        on_instant_update: None,
    };

    let mut engine = SyncEngine::new(
        team_id,
        config.actor_id.clone(),
        EngineDeps {
            source: Arc::new(SnapshotBackend { incidents }),
            cache: Arc::new(MemoryCacheStore::new()) as Arc<dyn CacheStore>,
            connectivity: Arc::new(OnlineFlag::new(true)),
            transport,
        },
        callbacks,
        config.engine.clone(),
    );

    engine.refresh();
    engine.start();

    // Wait out the script plus enough slack for a trailing coalesced
    // refresh to land.
    let settle = args
        .settle_ms
        .unwrap_or(config.engine.coalesce_window_ms * 2);
    let event_span = args.event_gap_ms.saturating_mul(event_count as u64);
    thread::sleep(Duration::from_millis(event_span.saturating_add(settle)));

    engine.stop();

    let emitted = notices.lock().map_or(0, |collected| collected.len());
    tracing::info!(events = event_count, notifications = emitted, "replay complete");

    render_snapshot(&SnapshotReport::from_snapshot(engine.snapshot()), output)
}
