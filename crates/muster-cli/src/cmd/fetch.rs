//! `mstr fetch`: one-shot authoritative refresh.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use muster_core::cache::{CacheStore, MemoryCacheStore, SqliteCacheStore};
use muster_core::engine::{Callbacks, EngineDeps, SyncEngine};
use muster_core::reconcile::{IncidentSource, OnlineFlag};

use crate::config::ClientConfig;
use crate::feed_input::NullTransport;
use crate::http::HttpIncidentSource;
use crate::output::{OutputMode, SnapshotReport, render_snapshot};

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Team id (overrides the config file).
    #[arg(long)]
    pub team: Option<String>,

    /// Treat the network as unavailable and exercise the cache fallback.
    #[arg(long)]
    pub offline: bool,

    /// Skip the durable cache and run against an in-memory store.
    #[arg(long)]
    pub no_cache: bool,
}

pub fn run_fetch(args: &FetchArgs, config: &ClientConfig, output: OutputMode) -> Result<()> {
    let team_id = args
        .team
        .clone()
        .or_else(|| config.team_id.clone())
        .context("no team id: pass --team or set team_id in the config file")?;

    let cache = open_cache(config, args.no_cache);
    let source: Arc<dyn IncidentSource> = Arc::new(HttpIncidentSource::new(
        config.endpoint_url.clone(),
        config.token(),
    ));

    let engine = SyncEngine::new(
        team_id,
        config.actor_id.clone(),
        EngineDeps {
            source,
            cache,
            connectivity: Arc::new(OnlineFlag::new(!args.offline)),
            transport: Arc::new(NullTransport),
        },
        Callbacks::default(),
        config.engine.clone(),
    );

    let outcome = engine.refresh();
    tracing::debug!(?outcome, "fetch complete");

    render_snapshot(&SnapshotReport::from_snapshot(engine.snapshot()), output)
}

/// Open the durable cache, degrading to a memory store when the file
/// cannot be opened. The cache is advisory; a broken store must not stop
/// a fetch.
pub fn open_cache(config: &ClientConfig, no_cache: bool) -> Arc<dyn CacheStore> {
    if no_cache {
        return Arc::new(MemoryCacheStore::new());
    }

    let Some(path) = config.resolved_cache_path() else {
        tracing::warn!("no cache directory available; using in-memory cache");
        return Arc::new(MemoryCacheStore::new());
    };

    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(error = %e, "failed to create cache directory; using in-memory cache");
            return Arc::new(MemoryCacheStore::new());
        }
    }

    match SqliteCacheStore::open(&path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to open cache; using in-memory cache");
            Arc::new(MemoryCacheStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_team_is_an_error() {
        let args = FetchArgs {
            team: None,
            offline: true,
            no_cache: true,
        };
        let config = ClientConfig::default();
        let err = run_fetch(&args, &config, OutputMode::Json).expect_err("should fail");
        assert!(err.to_string().contains("team"));
    }

    #[test]
    fn offline_fetch_with_empty_cache_still_renders() {
        let args = FetchArgs {
            team: Some("7".to_string()),
            offline: true,
            no_cache: true,
        };
        let config = ClientConfig::default();
        // Offline + memory cache: the engine reports "offline, no data"
        // without any network attempt, and rendering succeeds.
        run_fetch(&args, &config, OutputMode::Json).expect("render");
    }
}
