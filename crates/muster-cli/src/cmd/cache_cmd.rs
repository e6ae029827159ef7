//! `mstr cache`: inspect and clear the durable cache.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use muster_core::cache::{self, SqliteCacheStore};

use crate::config::ClientConfig;
use crate::output::{OutputMode, render_success};

#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show the cached list for a team.
    Show {
        /// Team id (overrides the config file).
        #[arg(long)]
        team: Option<String>,
    },
    /// Drop every cached entry.
    Clear,
}

fn open_store(config: &ClientConfig) -> Result<SqliteCacheStore> {
    let path = config
        .resolved_cache_path()
        .context("no cache path configured and no platform default available")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    SqliteCacheStore::open(&path).with_context(|| format!("Failed to open {}", path.display()))
}

pub fn run_cache(args: &CacheArgs, config: &ClientConfig, output: OutputMode) -> Result<()> {
    let store = open_store(config)?;

    match &args.action {
        CacheAction::Show { team } => {
            let team_id = team
                .clone()
                .or_else(|| config.team_id.clone())
                .context("no team id: pass --team or set team_id in the config file")?;

            let incidents = cache::load_cached_list(&store, &team_id).unwrap_or_default();
            let stamp = cache::last_refresh_stamp(&store, &team_id);

            if output.is_json() {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "team_id": team_id,
                        "incidents": incidents,
                        "last_refreshed_ms": stamp,
                    }))?
                );
            } else if incidents.is_empty() {
                println!("No cached list for team {team_id}.");
            } else {
                println!("{} cached incident(s) for team {team_id}:", incidents.len());
                for incident in &incidents {
                    println!(
                        "  {:<14} {:<12} {}",
                        incident.id,
                        incident.status,
                        incident.incident_type.as_deref().unwrap_or("-")
                    );
                }
                if let Some(stamp) = stamp {
                    println!("last refreshed: {stamp} (unix ms)");
                }
            }
            Ok(())
        }
        CacheAction::Clear => {
            store.clear();
            render_success(output, "Cache cleared.")
        }
    }
}
