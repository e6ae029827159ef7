#![forbid(unsafe_code)]

mod cmd;
mod config;
mod feed_input;
mod http;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use output::OutputMode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "muster: real-time assigned-incident synchronization",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Path to the config file (defaults to the platform config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Sync",
        about = "Run one authoritative refresh",
        long_about = "Fetch the team's assigned-incident list once, with the full \
                      cache/offline fallback chain, and print the result.",
        after_help = "EXAMPLES:\n    # Refresh team 7 against the configured endpoint\n    mstr fetch --team 7\n\n    # Exercise the offline fallback\n    mstr fetch --team 7 --offline\n\n    # Emit machine-readable output\n    mstr fetch --team 7 --json"
    )]
    Fetch(cmd::fetch::FetchArgs),

    #[command(
        next_help_heading = "Sync",
        about = "Replay a scripted feed through a full engine",
        long_about = "Drive the engine with change events from an NDJSON script, \
                      printing notifications as they fire and the settled list at the end.",
        after_help = "EXAMPLES:\n    # Replay a captured burst\n    mstr replay --team 7 --events burst.ndjson --snapshot backend.json\n\n    # Pace events 50 ms apart\n    mstr replay --team 7 --events burst.ndjson --event-gap-ms 50"
    )]
    Replay(cmd::replay::ReplayArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Inspect or clear the durable cache",
        after_help = "EXAMPLES:\n    # Show what would survive an offline restart\n    mstr cache show --team 7\n\n    # Drop everything\n    mstr cache clear"
    )]
    Cache(cmd::cache_cmd::CacheArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = OutputMode::from_json_flag(cli.json);
    let config = config::load_config(cli.config.as_deref())?;

    match &cli.command {
        Commands::Fetch(args) => cmd::fetch::run_fetch(args, &config, output),
        Commands::Replay(args) => cmd::replay::run_replay(args, &config, output),
        Commands::Cache(args) => cmd::cache_cmd::run_cache(args, &config, output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_fetch() {
        let cli = Cli::parse_from(["mstr", "fetch", "--team", "7", "--offline", "--json"]);
        assert!(cli.json);
        match cli.command {
            Commands::Fetch(args) => {
                assert_eq!(args.team.as_deref(), Some("7"));
                assert!(args.offline);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_replay_with_gap() {
        let cli = Cli::parse_from([
            "mstr",
            "replay",
            "--events",
            "burst.ndjson",
            "--event-gap-ms",
            "50",
        ]);
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.event_gap_ms, 50);
                assert!(args.snapshot.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_cache_show() {
        let cli = Cli::parse_from(["mstr", "cache", "show", "--team", "7"]);
        match cli.command {
            Commands::Cache(args) => {
                assert!(matches!(
                    args.action,
                    cmd::cache_cmd::CacheAction::Show { .. }
                ));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
