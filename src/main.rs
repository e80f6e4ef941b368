//! CLI entry point for the free-game discovery tool.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use freegames_core::{DiscoveryEngine, GameId, Ledger, Options, ledger_path_for};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let options = match &args.config {
        Some(path) => Options::load_from_path(path)
            .with_context(|| format!("loading options from {}", path.display()))?,
        None => Options::default(),
    };

    // Ledger path: explicit flag, or derived from the options file path.
    let ledger_path = args
        .ledger
        .clone()
        .or_else(|| args.config.as_deref().map(ledger_path_for));
    let mut ledger = match &ledger_path {
        Some(path) => Some(Ledger::load_from_path(path)?),
        None => None,
    };

    let engine = DiscoveryEngine::new(&options)?;

    let cancel = CancellationToken::new();
    let guard = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling discovery");
            guard.cancel();
        }
    });
    if args.timeout > 0 {
        let guard = cancel.clone();
        let timeout = Duration::from_secs(args.timeout);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!(secs = timeout.as_secs(), "cycle timeout reached, cancelling");
            guard.cancel();
        });
    }

    let entries = engine.discover(cancel).await?;
    info!(entries = entries.len(), "discovery cycle complete");

    let mut printed = 0usize;
    for entry in &entries {
        // Mirror entries can carry several comma-joined identifiers.
        let ids: Vec<GameId> = entry
            .identifier
            .split(',')
            .filter_map(|token| GameId::parse(token.trim()))
            .collect();
        if ids.is_empty() {
            debug!(identifier = %entry.identifier, "skipping unparseable entry");
            continue;
        }

        if let Some(ledger) = &mut ledger {
            let fresh: Vec<GameId> = ids
                .iter()
                .copied()
                .filter(|id| !ledger.contains(id))
                .collect();
            if fresh.is_empty() {
                debug!(%entry, "already recorded, skipping");
                continue;
            }
            for id in fresh {
                ledger.add(id)?;
            }
        }

        println!("{entry}");
        printed += 1;
    }

    if let (Some(path), Some(ledger)) = (&ledger_path, &ledger) {
        ledger.save_to_path(path)?;
    }

    info!(printed, total = entries.len(), "done");
    Ok(())
}
