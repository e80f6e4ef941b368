//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Discover free-game announcements from a watched feed.
///
/// Runs one discovery cycle over the primary JSON feed and the mirror
/// fan-out, prints the discovered identifiers, and optionally records them
/// in a ledger blob so later runs skip what was already seen.
#[derive(Parser, Debug)]
#[command(name = "freegames")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Path to a JSON options file (all fields optional)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Path to the ledger blob (default: derived from the options file path)
    #[arg(short = 'l', long)]
    pub ledger: Option<PathBuf>,

    /// Overall cycle timeout in seconds (0 to disable, max 600)
    #[arg(short = 't', long, default_value_t = 120, value_parser = clap::value_parser!(u64).range(0..=600))]
    pub timeout: u64,
}
