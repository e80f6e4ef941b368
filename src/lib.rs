//! Free-game discovery core library.
//!
//! Watches an announcement feed for free-game giveaways, through a primary
//! JSON feed and an HTML mirror fan-out raced against each other, and keeps
//! a compact on-disk ledger of already-handled identifiers.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`ids`] - Game identifier parsing and hashing
//! - [`feed`] - Primary JSON feed extraction and announcement dedup
//! - [`mirror`] - Mirror markup scanning and instance-list resolution
//! - [`fetch`] - Fetch strategies and the racing orchestrator
//! - [`ledger`] - Fixed-capacity recent-identifier ledger with a Brotli
//!   blob format
//! - [`engine`] - Composition root wiring options to `discover()`

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod engine;
pub mod feed;
pub mod fetch;
mod http;
pub mod ids;
pub mod ledger;
pub mod mirror;

// Re-export commonly used types
pub use config::{ConfigError, Options};
pub use engine::DiscoveryEngine;
pub use feed::{DiscoveredEntry, EntryKind, parse_feed};
pub use fetch::{FetchError, Orchestrator, SourceFlags};
pub use ids::{GameId, IdKind};
pub use ledger::{Ledger, ledger_path_for};
pub use mirror::parse_markup;
