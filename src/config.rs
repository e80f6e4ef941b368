//! Options loading.
//!
//! A single JSON options file tunes the discovery engine. Every field has a
//! default, so an empty object (or a missing file handled by the caller) is
//! a valid configuration.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Default announcement feed account.
pub const DEFAULT_FEED_USER: &str = "ASFinfo";
/// Default primary feed host.
pub const DEFAULT_PRIMARY_BASE_URL: &str = "https://www.reddit.com";
/// Default retry budget per discovery cycle.
pub const DEFAULT_RETRY: u32 = 5;
/// Default number of concurrent mirror downloads.
pub const DEFAULT_MIRROR_CONCURRENCY: usize = 4;
/// Default connect timeout, seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Default whole-request timeout, seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors from reading or decoding the options file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read options file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid options JSON.
    #[error("failed to parse options file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Engine options, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Account whose announcement feed is watched.
    pub feed_user: String,
    /// Base URL of the primary JSON feed.
    pub primary_base_url: String,
    /// URL of the mirror instance list. `None` uses the bundled list; the
    /// literal strings `disabled`/`off`/`no`/`false` turn the mirror off
    /// entirely.
    pub mirror_instance_list_url: Option<String>,
    /// Retry budget per discovery cycle.
    pub retry: u32,
    /// Concurrent mirror downloads during the fan-out.
    pub mirror_concurrency: usize,
    /// Whether mirror markup parsing skips repeated announcements.
    pub dedup: bool,
    /// HTTP connect timeout, seconds.
    pub connect_timeout_secs: u64,
    /// HTTP whole-request timeout, seconds.
    pub request_timeout_secs: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            feed_user: DEFAULT_FEED_USER.to_string(),
            primary_base_url: DEFAULT_PRIMARY_BASE_URL.to_string(),
            mirror_instance_list_url: None,
            retry: DEFAULT_RETRY,
            mirror_concurrency: DEFAULT_MIRROR_CONCURRENCY,
            dedup: true,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Options {
    /// Loads options from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
