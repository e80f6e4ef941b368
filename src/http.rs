//! Shared HTTP client construction policy.
//!
//! Both strategies and the instance-list fetcher share one client so
//! timeout, user-agent and compression settings stay consistent.

use std::time::Duration;

use reqwest::Client;

use crate::config::Options;
use crate::fetch::FetchError;

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/nicksrandall/freegames";

/// Default User-Agent for all engine traffic.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("freegames/{version} (discovery-engine; +{PROJECT_UA_URL})")
}

/// Builds the shared HTTP client from the configured timeouts.
///
/// # Errors
///
/// Returns [`FetchError::ClientBuild`] when client construction fails (a
/// TLS backend or system configuration problem).
pub fn build_http_client(options: &Options) -> Result<Client, FetchError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(options.connect_timeout_secs))
        .timeout(Duration::from_secs(options.request_timeout_secs))
        .user_agent(default_user_agent())
        .gzip(true)
        .build()
        .map_err(|source| FetchError::ClientBuild { source })
}
