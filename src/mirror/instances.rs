//! Mirror instance-list resolution.
//!
//! The set of usable mirror instances comes from a remote JSON document
//! (`{ "updated": "...", "instances": [{ "url": "..." }] }`). Any remote
//! failure falls back to a bundled copy of the document, so discovery keeps
//! working offline; only an explicit disable sentinel or a stale bundled
//! copy is an error.

use std::time::{Duration, Instant};

use chrono::{Datelike, Utc};
use rand::seq::SliceRandom;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::fetch::FetchError;

/// How long a successfully resolved instance list stays cached.
pub const INSTANCE_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Bundled fallback document, refreshed with releases.
const BUNDLED_INSTANCES: &str = include_str!("../../resources/mirror_instances.json");

/// Configuration values that turn the mirror source off entirely.
const DISABLED_SENTINELS: &[&str] = &["disabled", "off", "no", "false"];

/// Resolves the mirror instance list from a configured URL, with the
/// bundled document as fallback.
#[derive(Debug, Clone)]
pub struct InstanceList {
    instance_list_url: Option<String>,
}

impl InstanceList {
    /// Creates a resolver from the configured instance-list URL.
    ///
    /// `None` resolves straight from the bundled document; a disable
    /// sentinel (`disabled`, `off`, `no`, `false`, case-insensitive) makes
    /// every resolution fail with [`FetchError::MirrorDisabled`].
    #[must_use]
    pub fn new(instance_list_url: Option<String>) -> Self {
        Self { instance_list_url }
    }

    /// Resolves the current instance list.
    pub async fn list(
        &self,
        client: &reqwest::Client,
        cancel: &CancellationToken,
    ) -> Result<Vec<Url>, FetchError> {
        let Some(configured) = self.instance_list_url.as_deref() else {
            return Self::bundled();
        };
        if is_disabled(configured) {
            return Err(FetchError::MirrorDisabled);
        }
        let Ok(url) = Url::parse(configured) else {
            warn!(url = configured, "invalid mirror instance list url, using bundled list");
            return Self::bundled();
        };

        match self.fetch_document(client, &url, cancel).await {
            Ok(document) => match validated_urls(&document) {
                Ok(urls) if !urls.is_empty() => Ok(urls),
                Ok(_) => {
                    debug!(url = %url, "remote instance list is empty, using bundled list");
                    Self::bundled()
                }
                Err(error) => {
                    warn!(url = %url, %error, "remote instance list rejected, using bundled list");
                    Self::bundled()
                }
            },
            Err(FetchError::Cancelled) => Err(FetchError::Cancelled),
            Err(error) => {
                warn!(url = %url, %error, "failed to fetch instance list, using bundled list");
                Self::bundled()
            }
        }
    }

    async fn fetch_document(
        &self,
        client: &reqwest::Client,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<Value, FetchError> {
        let response = tokio::select! {
            () = cancel.cancelled() => return Err(FetchError::Cancelled),
            response = client.get(url.clone()).send() => {
                response.map_err(|source| FetchError::network(url.as_str(), source))?
            }
        };
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url.as_str(), status.as_u16()));
        }
        tokio::select! {
            () = cancel.cancelled() => Err(FetchError::Cancelled),
            body = response.json::<Value>() => {
                body.map_err(|source| FetchError::network(url.as_str(), source))
            }
        }
    }

    /// Resolves from the bundled document. Staleness here is an error:
    /// there is nothing further to fall back to.
    fn bundled() -> Result<Vec<Url>, FetchError> {
        let document: Value = serde_json::from_str(BUNDLED_INSTANCES)
            .map_err(|error| FetchError::invalid_body("bundled instance list", error.to_string()))?;
        validated_urls(&document)
    }
}

/// Staleness check plus URL extraction.
fn validated_urls(document: &Value) -> Result<Vec<Url>, FetchError> {
    check_up_to_date(document)?;
    Ok(parse_urls(document))
}

/// The `updated` field must begin with the current or previous calendar
/// year; anything else means the document is no longer maintained.
fn check_up_to_date(document: &Value) -> Result<(), FetchError> {
    let updated = document
        .get("updated")
        .and_then(Value::as_str)
        .unwrap_or("");
    let year = Utc::now().year();
    let fresh = updated.starts_with(&year.to_string())
        || updated.starts_with(&(year - 1).to_string());
    if fresh {
        Ok(())
    } else {
        Err(FetchError::outdated_instance_list(updated))
    }
}

/// Extracts absolute http/https URLs from the `instances` array; anything
/// else is silently dropped.
fn parse_urls(document: &Value) -> Vec<Url> {
    let Some(instances) = document.get("instances").and_then(Value::as_array) else {
        return Vec::new();
    };
    instances
        .iter()
        .filter_map(|instance| instance.get("url").and_then(Value::as_str))
        .filter_map(|raw| Url::parse(raw).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .collect()
}

fn is_disabled(configured: &str) -> bool {
    let trimmed = configured.trim();
    DISABLED_SENTINELS
        .iter()
        .any(|sentinel| trimmed.eq_ignore_ascii_case(sentinel))
}

/// Caching wrapper around [`InstanceList`].
///
/// A successful resolution is kept for [`INSTANCE_CACHE_TTL`]; every caller
/// gets its own uniformly shuffled copy so fan-out load spreads across
/// instances.
#[derive(Debug)]
pub struct CachedInstanceList {
    inner: InstanceList,
    cache: Mutex<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    instances: Vec<Url>,
    last_update: Option<Instant>,
}

impl CachedInstanceList {
    /// Wraps a resolver with an empty cache.
    #[must_use]
    pub fn new(inner: InstanceList) -> Self {
        Self {
            inner,
            cache: Mutex::new(CacheState::default()),
        }
    }

    /// Returns a shuffled copy of the cached list, refreshing it first when
    /// it is empty or older than [`INSTANCE_CACHE_TTL`].
    pub async fn list(
        &self,
        client: &reqwest::Client,
        cancel: &CancellationToken,
    ) -> Result<Vec<Url>, FetchError> {
        let mut state = self.cache.lock().await;
        let expired = state
            .last_update
            .is_none_or(|at| at.elapsed() > INSTANCE_CACHE_TTL);
        if expired || state.instances.is_empty() {
            let fresh = self.inner.list(client, cancel).await?;
            if !fresh.is_empty() {
                state.instances = fresh;
                state.last_update = Some(Instant::now());
            }
        }
        let mut instances = state.instances.clone();
        drop(state);

        instances.shuffle(&mut rand::thread_rng());
        Ok(instances)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fresh_year() -> String {
        format!("{}-01-15", Utc::now().year())
    }

    #[test]
    fn test_parse_urls_keeps_only_absolute_http() {
        let document = json!({
            "instances": [
                { "url": "https://mirror-a.example.com" },
                { "url": "http://mirror-b.example.com" },
                { "url": "ftp://mirror-c.example.com" },
                { "url": "not a url" },
                { "url": 42 },
                {},
            ]
        });
        let urls = parse_urls(&document);
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].host_str(), Some("mirror-a.example.com"));
    }

    #[test]
    fn test_parse_urls_without_instances_field() {
        assert!(parse_urls(&json!({})).is_empty());
        assert!(parse_urls(&json!({ "instances": "nope" })).is_empty());
    }

    #[test]
    fn test_staleness_accepts_current_and_previous_year() {
        let year = Utc::now().year();
        for value in [format!("{year}-06-01"), format!("{}-12-31", year - 1)] {
            assert!(check_up_to_date(&json!({ "updated": value })).is_ok(), "{value}");
        }
        for value in [format!("{}-06-01", year - 2), "2001".to_string(), String::new()] {
            assert!(check_up_to_date(&json!({ "updated": value })).is_err(), "{value}");
        }
        assert!(check_up_to_date(&json!({})).is_err());
    }

    #[test]
    fn test_disable_sentinels() {
        for value in ["disabled", "OFF", " no ", "False"] {
            assert!(is_disabled(value), "{value}");
        }
        for value in ["https://example.com", "", "nope"] {
            assert!(!is_disabled(value), "{value}");
        }
    }

    #[test]
    fn test_bundled_document_has_usable_urls() {
        let document: Value = serde_json::from_str(BUNDLED_INSTANCES).unwrap();
        let urls = parse_urls(&document);
        assert!(!urls.is_empty());
        assert!(urls.iter().all(|url| url.scheme() == "https"));
    }

    #[tokio::test]
    async fn test_disabled_sentinel_fails_resolution() {
        let list = InstanceList::new(Some("disabled".to_string()));
        let client = reqwest::Client::new();
        let result = list.list(&client, &CancellationToken::new()).await;
        assert!(matches!(result, Err(FetchError::MirrorDisabled)));
    }

    #[tokio::test]
    async fn test_validated_urls_combines_checks() {
        let document = json!({
            "updated": fresh_year(),
            "instances": [{ "url": "https://mirror.example.com" }]
        });
        assert_eq!(validated_urls(&document).unwrap().len(), 1);

        let stale = json!({
            "updated": "2019-01-01",
            "instances": [{ "url": "https://mirror.example.com" }]
        });
        assert!(validated_urls(&stale).is_err());
    }
}
