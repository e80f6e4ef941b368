//! Primary-source strategy: the announcement feed as JSON.
//!
//! Fetches `{base}/user/{user}.json?sort=new` with no-cache headers, retries
//! with exponential backoff and cooperates with the feed's rate limiter: a
//! 403/429 carrying an exhausted `x-ratelimit-remaining` waits for the
//! hinted reset (up to 60 s) instead of burning a backoff cycle.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{FetchError, FetchStrategy};
use crate::feed::{DiscoveredEntry, parse_feed};

/// Longest rate-limit reset hint worth waiting for, seconds.
const MAX_RATE_LIMIT_WAIT_SECS: f64 = 60.0;

/// The primary JSON-feed strategy.
#[derive(Debug, Clone)]
pub struct PrimaryStrategy {
    client: reqwest::Client,
    base_url: String,
    user: String,
}

enum Attempt {
    Payload(Value),
    RateLimited,
}

impl PrimaryStrategy {
    /// Creates a strategy fetching `user`'s feed from `base_url`.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            user: user.into(),
        }
    }

    fn feed_url(&self) -> String {
        format!(
            "{}/user/{}.json?sort=new",
            self.base_url.trim_end_matches('/'),
            self.user
        )
    }

    /// Retry loop around [`Self::attempt`].
    ///
    /// A handled rate limit consumes the attempt without backoff (the reset
    /// wait already happened). Exhausting the budget through rate limits
    /// yields an empty payload, which parses to no entries.
    async fn fetch_payload(
        &self,
        retry: u32,
        cancel: &CancellationToken,
    ) -> Result<Value, FetchError> {
        let url = self.feed_url();
        for attempt in 0..retry {
            match self.attempt(&url, cancel).await {
                Ok(Attempt::Payload(payload)) => return Ok(payload),
                Ok(Attempt::RateLimited) => {
                    debug!(url, attempt, "feed rate limited, retrying");
                    continue;
                }
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(error) => {
                    if attempt + 1 == retry {
                        return Err(error);
                    }
                    warn!(url, attempt, %error, "feed fetch failed, backing off");
                }
            }

            let backoff = Duration::from_millis((2u64 << (attempt + 1)) * 100);
            tokio::select! {
                () = cancel.cancelled() => return Err(FetchError::Cancelled),
                () = tokio::time::sleep(backoff) => {}
            }
        }
        Ok(Value::Object(serde_json::Map::new()))
    }

    async fn attempt(&self, url: &str, cancel: &CancellationToken) -> Result<Attempt, FetchError> {
        let request = self
            .client
            .get(url)
            .header("Pragma", "no-cache")
            .header("Cache-Control", "no-cache")
            .header("Accept", "application/json")
            .header("Sec-Fetch-Site", "none")
            .header("Sec-Fetch-Mode", "no-cors")
            .header("Sec-Fetch-Dest", "empty");

        let response = tokio::select! {
            () = cancel.cancelled() => return Err(FetchError::Cancelled),
            response = request.send() => {
                response.map_err(|source| FetchError::network(url, source))?
            }
        };

        let status = response.status();
        if (status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS)
            && Self::handle_rate_limit(&response, cancel).await?
        {
            return Ok(Attempt::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }

        let payload: Value = tokio::select! {
            () = cancel.cancelled() => return Err(FetchError::Cancelled),
            body = response.json() => {
                body.map_err(|source| FetchError::network(url, source))?
            }
        };

        if payload.get("kind").and_then(Value::as_str) != Some("Listing")
            || payload.get("data").is_none()
        {
            return Err(FetchError::invalid_body(url, "expected a Listing with data"));
        }
        Ok(Attempt::Payload(payload))
    }

    /// Returns true when the response was an exhausted rate limit (and the
    /// hinted reset, if plausible, has been waited out).
    async fn handle_rate_limit(
        response: &reqwest::Response,
        cancel: &CancellationToken,
    ) -> Result<bool, FetchError> {
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
        };

        let Some(remaining) = header("x-ratelimit-remaining").and_then(|v| v.parse::<f64>().ok())
        else {
            return Ok(false);
        };
        if remaining > 0.0 {
            return Ok(false);
        }

        if let Some(reset) = header("x-ratelimit-reset").and_then(|v| v.parse::<f64>().ok()) {
            if reset.is_finite() && reset > 0.0 && reset < MAX_RATE_LIMIT_WAIT_SECS {
                debug!(reset, "waiting for feed rate limit reset");
                tokio::select! {
                    () = cancel.cancelled() => return Err(FetchError::Cancelled),
                    () = tokio::time::sleep(Duration::from_secs_f64(reset)) => {}
                }
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl FetchStrategy for PrimaryStrategy {
    fn name(&self) -> &'static str {
        "primary"
    }

    async fn fetch(
        &self,
        retry: u32,
        cancel: CancellationToken,
    ) -> Result<Vec<DiscoveredEntry>, FetchError> {
        let payload = self.fetch_payload(retry.max(1), &cancel).await?;
        Ok(parse_feed(&payload))
    }
}
