//! Mirror fan-out strategy.
//!
//! Resolves the mirror instance list, then races one download task per
//! instance under a small semaphore. The first task to produce a non-empty
//! result wins and the rest are cancelled; a fan-out deadline caps the whole
//! phase.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::{FetchError, FetchStrategy};
use crate::feed::DiscoveredEntry;
use crate::mirror::{CachedInstanceList, MirrorEntry, parse_markup};

/// Hard cap on one whole fan-out.
const FANOUT_DEADLINE: Duration = Duration::from_secs(60);

/// The mirror HTML fan-out strategy.
pub struct MirrorStrategy {
    client: reqwest::Client,
    instances: Arc<CachedInstanceList>,
    user: String,
    semaphore: Arc<Semaphore>,
    dedup: bool,
}

impl MirrorStrategy {
    /// Creates a strategy fanning out over `instances`, at most
    /// `concurrency` downloads in flight. `dedup` controls whether the
    /// markup scanner collapses repeated announcements.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        instances: Arc<CachedInstanceList>,
        user: impl Into<String>,
        concurrency: usize,
        dedup: bool,
    ) -> Self {
        Self {
            client,
            instances,
            user: user.into(),
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            dedup,
        }
    }

    /// One instance's download-and-parse, with per-instance retries
    /// (`1s * 2^t` backoff between attempts).
    async fn fetch_instance(
        client: reqwest::Client,
        semaphore: Arc<Semaphore>,
        base: Url,
        user: String,
        retry: u32,
        dedup: bool,
        cancel: CancellationToken,
    ) -> Result<Vec<DiscoveredEntry>, FetchError> {
        let url = format!("{}/user/{}?sort=new", base.as_str().trim_end_matches('/'), user);

        let retry = retry.max(1);
        for attempt in 0..retry {
            match Self::attempt(&client, &semaphore, &url, dedup, &cancel).await {
                Ok(entries) => return Ok(entries),
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(error) if attempt + 1 == retry => return Err(error),
                Err(error) => {
                    debug!(url, attempt, %error, "mirror download failed, backing off");
                    let backoff = Duration::from_secs(1 << attempt);
                    tokio::select! {
                        () = cancel.cancelled() => return Err(FetchError::Cancelled),
                        () = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
        Err(FetchError::Cancelled)
    }

    async fn attempt(
        client: &reqwest::Client,
        semaphore: &Semaphore,
        url: &str,
        dedup: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<DiscoveredEntry>, FetchError> {
        // Hold the permit for the network phase only; parsing is local work.
        let body = {
            let _permit = tokio::select! {
                () = cancel.cancelled() => return Err(FetchError::Cancelled),
                permit = semaphore.acquire() => {
                    permit.map_err(|_| FetchError::Cancelled)?
                }
            };

            let response = tokio::select! {
                () = cancel.cancelled() => return Err(FetchError::Cancelled),
                response = client.get(url).send() => {
                    response.map_err(|source| FetchError::network(url, source))?
                }
            };
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::http_status(url, status.as_u16()));
            }
            tokio::select! {
                () = cancel.cancelled() => return Err(FetchError::Cancelled),
                body = response.text() => {
                    body.map_err(|source| FetchError::network(url, source))?
                }
            }
        };

        let entries = parse_markup(&body, dedup);
        Ok(entries.iter().map(MirrorEntry::to_discovered).collect())
    }
}

#[async_trait]
impl FetchStrategy for MirrorStrategy {
    fn name(&self) -> &'static str {
        "mirror"
    }

    /// Races every instance; first non-empty success wins.
    ///
    /// Per-instance failures are collected: if any instance succeeded (even
    /// empty) the fan-out is a success with no entries, otherwise the
    /// collected failures fold into one error.
    async fn fetch(
        &self,
        retry: u32,
        cancel: CancellationToken,
    ) -> Result<Vec<DiscoveredEntry>, FetchError> {
        let instances = self.instances.list(&self.client, &cancel).await?;
        if instances.is_empty() {
            warn!("no mirror instances available");
            return Ok(Vec::new());
        }

        let fanout_cancel = cancel.child_token();
        let mut tasks = JoinSet::new();
        for base in instances {
            tasks.spawn(Self::fetch_instance(
                self.client.clone(),
                Arc::clone(&self.semaphore),
                base,
                self.user.clone(),
                retry,
                self.dedup,
                fanout_cancel.clone(),
            ));
        }

        let deadline = tokio::time::Instant::now() + FANOUT_DEADLINE;
        let mut errors = Vec::new();
        let mut empty_success = false;

        let outcome = loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    fanout_cancel.cancel();
                    return Err(FetchError::Cancelled);
                }
                () = tokio::time::sleep_until(deadline) => {
                    debug!("mirror fan-out deadline reached");
                    errors.extend(std::iter::repeat_with(|| FetchError::Cancelled).take(tasks.len()));
                    break None;
                }
                joined = tasks.join_next() => match joined {
                    None => break None,
                    Some(Ok(Ok(entries))) if !entries.is_empty() => break Some(entries),
                    Some(Ok(Ok(_))) => empty_success = true,
                    Some(Ok(Err(error))) => errors.push(error),
                    Some(Err(_)) => errors.push(FetchError::Cancelled),
                }
            }
        };
        fanout_cancel.cancel();
        tasks.abort_all();

        if let Some(entries) = outcome {
            return Ok(entries);
        }
        if empty_success {
            return Ok(Vec::new());
        }
        match FetchError::from_collected(errors) {
            Some(error) => Err(error),
            None => Ok(Vec::new()),
        }
    }
}
