//! Composition root: wires options, HTTP client, strategies and the
//! orchestrator into one `discover()` entry point.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Options;
use crate::feed::DiscoveredEntry;
use crate::fetch::{
    FetchError, MirrorStrategy, Orchestrator, PrimaryStrategy, SourceFlags,
};
use crate::http::build_http_client;
use crate::mirror::{CachedInstanceList, InstanceList};

/// The discovery engine.
///
/// Holds the orchestrator plus the source flags carried across cycles: a
/// cycle where the primary source succeeded lets the next cycle give the
/// primary a head start before waking the mirror fan-out.
pub struct DiscoveryEngine {
    orchestrator: Orchestrator,
    previous_flags: Mutex<SourceFlags>,
}

impl DiscoveryEngine {
    /// Builds an engine from `options`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the HTTP client cannot be constructed.
    pub fn new(options: &Options) -> Result<Self, FetchError> {
        let client = build_http_client(options)?;

        let primary = PrimaryStrategy::new(
            client.clone(),
            options.primary_base_url.clone(),
            options.feed_user.clone(),
        );
        let instances = Arc::new(CachedInstanceList::new(InstanceList::new(
            options.mirror_instance_list_url.clone(),
        )));
        let mirror = MirrorStrategy::new(
            client,
            instances,
            options.feed_user.clone(),
            options.mirror_concurrency,
            options.dedup,
        );

        Ok(Self {
            orchestrator: Orchestrator::new(Arc::new(primary), Arc::new(mirror), options.retry),
            previous_flags: Mutex::new(SourceFlags::NONE),
        })
    }

    /// Runs one discovery cycle.
    ///
    /// An empty result is not an error; only exhausted transport failures
    /// propagate.
    ///
    /// # Errors
    ///
    /// Returns the folded branch failures when no source produced a
    /// successful result.
    pub async fn discover(
        &self,
        cancel: CancellationToken,
    ) -> Result<Vec<DiscoveredEntry>, FetchError> {
        let previous = *self.previous_flags.lock().await;
        debug!(%previous, "starting discovery cycle");

        let result = self.orchestrator.discover(previous, cancel).await;

        *self.previous_flags.lock().await = result.flags;
        result.outcome
    }
}
