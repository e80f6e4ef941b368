//! Racing orchestrator over the primary and mirror strategies.
//!
//! The feed is usually reachable through the primary source, so it gets a
//! head start; the mirror fan-out only spins up when the primary stalls.
//! All timing is tuned by what happened last cycle, carried in
//! [`SourceFlags`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{FetchError, FetchStrategy, SourceFlags};
use crate::feed::DiscoveredEntry;

/// Budget for the primary's first, quick attempt.
const FIRST_TRY_TIMEOUT: Duration = Duration::from_secs(10);
/// Grace delay before the first attempt when last cycle's primary failed.
const FIRST_TRY_DELAY: Duration = Duration::from_secs(1);
/// How long a previously healthy primary is waited for before racing.
const FIRST_TRY_GRACE: Duration = Duration::from_millis(2500);
/// Hard cap on the racing phase.
const RACE_DEADLINE: Duration = Duration::from_secs(45);

/// One discovery cycle's outcome: the entries (or the folded error) plus
/// the sources that completed successfully, to be fed into the next cycle.
#[derive(Debug)]
pub struct CycleResult {
    /// Sources with at least one successful completion this cycle.
    pub flags: SourceFlags,
    /// The discovered entries, or the folded branch failures.
    pub outcome: Result<Vec<DiscoveredEntry>, FetchError>,
}

enum Branch {
    Primary,
    Mirror,
}

type BranchResult = (Branch, Result<Vec<DiscoveredEntry>, FetchError>);

/// Orchestrates one discovery cycle over both strategies.
pub struct Orchestrator {
    primary: Arc<dyn FetchStrategy>,
    mirror: Arc<dyn FetchStrategy>,
    retry: u32,
    // One cycle at a time per orchestrator.
    cycle_lock: Mutex<()>,
}

impl Orchestrator {
    /// Creates an orchestrator with a total retry budget shared by the
    /// primary attempts (the quick attempt takes one, the patient attempt
    /// the rest).
    #[must_use]
    pub fn new(
        primary: Arc<dyn FetchStrategy>,
        mirror: Arc<dyn FetchStrategy>,
        retry: u32,
    ) -> Self {
        Self {
            primary,
            mirror,
            retry: retry.max(1),
            cycle_lock: Mutex::new(()),
        }
    }

    /// Runs one discovery cycle.
    ///
    /// 1. The primary makes a quick attempt (retry budget 1, capped at 10 s,
    ///    preceded by a 1 s grace delay when last cycle's primary failed).
    /// 2. When last cycle's primary succeeded, up to 2.5 s is spent waiting
    ///    for that attempt; a non-empty result returns immediately.
    /// 3. Otherwise the quick attempt, a second primary attempt (starting
    ///    once the first settles) and the mirror fan-out race under a 45 s
    ///    cap; the first non-empty success wins and the losers are
    ///    cancelled.
    /// 4. With no winner, collected branch failures fold into a single
    ///    error; no failures at all means an empty cycle, which is a valid
    ///    result.
    pub async fn discover(&self, previous: SourceFlags, cancel: CancellationToken) -> CycleResult {
        let _cycle = self.cycle_lock.lock().await;

        let root = cancel.child_token();
        let result = self.run_cycle(previous, &root).await;
        // Whatever the exit path, no branch outlives the cycle.
        root.cancel();
        if let Ok(entries) = &result.outcome {
            info!(entries = entries.len(), flags = %result.flags, "discovery cycle finished");
        }
        result
    }

    async fn run_cycle(&self, previous: SourceFlags, root: &CancellationToken) -> CycleResult {
        let previous_primary_ok = previous.contains(SourceFlags::PRIMARY);

        let (branch_tx, mut branch_rx) = mpsc::unbounded_channel::<BranchResult>();
        let (first_done_tx, first_done_rx) = watch::channel(false);

        // Primary, quick attempt.
        {
            let strategy = Arc::clone(&self.primary);
            let token = root.child_token();
            let tx = branch_tx.clone();
            tokio::spawn(async move {
                let result = async {
                    if !previous_primary_ok {
                        tokio::select! {
                            () = token.cancelled() => return Err(FetchError::Cancelled),
                            () = tokio::time::sleep(FIRST_TRY_DELAY) => {}
                        }
                    }
                    match tokio::time::timeout(FIRST_TRY_TIMEOUT, strategy.fetch(1, token.clone()))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(FetchError::Cancelled),
                    }
                }
                .await;
                let _ = first_done_tx.send(true);
                let _ = tx.send((Branch::Primary, result));
            });
        }

        let mut flags = SourceFlags::NONE;
        let mut errors: Vec<FetchError> = Vec::new();
        let mut pending = 1usize;

        // Phase 1: give a previously healthy primary a short exclusive
        // window before waking the mirror.
        let mut stashed: Option<BranchResult> = None;
        if previous_primary_ok {
            tokio::select! {
                () = root.cancelled() => {
                    return CycleResult { flags, outcome: Err(FetchError::Cancelled) };
                }
                () = tokio::time::sleep(FIRST_TRY_GRACE) => {}
                message = branch_rx.recv() => stashed = message,
            }
            if let Some((_, Ok(entries))) = &stashed {
                if !entries.is_empty() {
                    let entries = entries.clone();
                    flags = flags | SourceFlags::PRIMARY;
                    debug!("primary quick attempt won without racing");
                    return CycleResult {
                        flags,
                        outcome: Ok(entries),
                    };
                }
            }
        }

        // Phase 2: full race.
        {
            let strategy = Arc::clone(&self.primary);
            let token = root.child_token();
            let tx = branch_tx.clone();
            let retry = self.retry.saturating_sub(1).max(1);
            let mut first_done = first_done_rx;
            tokio::spawn(async move {
                // The patient attempt starts once the quick one settles.
                let result = async {
                    if first_done.wait_for(|done| *done).await.is_err() {
                        return Err(FetchError::Cancelled);
                    }
                    tokio::select! {
                        () = token.cancelled() => Err(FetchError::Cancelled),
                        result = strategy.fetch(retry, token.clone()) => result,
                    }
                }
                .await;
                let _ = tx.send((Branch::Primary, result));
            });
            pending += 1;
        }
        {
            let strategy = Arc::clone(&self.mirror);
            let token = root.child_token();
            let tx = branch_tx.clone();
            let retry = self.retry;
            tokio::spawn(async move {
                let result = strategy.fetch(retry, token.clone()).await;
                let _ = tx.send((Branch::Mirror, result));
            });
            pending += 1;
        }
        drop(branch_tx);

        let deadline = tokio::time::Instant::now() + RACE_DEADLINE;
        let settle = |message: BranchResult,
                          flags: &mut SourceFlags,
                          errors: &mut Vec<FetchError>|
         -> Option<Vec<DiscoveredEntry>> {
            let (branch, result) = message;
            let source = match branch {
                Branch::Primary => SourceFlags::PRIMARY,
                Branch::Mirror => SourceFlags::MIRROR,
            };
            match result {
                Ok(entries) => {
                    *flags = *flags | source;
                    if entries.is_empty() { None } else { Some(entries) }
                }
                Err(error) => {
                    warn!(source = %source, %error, "fetch branch failed");
                    errors.push(error);
                    None
                }
            }
        };

        if let Some(message) = stashed.take() {
            pending -= 1;
            if let Some(entries) = settle(message, &mut flags, &mut errors) {
                return CycleResult {
                    flags,
                    outcome: Ok(entries),
                };
            }
        }

        while pending > 0 {
            let message = tokio::select! {
                () = root.cancelled() => {
                    return CycleResult { flags, outcome: Err(FetchError::Cancelled) };
                }
                () = tokio::time::sleep_until(deadline) => {
                    debug!(pending, "race deadline reached, cancelling remaining branches");
                    errors.extend(std::iter::repeat_with(|| FetchError::Cancelled).take(pending));
                    break;
                }
                message = branch_rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            pending -= 1;
            if let Some(entries) = settle(message, &mut flags, &mut errors) {
                return CycleResult {
                    flags,
                    outcome: Ok(entries),
                };
            }
        }

        let outcome = match FetchError::from_collected(errors) {
            Some(error) => Err(error),
            None => Ok(Vec::new()),
        };
        CycleResult { flags, outcome }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::feed::EntryKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted strategy for exercising the orchestrator's timing rules.
    struct SpyStrategy {
        name: &'static str,
        delay: Duration,
        result: fn() -> Result<Vec<DiscoveredEntry>, FetchError>,
        calls: AtomicU32,
    }

    impl SpyStrategy {
        fn new(
            name: &'static str,
            delay: Duration,
            result: fn() -> Result<Vec<DiscoveredEntry>, FetchError>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                delay,
                result,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl FetchStrategy for SpyStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(
            &self,
            _retry: u32,
            cancel: CancellationToken,
        ) -> Result<Vec<DiscoveredEntry>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::select! {
                () = cancel.cancelled() => Err(FetchError::Cancelled),
                () = tokio::time::sleep(self.delay) => (self.result)(),
            }
        }
    }

    fn one_entry() -> Result<Vec<DiscoveredEntry>, FetchError> {
        Ok(vec![DiscoveredEntry::new("a/730", EntryKind::NONE, 1)])
    }

    fn empty() -> Result<Vec<DiscoveredEntry>, FetchError> {
        Ok(Vec::new())
    }

    fn failure() -> Result<Vec<DiscoveredEntry>, FetchError> {
        Err(FetchError::http_status("https://feed.example.com", 500))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_primary_wins_without_mirror() {
        let primary = SpyStrategy::new("primary", Duration::from_millis(50), one_entry);
        let mirror = SpyStrategy::new("mirror", Duration::from_millis(10), one_entry);
        let orchestrator =
            Orchestrator::new(primary.clone() as _, mirror.clone() as _, 5);

        let result = orchestrator
            .discover(SourceFlags::PRIMARY, CancellationToken::new())
            .await;
        assert_eq!(result.outcome.unwrap().len(), 1);
        assert_eq!(result.flags, SourceFlags::PRIMARY);
        assert_eq!(primary.calls(), 1, "quick attempt only");
        assert_eq!(mirror.calls(), 0, "mirror must not be woken");
    }

    #[tokio::test(start_paused = true)]
    async fn test_mirror_wins_when_primary_is_empty() {
        let primary = SpyStrategy::new("primary", Duration::from_millis(10), empty);
        let mirror = SpyStrategy::new("mirror", Duration::from_millis(100), one_entry);
        let orchestrator =
            Orchestrator::new(primary.clone() as _, mirror.clone() as _, 5);

        let result = orchestrator
            .discover(SourceFlags::PRIMARY, CancellationToken::new())
            .await;
        assert_eq!(result.outcome.unwrap().len(), 1);
        assert!(result.flags.contains(SourceFlags::MIRROR));
        assert!(result.flags.contains(SourceFlags::PRIMARY), "empty success still counts");
        assert!(mirror.calls() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_previous_primary_gets_grace_delay() {
        let primary = SpyStrategy::new("primary", Duration::from_millis(10), one_entry);
        let mirror = SpyStrategy::new("mirror", Duration::from_secs(30), empty);
        let orchestrator =
            Orchestrator::new(primary.clone() as _, mirror.clone() as _, 5);

        // Previous cycle had no primary success: race starts immediately,
        // so the mirror is invoked even though the primary wins.
        let result = orchestrator
            .discover(SourceFlags::NONE, CancellationToken::new())
            .await;
        assert_eq!(result.outcome.unwrap().len(), 1);
        assert!(result.flags.contains(SourceFlags::PRIMARY));
        assert_eq!(mirror.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_primary_folds_into_aggregate() {
        let primary = SpyStrategy::new("primary", Duration::from_millis(10), failure);
        let mirror = SpyStrategy::new("mirror", Duration::from_millis(10), empty);
        let orchestrator = Orchestrator::new(primary as _, mirror as _, 5);

        let result = orchestrator
            .discover(SourceFlags::NONE, CancellationToken::new())
            .await;
        // Mirror completed successfully (empty), both primary attempts failed.
        assert!(result.flags.contains(SourceFlags::MIRROR));
        assert!(!result.flags.contains(SourceFlags::PRIMARY));
        match result.outcome {
            Err(FetchError::Aggregate(inner)) => assert_eq!(inner.len(), 2),
            other => panic!("expected aggregate of both primary attempts, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_empty_success_is_ok_empty() {
        let primary = SpyStrategy::new("primary", Duration::from_millis(10), empty);
        let mirror = SpyStrategy::new("mirror", Duration::from_millis(10), empty);
        let orchestrator = Orchestrator::new(primary as _, mirror as _, 5);

        let result = orchestrator
            .discover(SourceFlags::NONE, CancellationToken::new())
            .await;
        assert!(result.outcome.unwrap().is_empty());
        assert!(result.flags.contains(SourceFlags::PRIMARY));
        assert!(result.flags.contains(SourceFlags::MIRROR));
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_cancellation() {
        let primary = SpyStrategy::new("primary", Duration::from_secs(120), empty);
        let mirror = SpyStrategy::new("mirror", Duration::from_secs(120), empty);
        let orchestrator = Orchestrator::new(primary as _, mirror as _, 5);

        let cancel = CancellationToken::new();
        let child = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            child.cancel();
        });
        let result = orchestrator.discover(SourceFlags::NONE, cancel).await;
        assert!(matches!(result.outcome, Err(FetchError::Cancelled)));
    }
}
