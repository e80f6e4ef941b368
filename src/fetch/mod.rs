//! Feed acquisition: strategies and the racing orchestrator.
//!
//! Two interchangeable [`FetchStrategy`] implementations acquire the
//! announcement feed (the primary JSON feed and the mirror HTML fan-out);
//! [`Orchestrator`] races them with the timing rules described on
//! [`Orchestrator::discover`].

mod error;
mod mirror;
mod orchestrator;
mod primary;

pub use error::FetchError;
pub use mirror::MirrorStrategy;
pub use orchestrator::{CycleResult, Orchestrator};
pub use primary::PrimaryStrategy;

use std::fmt;
use std::ops::BitOr;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::feed::DiscoveredEntry;

/// One way of acquiring the announcement feed.
///
/// `retry` is the attempt budget for this invocation; implementations honor
/// `cancel` at every await point and report [`FetchError::Cancelled`] when
/// it fires.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fetches the feed once, with internal retries up to `retry`.
    async fn fetch(
        &self,
        retry: u32,
        cancel: CancellationToken,
    ) -> Result<Vec<DiscoveredEntry>, FetchError>;
}

/// Which sources completed successfully, carried across discovery cycles.
///
/// The previous cycle's flags tune the next cycle's timing (a recently
/// healthy primary source gets a grace window before the mirror fan-out
/// starts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceFlags(u8);

impl SourceFlags {
    /// No source has completed successfully.
    pub const NONE: Self = Self(0);
    /// The primary feed completed successfully.
    pub const PRIMARY: Self = Self(1);
    /// The mirror fan-out completed successfully.
    pub const MIRROR: Self = Self(1 << 1);

    /// Returns true if every flag in `other` is set in `self`.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when no flag is set.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self == Self::NONE
    }
}

impl BitOr for SourceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for SourceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.contains(Self::PRIMARY), self.contains(Self::MIRROR)) {
            (false, false) => write!(f, "none"),
            (true, false) => write!(f, "primary"),
            (false, true) => write!(f, "mirror"),
            (true, true) => write!(f, "primary|mirror"),
        }
    }
}
