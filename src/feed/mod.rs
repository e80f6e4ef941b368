//! Discovered-entry model shared by the primary-source extractor and the
//! mirror markup scanner.
//!
//! Both parsers produce [`DiscoveredEntry`] values: a raw identifier string
//! (validated later by the consumer), a classification flag set and an
//! observation timestamp.

mod bloom;
mod extractor;

pub use bloom::BloomFilter;
pub use extractor::{DEDUP_BUFFER_CAPACITY, parse_feed};

use std::fmt;
use std::ops::BitOr;
use std::sync::LazyLock;

use regex::Regex;

/// Matches an `addlicense` command followed by one or more `s/`/`a/` tokens.
///
/// The leading `.` intentionally matches any command prefix character
/// (`!addlicense`, `.addlicense`, ...).
#[allow(clippy::expect_used)]
pub(crate) static COMMAND_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(.addlicense)\s+(asf)?\s*(((s/|a/)\d+)\s*,?\s*)+")
        .expect("command regex is valid") // Static pattern, safe to panic
});

/// Matches one typed identifier token inside a command match.
#[allow(clippy::expect_used)]
pub(crate) static ID_TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(s/|a/)\d+").expect("id token regex is valid") // Static pattern, safe to panic
});

/// "permanently free" phrasing marks a giveaway that stays claimable forever.
#[allow(clippy::expect_used)]
pub(crate) static IS_PERMANENTLY_FREE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)permanently\s+free").expect("permanently-free regex is valid") // Static pattern, safe to panic
});

/// "free DLC for a" phrasing marks a DLC entry (or its required base game).
#[allow(clippy::expect_used)]
pub(crate) static IS_DLC_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)free\s+DLC\s+for\s+a").expect("dlc regex is valid") // Static pattern, safe to panic
});

/// "free to play" phrasing, only emitted by mirror-rendered blocks.
#[allow(clippy::expect_used)]
pub(crate) static IS_FREE_TO_PLAY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)free\s+to\s+play").expect("free-to-play regex is valid") // Static pattern, safe to panic
});

/// Classification flags attached to a discovered entry.
///
/// A small hand-rolled flag set: the two bits are independent, an entry can
/// carry both (a permanently-free DLC), either, or neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntryKind(u8);

impl EntryKind {
    /// No classification.
    pub const NONE: Self = Self(0);
    /// The entry is free to keep forever / free to play.
    pub const FREE_TO_PLAY: Self = Self(1);
    /// The entry is a DLC or a base game required by a free DLC.
    pub const DLC: Self = Self(1 << 1);

    /// Returns true if every flag in `other` is set in `self`.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Convenience accessor for the free-to-play flag.
    #[must_use]
    pub fn is_free_to_play(self) -> bool {
        self.contains(Self::FREE_TO_PLAY)
    }

    /// Convenience accessor for the DLC flag.
    #[must_use]
    pub fn is_dlc(self) -> bool {
        self.contains(Self::DLC)
    }
}

impl BitOr for EntryKind {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_free_to_play(), self.is_dlc()) {
            (false, false) => write!(f, "none"),
            (true, false) => write!(f, "free-to-play"),
            (false, true) => write!(f, "dlc"),
            (true, true) => write!(f, "free-to-play|dlc"),
        }
    }
}

/// One discovered free-game announcement.
///
/// `identifier` is raw text (one token from the primary feed, or a
/// comma-joined list from a mirror block); the consuming redemption loop is
/// responsible for turning it into validated [`crate::ids::GameId`] values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredEntry {
    /// Raw identifier text, not yet validated.
    pub identifier: String,
    /// Classification flags.
    pub kind: EntryKind,
    /// Observation time, unix seconds.
    pub date: i64,
}

impl DiscoveredEntry {
    /// Creates a new entry.
    #[must_use]
    pub fn new(identifier: impl Into<String>, kind: EntryKind, date: i64) -> Self {
        Self {
            identifier: identifier.into(),
            kind,
            date,
        }
    }
}

impl fmt::Display for DiscoveredEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] @{}", self.identifier, self.kind, self.date)
    }
}
