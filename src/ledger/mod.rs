//! Persistent ledger of redeemed (and permanently invalid) identifiers.
//!
//! The ledger answers "was this identifier already handled?" across runs.
//! Each record maps a [`GameId`] to a signed unix timestamp: positive means
//! redeemed, negative means permanently invalid, absent means unknown. The
//! backing store is a fixed-size word buffer ([`map::RecentMap`]) dumped to
//! disk as a small Brotli blob in native byte order.

mod bitset;
mod map;

pub use map::{CAPACITY, RecentMap, WORDS};

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ids::GameId;

/// Blob file extension; the letter encodes the byte order the file was
/// written in, so a copy from a foreign-endian host is never misread.
#[cfg(target_endian = "little")]
pub const FILE_EXTENSION: &str = ".fgldict";
#[cfg(target_endian = "big")]
pub const FILE_EXTENSION: &str = ".fgbdict";

/// Brotli settings: fastest quality, default window, small buffers (the
/// payload is ~3 KiB).
const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_QUALITY: u32 = 1;
const BROTLI_LGWIN: u32 = 22;

/// Errors from ledger operations and persistence.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The blob does not start with the expected magic marker.
    #[error("ledger blob has a bad magic marker")]
    BadMagic,

    /// The stored record count disagrees with the occupancy bit-set.
    #[error("ledger count mismatch: header says {stored}, occupancy says {actual}")]
    CountMismatch {
        /// Count read from the header word.
        stored: i64,
        /// Count recomputed from the occupancy bit-set.
        actual: usize,
    },

    /// The decompressed blob has the wrong size.
    #[error("ledger blob has {actual} words, expected {expected}")]
    BadLength {
        /// Expected word count.
        expected: usize,
        /// Actual word count.
        actual: usize,
    },

    /// Every slot is occupied.
    #[error("ledger is full")]
    CapacityExhausted,

    /// Underlying IO failure; call sites log the affected path.
    #[error("ledger IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The redeemed-identifier ledger.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    map: RecentMap,
}

impl Ledger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: RecentMap::new(),
        }
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when the ledger has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Records `id` as redeemed now. Returns false (and changes nothing)
    /// when a record already exists.
    pub fn add(&mut self, id: GameId) -> Result<bool, LedgerError> {
        self.add_dated(id, Utc::now().timestamp())
    }

    /// Records `id` as permanently invalid now; same duplicate rule as
    /// [`Ledger::add`].
    pub fn add_invalid(&mut self, id: GameId) -> Result<bool, LedgerError> {
        self.add_dated(id, -Utc::now().timestamp())
    }

    /// Records `id` with an explicit signed timestamp.
    pub fn add_dated(&mut self, id: GameId, timestamp: i64) -> Result<bool, LedgerError> {
        let evicted = self.map.ensure_fill_factor();
        if evicted > 0 {
            debug!(evicted, "ledger crossed its fill factor, evicted oldest records");
        }
        self.map.insert(id, timestamp)
    }

    /// True when `id` was redeemed.
    #[must_use]
    pub fn contains(&self, id: &GameId) -> bool {
        self.map.get(id).is_some_and(|timestamp| timestamp > 0)
    }

    /// True when `id` was marked permanently invalid.
    #[must_use]
    pub fn contains_invalid(&self, id: &GameId) -> bool {
        self.map.get(id).is_some_and(|timestamp| timestamp < 0)
    }

    /// Signed timestamp stored for `id`, if any.
    #[must_use]
    pub fn date(&self, id: &GameId) -> Option<i64> {
        self.map.get(id)
    }

    /// Drops the record for `id`.
    pub fn remove(&mut self, id: &GameId) -> bool {
        self.map.remove(id)
    }

    /// Writes the Brotli-compressed blob.
    pub fn save<W: Write>(&self, writer: W) -> Result<(), LedgerError> {
        let mut encoder =
            brotli::CompressorWriter::new(writer, BROTLI_BUFFER_SIZE, BROTLI_QUALITY, BROTLI_LGWIN);
        // One buffered write: per-word writes make brotli 7 emit each tiny
        // input as a raw block, inflating the blob past the raw dump size.
        let mut bytes = Vec::with_capacity(WORDS * 8);
        for word in self.map.words() {
            bytes.extend_from_slice(&word.to_ne_bytes());
        }
        encoder.write_all(&bytes)?;
        encoder.flush()?;
        Ok(())
    }

    /// Reads a Brotli-compressed blob and validates it; see
    /// [`RecentMap::reload`] for what `allow_fixes` repairs.
    pub fn load<R: Read>(reader: R, allow_fixes: bool) -> Result<Self, LedgerError> {
        let mut bytes = Vec::with_capacity(WORDS * 8);
        brotli::Decompressor::new(reader, BROTLI_BUFFER_SIZE).read_to_end(&mut bytes)?;
        Self::from_blob_bytes(&bytes, allow_fixes)
    }

    fn from_blob_bytes(bytes: &[u8], allow_fixes: bool) -> Result<Self, LedgerError> {
        if bytes.len() != WORDS * 8 {
            return Err(LedgerError::BadLength {
                expected: WORDS,
                actual: bytes.len() / 8,
            });
        }
        let words: Vec<u64> = bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                u64::from_ne_bytes(word)
            })
            .collect();
        Ok(Self {
            map: RecentMap::from_words(words, allow_fixes)?,
        })
    }

    /// Saves to a file, truncating any previous content.
    pub fn save_to_path(&self, path: &Path) -> Result<(), LedgerError> {
        let file = File::create(path)?;
        self.save(BufWriter::new(file))?;
        debug!(path = %path.display(), records = self.len(), "saved ledger");
        Ok(())
    }

    /// Loads from a file, self-healing on corruption.
    ///
    /// A missing file yields an empty ledger. A corrupted blob is logged,
    /// then repaired where possible (count recomputation) or replaced by an
    /// empty ledger; only plain IO failures propagate.
    pub fn load_from_path(path: &Path) -> Result<Self, LedgerError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::new());
            }
            Err(error) => return Err(error.into()),
        };

        let mut bytes = Vec::with_capacity(WORDS * 8);
        match brotli::Decompressor::new(BufReader::new(file), BROTLI_BUFFER_SIZE)
            .read_to_end(&mut bytes)
        {
            Ok(_) => {}
            Err(error) => {
                warn!(path = %path.display(), %error, "unreadable ledger file, starting empty");
                return Ok(Self::new());
            }
        }

        match Self::from_blob_bytes(&bytes, false) {
            Ok(ledger) => Ok(ledger),
            Err(error @ (LedgerError::BadMagic | LedgerError::CountMismatch { .. })) => {
                warn!(path = %path.display(), %error, "corrupted ledger file, repairing");
                Self::from_blob_bytes(&bytes, true)
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "corrupted ledger file, starting empty");
                Ok(Self::new())
            }
        }
    }
}

/// Derives the ledger blob path from a per-account config path: a `.json`
/// suffix is swapped for [`FILE_EXTENSION`], anything else gets the
/// extension appended.
#[must_use]
pub fn ledger_path_for(config_path: &Path) -> PathBuf {
    let text = config_path.to_string_lossy();
    // `get` rejects a split inside a multi-byte character, so non-ASCII
    // paths fall through to the append branch instead of panicking.
    let stem = text
        .get(text.len().saturating_sub(5)..)
        .filter(|suffix| suffix.eq_ignore_ascii_case(".json"))
        .map_or(text.as_ref(), |suffix| &text[..text.len() - suffix.len()]);
    PathBuf::from(format!("{stem}{FILE_EXTENSION}"))
}
