//! Fixed-capacity open-addressing map over a flat word buffer.
//!
//! The whole map lives in one `[u64; 388]`-shaped buffer that is also the
//! on-disk representation: a magic word, a live count, a two-word occupancy
//! bit-set and 128 three-word slots of `(id, kind, timestamp)`. Collisions
//! resolve by linear probing; deletion uses backward shifting so probe
//! chains never need tombstones.

use super::LedgerError;
use super::bitset;
use crate::ids::{GameId, IdKind};

/// Number of record slots.
pub const CAPACITY: usize = 128;

/// Words per slot: id, kind (widened), timestamp.
const SLOT_WORDS: usize = 3;

/// Magic marker, packed into the low bytes of word 0.
const MAGIC: &[u8; 5] = b"mdict";

const HEADER_WORDS: usize = 2;
const MASK_WORDS: usize = bitset::words_for(CAPACITY);
const SLOTS_OFFSET: usize = HEADER_WORDS + MASK_WORDS;

/// Total buffer length in 64-bit words.
pub const WORDS: usize = SLOTS_OFFSET + CAPACITY * SLOT_WORDS;

/// The in-memory map; [`RecentMap::words`] is byte-for-byte what gets
/// persisted.
#[derive(Debug, Clone)]
pub struct RecentMap {
    words: Vec<u64>,
}

impl Default for RecentMap {
    fn default() -> Self {
        Self::new()
    }
}

impl RecentMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        let mut map = Self {
            words: vec![0; WORDS],
        };
        map.reset();
        map
    }

    /// Adopts a raw word buffer, validating it like [`RecentMap::reload`].
    pub fn from_words(words: Vec<u64>, allow_fixes: bool) -> Result<Self, LedgerError> {
        if words.len() != WORDS {
            return Err(LedgerError::BadLength {
                expected: WORDS,
                actual: words.len(),
            });
        }
        let mut map = Self { words };
        map.reload(allow_fixes)?;
        Ok(map)
    }

    /// Clears every record and rewrites the header.
    pub fn reset(&mut self) {
        self.words.fill(0);
        let mut magic = [0u8; 8];
        magic[..MAGIC.len()].copy_from_slice(MAGIC);
        self.words[0] = u64::from_ne_bytes(magic);
    }

    /// Revalidates the buffer after its contents were replaced wholesale.
    ///
    /// A wrong magic word or a count that disagrees with the occupancy
    /// bit-set means corruption: an error normally, a silent repair (reset
    /// or recount) when `allow_fixes` is set.
    pub fn reload(&mut self, allow_fixes: bool) -> Result<(), LedgerError> {
        let magic = &self.words[0].to_ne_bytes()[..MAGIC.len()];
        if magic != MAGIC {
            if allow_fixes {
                self.reset();
                return Ok(());
            }
            return Err(LedgerError::BadMagic);
        }

        let stored = self.words[1] as i64;
        let actual = bitset::count_ones(self.mask());
        if stored < 0 || stored as usize != actual {
            if !allow_fixes {
                return Err(LedgerError::CountMismatch { stored, actual });
            }
            self.words[1] = actual as u64;
        }
        Ok(())
    }

    /// The raw word buffer (the persistence format).
    #[must_use]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words[1] as usize
    }

    /// True when no record is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up the timestamp stored for `key`.
    #[must_use]
    pub fn get(&self, key: &GameId) -> Option<i64> {
        self.search(key).ok().map(|index| self.slot(index).2)
    }

    /// True when `key` has a live record.
    #[must_use]
    pub fn contains_key(&self, key: &GameId) -> bool {
        self.search(key).is_ok()
    }

    /// Inserts a record, refusing duplicates.
    ///
    /// Returns `Ok(true)` on insert, `Ok(false)` when the key already has a
    /// live record (which stays untouched).
    pub fn insert(&mut self, key: GameId, timestamp: i64) -> Result<bool, LedgerError> {
        if self.len() >= CAPACITY {
            return Err(LedgerError::CapacityExhausted);
        }
        match self.search(&key) {
            Ok(_) => Ok(false),
            Err(index) => {
                self.set_slot(index, &key, timestamp);
                bitset::set(self.mask_mut(), index, true);
                self.words[1] += 1;
                Ok(true)
            }
        }
    }

    /// Removes a record, backward-shifting the rest of the probe chain so
    /// later lookups still find their keys.
    pub fn remove(&mut self, key: &GameId) -> bool {
        let Ok(mut index) = self.search(key) else {
            return false;
        };
        bitset::set(self.mask_mut(), index, false);
        self.words[1] -= 1;

        let mut forward = (index + 1) % CAPACITY;
        for _ in 0..CAPACITY {
            if !self.occupied(forward) {
                break;
            }
            let (id, kind, timestamp) = self.slot(forward);
            let home = Self::home_index(&decode_key(id, kind));
            if distance(home, index) <= distance(home, forward) {
                let shifted = decode_key(id, kind);
                self.set_slot(index, &shifted, timestamp);
                bitset::set(self.mask_mut(), index, true);
                bitset::set(self.mask_mut(), forward, false);
                index = forward;
            }
            forward = (forward + 1) % CAPACITY;
        }
        true
    }

    /// Iterates live records in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (GameId, i64)> + '_ {
        (0..CAPACITY).filter_map(|index| {
            if self.occupied(index) {
                let (id, kind, timestamp) = self.slot(index);
                Some((decode_key(id, kind), timestamp))
            } else {
                None
            }
        })
    }

    /// Evicts the records closest to the epoch when occupancy crosses 80 %.
    ///
    /// Once triggered, up to `32` min-`|timestamp|` records are removed in
    /// one burst. Returns the number of evictions.
    pub fn ensure_fill_factor(&mut self) -> usize {
        const MAX_EVICTIONS: usize = 32;

        if CAPACITY * 8 >= self.len() * 10 {
            return 0;
        }

        let mut evicted = 0;
        while !self.is_empty() && evicted < MAX_EVICTIONS {
            let mut oldest: Option<(GameId, i64)> = None;
            for (key, timestamp) in self.iter() {
                let magnitude = timestamp.saturating_abs();
                if oldest.is_none_or(|(_, current)| magnitude <= current) {
                    oldest = Some((key, magnitude));
                }
            }
            match oldest {
                Some((key, _)) if self.remove(&key) => evicted += 1,
                _ => break,
            }
        }
        evicted
    }

    fn home_index(key: &GameId) -> usize {
        (key.bucket_hash() % CAPACITY as u64) as usize
    }

    /// `Ok(index)` of the key's slot, `Err(index)` of the first free slot on
    /// its probe chain.
    fn search(&self, key: &GameId) -> Result<usize, usize> {
        let mut index = Self::home_index(key);
        for _ in 0..CAPACITY {
            if !self.occupied(index) {
                return Err(index);
            }
            let (id, kind, _) = self.slot(index);
            if decode_key(id, kind) == *key {
                return Ok(index);
            }
            index = (index + 1) % CAPACITY;
        }
        // Full chain without a hit: report the wrap-around position; insert
        // guards on len() before ever using it.
        Err(index)
    }

    fn occupied(&self, index: usize) -> bool {
        bitset::get(self.mask(), index)
    }

    fn mask(&self) -> &[u64] {
        &self.words[HEADER_WORDS..SLOTS_OFFSET]
    }

    fn mask_mut(&mut self) -> &mut [u64] {
        &mut self.words[HEADER_WORDS..SLOTS_OFFSET]
    }

    fn slot(&self, index: usize) -> (i64, i64, i64) {
        let base = SLOTS_OFFSET + index * SLOT_WORDS;
        (
            self.words[base] as i64,
            self.words[base + 1] as i64,
            self.words[base + 2] as i64,
        )
    }

    fn set_slot(&mut self, index: usize, key: &GameId, timestamp: i64) {
        let base = SLOTS_OFFSET + index * SLOT_WORDS;
        self.words[base] = key.id() as u64;
        self.words[base + 1] = key.kind() as u64;
        self.words[base + 2] = timestamp as u64;
    }
}

/// Circular distance from `from` to `to`.
fn distance(from: usize, to: usize) -> usize {
    (to + CAPACITY - from) % CAPACITY
}

/// A corrupted kind word decodes as the untyped kind; reload-time count
/// validation already caught buffers that are wholesale garbage.
fn decode_key(id: i64, kind: i64) -> GameId {
    GameId::new(id, IdKind::from_i64(kind).unwrap_or_default())
}
