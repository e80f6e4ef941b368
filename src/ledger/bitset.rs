//! Occupancy bit-set helpers over raw `u64` words.
//!
//! The ledger blob stores its slot-occupancy mask inline as whole words, so
//! these operate directly on a word slice instead of owning storage.

/// Number of words needed to hold `bits` bits.
pub(crate) const fn words_for(bits: usize) -> usize {
    bits.div_ceil(64)
}

/// Reads one bit. Out-of-range indices read as unset.
pub(crate) fn get(words: &[u64], index: usize) -> bool {
    words
        .get(index / 64)
        .is_some_and(|word| word & (1 << (index % 64)) != 0)
}

/// Writes one bit.
pub(crate) fn set(words: &mut [u64], index: usize, value: bool) {
    if let Some(word) = words.get_mut(index / 64) {
        if value {
            *word |= 1 << (index % 64);
        } else {
            *word &= !(1 << (index % 64));
        }
    }
}

/// Total number of set bits.
pub(crate) fn count_ones(words: &[u64]) -> usize {
    words.iter().map(|word| word.count_ones() as usize).sum()
}
