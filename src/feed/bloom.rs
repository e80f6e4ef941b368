//! Probabilistic membership filter used by the transient deduplicator.
//!
//! The filter only short-circuits an O(n) scan over the in-flight entry
//! buffer: every probable hit is confirmed against the real buffer before
//! any mutation, so a false positive can only cost extra comparisons, never
//! a wrong answer.

/// Bit budget of the filter: 8 words = 512 bits, enough for one feed page.
const FILTER_WORDS: usize = 8;

/// Default hash-function count; good for a few hundred keys at 512 bits.
pub(crate) const DEFAULT_HASH_COUNT: u32 = 3;

/// A fixed-size bloom filter over string keys.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: [u64; FILTER_WORDS],
    hash_count: u32,
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_COUNT)
    }
}

impl BloomFilter {
    /// Creates a filter with an explicit hash-function count (clamped to 1+).
    #[must_use]
    pub fn new(hash_count: u32) -> Self {
        Self {
            bits: [0; FILTER_WORDS],
            hash_count: hash_count.max(1),
        }
    }

    /// Creates a filter with a hash count derived from a target
    /// false-positive rate; see [`solve_k`].
    #[must_use]
    pub fn with_error_rate(error_rate: f64) -> Self {
        Self::new(solve_k(Self::bit_count(), error_rate))
    }

    /// Total bits available.
    #[must_use]
    pub fn bit_count() -> u32 {
        (FILTER_WORDS * 64) as u32
    }

    /// Adds an item to the filter. Items cannot be removed.
    pub fn add(&mut self, item: &str) {
        let (primary, secondary) = hash_pair(item);
        for i in 0..self.hash_count {
            let bit = combine(primary, secondary, i) % Self::bit_count();
            self.bits[(bit / 64) as usize] |= 1 << (bit % 64);
        }
    }

    /// Returns true when the item is *probably* present; false means
    /// definitely absent.
    #[must_use]
    pub fn contains(&self, item: &str) -> bool {
        let (primary, secondary) = hash_pair(item);
        (0..self.hash_count).all(|i| {
            let bit = combine(primary, secondary, i) % Self::bit_count();
            self.bits[(bit / 64) as usize] & (1 << (bit % 64)) != 0
        })
    }

    /// Ratio of set bits to total bits; a saturation diagnostic.
    #[must_use]
    pub fn truthiness(&self) -> f32 {
        let set: u32 = self.bits.iter().map(|word| word.count_ones()).sum();
        set as f32 / Self::bit_count() as f32
    }
}

/// Dillinger–Manolios double hashing: `h_i = primary + i * secondary`.
fn combine(primary: u32, secondary: u32, i: u32) -> u32 {
    primary.wrapping_add(i.wrapping_mul(secondary))
}

/// Two independent 32-bit string hashes (FNV-1a and Jenkins one-at-a-time).
fn hash_pair(item: &str) -> (u32, u32) {
    let mut fnv: u32 = 0x811c_9dc5;
    let mut oat: u32 = 0;
    for byte in item.bytes() {
        fnv ^= u32::from(byte);
        fnv = fnv.wrapping_mul(0x0100_0193);

        oat = oat.wrapping_add(u32::from(byte));
        oat = oat.wrapping_add(oat << 10);
        oat ^= oat >> 6;
    }
    oat = oat.wrapping_add(oat << 3);
    oat ^= oat >> 11;
    oat = oat.wrapping_add(oat << 15);
    (fnv, oat)
}

/// Solves for the hash-function count maximizing supported key count `n`
/// given `m` bits and an acceptable false-positive rate.
#[must_use]
pub(crate) fn solve_k(m: u32, error_rate: f64) -> u32 {
    let mut best_n = f64::MIN;
    let mut best_k = 1u32;
    for k in 1..=32u32 {
        let k_f = f64::from(k);
        let n = f64::from(m) / (-k_f / (1.0 - (error_rate.ln() / k_f).exp()).ln());
        if n > best_n {
            best_n = n;
            best_k = k;
        }
    }
    best_k
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_items_are_definitely_absent() {
        let mut filter = BloomFilter::default();
        filter.add("s/762440");
        filter.add("a/1601550");
        assert!(filter.contains("s/762440"));
        assert!(filter.contains("a/1601550"));
        assert!(!filter.contains("a/999999999"));
    }

    #[test]
    fn test_empty_filter_contains_nothing() {
        let filter = BloomFilter::default();
        assert!(!filter.contains("a/730"));
        assert!((filter.truthiness() - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_no_false_negatives_under_load() {
        let mut filter = BloomFilter::default();
        let keys: Vec<String> = (1..=100).map(|i| format!("a/{i}")).collect();
        for key in &keys {
            filter.add(key);
        }
        for key in &keys {
            assert!(filter.contains(key), "false negative for {key}");
        }
    }

    #[test]
    fn test_truthiness_grows_with_inserts() {
        let mut filter = BloomFilter::default();
        let before = filter.truthiness();
        filter.add("s/1");
        filter.add("s/2");
        assert!(filter.truthiness() > before);
        assert!(filter.truthiness() <= 1.0);
    }

    #[test]
    fn test_with_error_rate_has_no_false_negatives() {
        let mut filter = BloomFilter::with_error_rate(0.01);
        let keys: Vec<String> = (1..=100).map(|i| format!("s/{i}")).collect();
        for key in &keys {
            filter.add(key);
        }
        for key in &keys {
            assert!(filter.contains(key), "false negative for {key}");
        }
        assert!(filter.truthiness() <= 1.0);
    }

    #[test]
    fn test_solve_k_is_bounded_and_positive() {
        for rate in [0.2, 0.05, 0.01, 0.001] {
            let k = solve_k(BloomFilter::bit_count(), rate);
            assert!((1..=32).contains(&k), "k={k} for rate={rate}");
        }
    }
}
