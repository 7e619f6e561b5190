//! Hashing primitives.

use std::hash::{BuildHasher as _, Hash, Hasher as _};

/// [`BuildHasher`][std::hash::BuildHasher] for a fast, non-cryptographic hash implementation that is optimized for
/// quality.
///
/// Currently, [`foldhash`][foldhash] is used as the underlying implementation.
///
/// [foldhash]: http://github.com/orlp/foldhash
pub type FastBuildHasher = foldhash::quality::RandomState;

// Fixed seeds for the two lanes of `OrderIndependentHasher`.
const LOW_LANE_SEED: u64 = 0x9e37_79b9_7f4a_7c15;
const HIGH_LANE_SEED: u64 = 0xc2b2_ae3d_27d4_eb4f;

#[inline]
fn hash_with_seed<H: Hash>(seed: u64, value: H) -> u64 {
    let mut hasher = foldhash::quality::FixedState::with_seed(seed).build_hasher();
    value.hash(&mut hasher);
    hasher.finish()
}

/// A 128-bit hasher whose output does not depend on the order in which items are added.
///
/// Each item is hashed independently in two lanes with distinct fixed seeds, and the per-item hashes are combined
/// with commutative operations (XOR in the low lane, wrapping addition in the high lane). The number of items is mixed
/// into the final digest. Output is deterministic across processes.
///
/// This is intended for hashing unordered collections, such as attribute maps, where two maps holding the same entries
/// must produce the same digest regardless of insertion order.
#[derive(Clone, Debug, Default)]
pub struct OrderIndependentHasher {
    low: u64,
    high: u64,
    count: u64,
}

impl OrderIndependentHasher {
    /// Creates a new, empty `OrderIndependentHasher`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item to the digest.
    pub fn add<H: Hash>(&mut self, item: H) {
        self.low ^= hash_with_seed(LOW_LANE_SEED, &item);
        self.high = self.high.wrapping_add(hash_with_seed(HIGH_LANE_SEED, &item));
        self.count += 1;
    }

    /// Finalizes the digest.
    pub fn finish(&self) -> u128 {
        let low = hash_with_seed(LOW_LANE_SEED, (self.count, self.low));
        let high = hash_with_seed(HIGH_LANE_SEED, (self.count, self.high));
        (u128::from(high) << 64) | u128::from(low)
    }
}
