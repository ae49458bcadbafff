//! Deterministic utilities for reproducible resampling
//!
//! Provides an LCG-based RNG, seed mixing for independent streams, and the
//! tie-breaking key used by split search so that identical inputs always
//! produce identical splits, resamples and trees.

use std::num::Wrapping;

/// Stream id used by the train/test splitter
pub const SPLIT_STREAM: u64 = 0x5350_4c49_54;

/// Base stream id for bootstrap resamples (resample `b` uses `BOOTSTRAP_STREAM + b`)
pub const BOOTSTRAP_STREAM: u64 = 0x0100_0000;

/// 64-bit Linear Congruential Generator (Knuth MMIX constants)
///
/// Output is taken from the high 32 bits, which have the full period.
#[derive(Clone, Debug)]
pub struct LcgRng {
    state: Wrapping<u64>,
}

impl LcgRng {
    const MULTIPLIER: u64 = 6_364_136_223_846_793_005;
    const INCREMENT: u64 = 1_442_695_040_888_963_407;

    pub fn new(seed: u64) -> Self {
        Self {
            state: Wrapping(mix_seed(seed, 0)),
        }
    }

    /// RNG for an independent stream derived from `seed`
    pub fn for_stream(seed: u64, stream: u64) -> Self {
        Self {
            state: Wrapping(mix_seed(seed, stream)),
        }
    }

    /// Generate the next 32 random bits
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state * Wrapping(Self::MULTIPLIER) + Wrapping(Self::INCREMENT);
        (self.state.0 >> 32) as u32
    }

    /// Generate random value in range [0, max)
    pub fn next_range(&mut self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        ((self.next_u32() as u64 * max as u64) >> 32) as usize
    }

    /// Fisher-Yates shuffle
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_range(i + 1);
            items.swap(i, j);
        }
    }
}

/// Mix a seed and a stream id into a well-distributed 64-bit state
///
/// xxhash64-style avalanche over the two inputs.
pub fn mix_seed(seed: u64, stream: u64) -> u64 {
    const PRIME1: u64 = 0x9E37_79B1_85EB_CA87;
    const PRIME2: u64 = 0xC2B2_AE3D_27D4_EB4F;
    const PRIME3: u64 = 0x1656_67B1_9E37_79F9;
    const PRIME5: u64 = 0x85EB_CA77_C2B2_AE63;

    let mut h = seed.wrapping_add(PRIME5);
    for val in [seed, stream] {
        h = h.wrapping_add(val.wrapping_mul(PRIME3));
        h = h.rotate_left(17).wrapping_mul(PRIME2);
    }

    h ^= h >> 33;
    h = h.wrapping_mul(PRIME1);
    h ^= h >> 29;
    h = h.wrapping_mul(PRIME2);
    h ^= h >> 32;
    h
}

/// Deterministic tie-breaker for split selection
///
/// Equal-gain candidates resolve to the lowest feature index, then the
/// earliest candidate position within that feature's sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SplitTieBreaker {
    pub feature_idx: usize,
    pub position: usize,
}

impl SplitTieBreaker {
    pub fn new(feature_idx: usize, position: usize) -> Self {
        Self {
            feature_idx,
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcg_determinism() {
        let mut rng1 = LcgRng::new(42);
        let mut rng2 = LcgRng::new(42);

        for _ in 0..100 {
            assert_eq!(rng1.next_u32(), rng2.next_u32());
        }
    }

    #[test]
    fn test_lcg_range() {
        let mut rng = LcgRng::new(42);
        let mut seen = [false; 10];
        for _ in 0..1_000 {
            let val = rng.next_range(10);
            assert!(val < 10);
            seen[val] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_streams_differ() {
        let mut a = LcgRng::for_stream(42, BOOTSTRAP_STREAM);
        let mut b = LcgRng::for_stream(42, BOOTSTRAP_STREAM + 1);
        let seq_a: Vec<u32> = (0..8).map(|_| a.next_u32()).collect();
        let seq_b: Vec<u32> = (0..8).map(|_| b.next_u32()).collect();
        assert_ne!(seq_a, seq_b);
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = LcgRng::new(3);
        let mut items: Vec<usize> = (0..50).collect();
        rng.shuffle(&mut items);

        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
        assert_ne!(items, sorted);
    }

    #[test]
    fn test_mix_seed_different_seeds() {
        assert_ne!(mix_seed(42, 0), mix_seed(43, 0));
        assert_eq!(mix_seed(42, 9), mix_seed(42, 9));
    }

    #[test]
    fn test_tie_breaker_ordering() {
        let t1 = SplitTieBreaker::new(0, 3);
        let t2 = SplitTieBreaker::new(0, 4);
        let t3 = SplitTieBreaker::new(1, 0);

        assert!(t1 < t2);
        assert!(t2 < t3);
    }
}
