//! Stream Random Number Generator
//!
//! Uses Xorshift128+ for fast, reproducible draws in the empirical and
//! parametric samplers. Production streams seed it from fresh entropy;
//! tests seed it explicitly so every draw is repeatable.

use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

/// 2^53, the number of distinct f64 values in [0, 1) with full precision.
const F64_UNIT: f64 = (1u64 << 53) as f64;

/// Seeded PRNG using the Xorshift128+ algorithm.
///
/// # Example
///
/// ```
/// use crash_stream::core::rng::StreamRng;
///
/// let mut rng = StreamRng::new(12345);
/// let value = rng.next_u64();
/// assert_eq!(value, 6233086606872742541);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamRng {
    state: [u64; 2],
}

impl Default for StreamRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl StreamRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// SplitMix64 expands the seed so weak seeds still spread well.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // State must never be all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Create an RNG seeded from a random v4 UUID.
    pub fn from_entropy() -> Self {
        let bytes = uuid::Uuid::new_v4().into_bytes();
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&bytes[..8]);
        Self::new(u64::from_le_bytes(seed))
    }

    /// Create an RNG bound to a stream label and id.
    pub fn for_stream(label: &str, stream_id: &[u8; 16]) -> Self {
        Self::new(derive_stream_seed(label, stream_id))
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Uniform draw in [0, 1) with 53 bits of precision.
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / F64_UNIT
    }

    /// Uniform index in [0, len). Returns 0 for an empty range.
    ///
    /// Uses the high bits scaled by `len`, avoiding modulo bias for any
    /// sample size a dataset can reach.
    #[inline]
    pub fn next_index(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        ((self.next_u64() as u128 * len as u128) >> 64) as usize
    }

    /// Select a random element from a slice.
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            None
        } else {
            let idx = self.next_index(slice.len());
            Some(&slice[idx])
        }
    }
}

/// SplitMix64 for seed initialization.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive a seed from a stream's label and id.
///
/// Two streams with different ids never share a draw sequence, and a
/// recorded id reproduces the sequence of its stream.
pub fn derive_stream_seed(label: &str, stream_id: &[u8; 16]) -> u64 {
    let mut hasher = Sha256::new();

    // Domain separator
    hasher.update(b"CRASH_STREAM_SEED_V1");
    hasher.update(label.as_bytes());
    hasher.update(stream_id);

    let hash = hasher.finalize();
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&hash[..8]);
    u64::from_le_bytes(seed)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_determinism() {
        let mut rng1 = StreamRng::new(12345);
        let mut rng2 = StreamRng::new(12345);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_rng_known_values() {
        // Recorded streams replay against these; they must never change.
        let mut rng = StreamRng::new(42);
        assert_eq!(rng.next_u64(), 16629283624882167704);
        assert_eq!(rng.next_u64(), 1420492921613871959);
        assert_eq!(rng.next_u64(), 9768315062676884790);
    }

    #[test]
    fn test_next_f64_range() {
        let mut rng = StreamRng::new(9999);
        for _ in 0..10_000 {
            let u = rng.next_f64();
            assert!((0.0..1.0).contains(&u));
        }
    }

    #[test]
    fn test_next_index() {
        let mut rng = StreamRng::new(1234);

        for _ in 0..1000 {
            assert!(rng.next_index(7) < 7);
        }

        assert_eq!(rng.next_index(0), 0);
        assert_eq!(rng.next_index(1), 0);
    }

    #[test]
    fn test_next_index_covers_range() {
        let mut rng = StreamRng::new(77);
        let mut seen = [false; 5];
        for _ in 0..500 {
            seen[rng.next_index(5)] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_choose() {
        let mut rng = StreamRng::new(3);
        let empty: [f64; 0] = [];
        assert!(rng.choose(&empty).is_none());

        let values = [1.5, 2.5, 3.5];
        let picked = rng.choose(&values).unwrap();
        assert!(values.contains(picked));
    }

    #[test]
    fn test_derive_stream_seed() {
        let id = [1u8; 16];
        assert_eq!(derive_stream_seed("sim", &id), derive_stream_seed("sim", &id));
        assert_ne!(derive_stream_seed("sim", &id), derive_stream_seed("sim", &[2u8; 16]));
        assert_ne!(derive_stream_seed("sim", &id), derive_stream_seed("parametric", &id));
    }

    #[test]
    fn test_clone_replays() {
        let mut rng = StreamRng::new(5555);
        rng.next_u64();
        let mut copy = rng.clone();
        for _ in 0..10 {
            assert_eq!(rng.next_f64(), copy.next_f64());
        }
    }
}
