//! Crash-Point Samplers
//!
//! Each stream owns one sampler, chosen at construction:
//!
//! - `Empirical`: uniform over stored history, Pareto when history is empty
//! - `Parametric`: Pareto(1, 2) on every round
//! - `ProvablyFair`: HMAC-derived from seeds and the round nonce
//!
//! The engine draws once per round and calls [`CrashSampler::advance`] after
//! the round crashes.

pub mod empirical;
pub mod pareto;

use std::sync::Arc;

use crate::core::fair::FairSeeds;
use crate::core::rng::StreamRng;
use crate::store::SampleStore;

pub use empirical::{sample_from, EmpiricalSampler};
pub use pareto::{ParetoLaw, ParetoSampler};

/// One round's threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Draw {
    /// Crash threshold, always >= 1.
    pub threshold: f64,
    /// Round nonce, provably-fair streams only.
    pub nonce: Option<u64>,
}

/// Sampler over a set of seeds.
#[derive(Debug, Clone)]
pub struct FairSampler {
    seeds: FairSeeds,
}

impl FairSampler {
    /// Start at the nonce carried by `seeds`.
    pub fn new(seeds: FairSeeds) -> Self {
        Self { seeds }
    }
}

/// Sampler strategy of a stream.
#[derive(Debug)]
pub enum CrashSampler {
    /// Resample stored history.
    Empirical(EmpiricalSampler),
    /// Fixed Pareto law.
    Parametric(ParetoSampler),
    /// Seed-derived rounds.
    ProvablyFair(FairSampler),
}

impl CrashSampler {
    /// Empirical sampler over `store`.
    pub fn empirical(store: Arc<dyn SampleStore>, rng: StreamRng) -> Self {
        Self::Empirical(EmpiricalSampler::new(store, rng))
    }

    /// Pareto(1, 2) sampler.
    pub fn parametric(rng: StreamRng) -> Self {
        Self::Parametric(ParetoSampler::new(ParetoLaw::default(), rng))
    }

    /// Provably-fair sampler starting at the nonce held in `seeds`.
    pub fn provably_fair(seeds: FairSeeds) -> Self {
        Self::ProvablyFair(FairSampler::new(seeds))
    }

    /// Threshold for the current round.
    ///
    /// Provably-fair draws are pure in the nonce; the others consume
    /// randomness on every call.
    pub fn draw(&mut self) -> Draw {
        match self {
            Self::Empirical(s) => Draw {
                threshold: s.sample(),
                nonce: None,
            },
            Self::Parametric(s) => Draw {
                threshold: s.sample(),
                nonce: None,
            },
            Self::ProvablyFair(s) => Draw {
                threshold: s.seeds.crash_point(),
                nonce: Some(s.seeds.nonce()),
            },
        }
    }

    /// Move to the next round. Only the provably-fair nonce carries state.
    pub fn advance(&mut self) {
        if let Self::ProvablyFair(s) = self {
            s.seeds.advance();
        }
    }

    /// Short name of the strategy, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empirical(_) => "empirical",
            Self::Parametric(_) => "parametric",
            Self::ProvablyFair(_) => "provably_fair",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fair::{crash_point, DEFAULT_HOUSE_EDGE};
    use crate::store::MemoryStore;

    #[test]
    fn test_fair_draw_and_advance() {
        let mut sampler =
            CrashSampler::provably_fair(FairSeeds::new("server-seed", "client-seed", 0, DEFAULT_HOUSE_EDGE));

        let first = sampler.draw();
        assert_eq!(first.nonce, Some(0));
        assert_eq!(first.threshold, crash_point("server-seed", "client-seed", 0, DEFAULT_HOUSE_EDGE));
        // Same round, same threshold.
        assert_eq!(sampler.draw(), first);

        sampler.advance();
        let second = sampler.draw();
        assert_eq!(second.nonce, Some(1));
        assert!((second.threshold - 1.321553367353275).abs() < 1e-12);
    }

    #[test]
    fn test_advance_is_noop_for_random_samplers() {
        let store = Arc::new(MemoryStore::with_values("seed", &[2.0]));
        let mut sampler = CrashSampler::empirical(store, StreamRng::new(1));
        sampler.advance();
        assert_eq!(sampler.draw(), Draw { threshold: 2.0, nonce: None });
        assert_eq!(sampler.kind(), "empirical");

        let mut sampler = CrashSampler::parametric(StreamRng::new(1));
        sampler.advance();
        let d = sampler.draw();
        assert!(d.threshold >= 1.0);
        assert_eq!(d.nonce, None);
    }
}
