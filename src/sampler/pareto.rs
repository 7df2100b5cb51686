//! Pareto Fallback Law
//!
//! Heavy-tailed law used when no history exists, and by the parametric
//! stream on every round.

use serde::{Deserialize, Serialize};

use crate::core::rng::StreamRng;

/// Scale of the fallback law (its minimum value).
pub const PARETO_SCALE: f64 = 1.0;

/// Shape of the fallback law.
pub const PARETO_SHAPE: f64 = 2.0;

/// Pareto law, sampled by inverse transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParetoLaw {
    /// Minimum value `xm`.
    pub scale: f64,
    /// Tail index `alpha`.
    pub shape: f64,
}

impl Default for ParetoLaw {
    fn default() -> Self {
        Self {
            scale: PARETO_SCALE,
            shape: PARETO_SHAPE,
        }
    }
}

impl ParetoLaw {
    /// Inverse CDF: `scale * (1 - u)^(-1/shape)` for `u ∈ [0, 1)`.
    #[inline]
    pub fn quantile(&self, u: f64) -> f64 {
        self.scale * (1.0 - u).powf(-1.0 / self.shape)
    }

    /// Draw one value.
    #[inline]
    pub fn draw(&self, rng: &mut StreamRng) -> f64 {
        self.quantile(rng.next_f64())
    }
}

/// Crash sampler that always draws from a Pareto law.
#[derive(Debug, Clone)]
pub struct ParetoSampler {
    law: ParetoLaw,
    rng: StreamRng,
}

impl ParetoSampler {
    /// Draw from `law` with `rng`.
    pub fn new(law: ParetoLaw, rng: StreamRng) -> Self {
        Self { law, rng }
    }

    /// Draw a crash threshold.
    pub fn sample(&mut self) -> f64 {
        self.law.draw(&mut self.rng).max(1.0)
    }
}
