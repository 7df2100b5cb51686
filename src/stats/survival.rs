//! Empirical Survival
//!
//! S(x) = |{v in sample : v >= x}| / n.

use serde::{Serialize, Deserialize};

use crate::store::is_valid_multiplier;

/// Fraction of the sample at or above `x`. 0 for an empty sample.
pub fn survival_at(x: f64, sample: &[f64]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    let count = sample.iter().filter(|v| **v >= x).count();
    count as f64 / sample.len() as f64
}

/// Survival curve evaluated at every distinct sample value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurvivalCurve {
    /// Distinct values, ascending.
    pub t: Vec<f64>,
    /// S(t) for each entry of `t`.
    #[serde(rename = "S")]
    pub s: Vec<f64>,
    /// Number of valid samples.
    pub n: usize,
}

/// Build the empirical survival curve of the valid (>= 1) part of `sample`.
pub fn empirical_survival(sample: &[f64]) -> SurvivalCurve {
    let mut sorted: Vec<f64> = sample
        .iter()
        .copied()
        .filter(|v| is_valid_multiplier(*v))
        .collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();

    let mut t = Vec::new();
    let mut s = Vec::new();
    for (i, v) in sorted.iter().enumerate() {
        if i > 0 && sorted[i - 1] == *v {
            continue;
        }
        // Everything from index i onward is >= v.
        t.push(*v);
        s.push((n - i) as f64 / n as f64);
    }

    SurvivalCurve { t, s, n }
}
