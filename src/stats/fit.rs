//! Parametric Model Fitting
//!
//! Three candidate laws for crash multipliers, fitted by maximum likelihood
//! and ranked by AIC:
//!
//! - `exponential_shift1`: X = 1 + Y, Y ~ Exp(lambda)
//! - `pareto_xm1`: Pareto with scale 1, S(t) = t^-alpha
//! - `truncated_exponential_mixture`: the exponential body mixed with a soft
//!   cap above the 0.99 quantile

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::rng::StreamRng;
use crate::store::is_valid_multiplier;

/// Added to the mean before inverting it.
const RATE_EPSILON: f64 = 1e-12;

/// Quantile that marks the start of the mixture tail.
const TAIL_QUANTILE: f64 = 0.99;

/// Minimum sample size for the quantile estimate; smaller samples use the max.
const TAIL_QUANTILE_MIN_N: usize = 50;

/// Fitting errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    /// No valid multipliers to fit.
    #[error("cannot fit an empty sample")]
    EmptySample,
}

/// Fitted law and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "params")]
pub enum ModelParams {
    /// `1 + Exp(lambda)`.
    #[serde(rename = "exponential_shift1")]
    Exponential {
        /// Rate of the excess over 1.
        lambda: f64,
    },
    /// Pareto with `xm = 1`.
    #[serde(rename = "pareto_xm1")]
    Pareto {
        /// Tail index.
        alpha: f64,
    },
    /// Exponential body with weight `1 - p`, soft tail past `q` with weight `p`.
    #[serde(rename = "truncated_exponential_mixture")]
    Mixture {
        /// Rate of the body.
        lambda: f64,
        /// Weight of the tail.
        p: f64,
        /// Start of the tail.
        q: f64,
    },
}

/// A fitted candidate model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    /// Law and parameters.
    #[serde(flatten)]
    pub params: ModelParams,
    /// Log-likelihood.
    pub ll: f64,
    /// Akaike information criterion.
    pub aic: f64,
}

impl FittedModel {
    /// Model name as reported to users.
    pub fn name(&self) -> &'static str {
        match self.params {
            ModelParams::Exponential { .. } => "exponential_shift1",
            ModelParams::Pareto { .. } => "pareto_xm1",
            ModelParams::Mixture { .. } => "truncated_exponential_mixture",
        }
    }

    /// Model survival function P(X >= t).
    pub fn survival(&self, t: f64) -> f64 {
        match self.params {
            ModelParams::Exponential { lambda } => exp_tail(lambda, t),
            ModelParams::Pareto { alpha } => {
                if t >= 1.0 {
                    t.powf(-alpha)
                } else {
                    1.0
                }
            }
            ModelParams::Mixture { lambda, p, q } => {
                let cap = if t <= q { 1.0 } else { (-(t - q)).exp() };
                (1.0 - p) * exp_tail(lambda, t) + p * cap
            }
        }
    }

    /// Draw one multiplier from the model.
    ///
    /// The mixture simulates from its exponential body only.
    pub fn draw(&self, rng: &mut StreamRng) -> f64 {
        let u = rng.next_f64();
        match self.params {
            ModelParams::Exponential { lambda } | ModelParams::Mixture { lambda, .. } => {
                1.0 - (1.0 - u).ln() / lambda
            }
            ModelParams::Pareto { alpha } => (1.0 - u).powf(-1.0 / alpha),
        }
    }

    /// Parameters as `key=value` pairs.
    pub fn params_string(&self) -> String {
        match self.params {
            ModelParams::Exponential { lambda } => format!("lambda={:.6}", lambda),
            ModelParams::Pareto { alpha } => format!("alpha={:.6}", alpha),
            ModelParams::Mixture { lambda, p, q } => {
                format!("lambda={:.6}, p={:.6}, q={:.4}", lambda, p, q)
            }
        }
    }

    /// Draw `n` multipliers.
    pub fn simulate(&self, n: usize, rng: &mut StreamRng) -> Vec<f64> {
        (0..n).map(|_| self.draw(rng)).collect()
    }
}

#[inline]
fn exp_tail(lambda: f64, t: f64) -> f64 {
    (-lambda * (t - 1.0).max(0.0)).exp()
}

/// AIC with NaN ranked last.
fn aic(params: usize, ll: f64) -> f64 {
    let aic = 2.0 * params as f64 - 2.0 * ll;
    if aic.is_nan() {
        f64::INFINITY
    } else {
        aic
    }
}

/// Exponential rate and log-likelihood of the excess over 1.
fn exponential_mle(z: &[f64]) -> (f64, f64) {
    let n = z.len() as f64;
    let mean_excess = z.iter().map(|v| v - 1.0).sum::<f64>() / n;
    let lambda = 1.0 / (mean_excess + RATE_EPSILON);
    let ll = z
        .iter()
        .map(|v| lambda.ln() - lambda * (v - 1.0))
        .sum::<f64>();
    (lambda, ll)
}

fn fit_exponential(z: &[f64]) -> FittedModel {
    let (lambda, ll) = exponential_mle(z);
    FittedModel {
        params: ModelParams::Exponential { lambda },
        ll,
        aic: aic(1, ll),
    }
}

fn fit_pareto(z: &[f64]) -> FittedModel {
    let log_sum: f64 = z.iter().map(|v| v.ln()).sum();
    // An all-ones sample has no tail at all.
    let alpha = z.len() as f64 / log_sum.max(RATE_EPSILON);
    let ll = z
        .iter()
        .map(|v| alpha.ln() - (alpha + 1.0) * v.ln())
        .sum::<f64>();
    FittedModel {
        params: ModelParams::Pareto { alpha },
        ll,
        aic: aic(1, ll),
    }
}

fn fit_mixture(z: &[f64]) -> FittedModel {
    let (lambda, ll) = exponential_mle(z);
    let q = if z.len() > TAIL_QUANTILE_MIN_N {
        quantile(z, TAIL_QUANTILE)
    } else {
        z.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    };
    let tail = z.iter().filter(|v| **v >= q).count() as f64 / z.len() as f64;
    FittedModel {
        params: ModelParams::Mixture {
            lambda,
            p: 0.5 * tail,
            q,
        },
        ll,
        aic: aic(2, ll),
    }
}

/// Quantile with linear interpolation between order statistics.
pub fn quantile(sample: &[f64], q: f64) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    let mut sorted = sample.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Fit all candidate models to the valid part of `sample`.
pub fn fit_models(sample: &[f64]) -> Result<Vec<FittedModel>, FitError> {
    let z: Vec<f64> = sample
        .iter()
        .copied()
        .filter(|v| is_valid_multiplier(*v))
        .collect();
    if z.is_empty() {
        return Err(FitError::EmptySample);
    }
    Ok(vec![fit_exponential(&z), fit_pareto(&z), fit_mixture(&z)])
}

/// Model with the lowest AIC. Ties keep the earlier model.
pub fn best_by_aic(models: &[FittedModel]) -> Option<&FittedModel> {
    models.iter().reduce(|best, m| if m.aic < best.aic { m } else { best })
}

/// Models sorted by ascending AIC.
pub fn rank_by_aic(mut models: Vec<FittedModel>) -> Vec<FittedModel> {
    models.sort_by(|a, b| a.aic.total_cmp(&b.aic));
    models
}

/// Human-readable ranking of `models`, best first.
pub fn fit_report(models: &[FittedModel]) -> String {
    let ranked = rank_by_aic(models.to_vec());
    let mut lines = vec!["Model fits (lower AIC is better):".to_string()];
    for m in &ranked {
        lines.push(format!(
            "- {}: AIC={:.2}, ll={:.2}, params={}",
            m.name(),
            m.aic,
            m.ll,
            m.params_string()
        ));
    }
    if let Some(best) = ranked.first() {
        lines.push(String::new());
        lines.push(format!("Best: {} with params {}", best.name(), best.params_string()));
    }
    lines.join("\n")
}
