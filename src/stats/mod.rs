//! Dataset Statistics
//!
//! Computed on demand from the full stored sample; nothing is cached.

pub mod fit;
pub mod summary;
pub mod survival;

pub use fit::{best_by_aic, fit_models, fit_report, rank_by_aic, FitError, FittedModel, ModelParams};
pub use summary::{summarize, SummaryStats, SurvivalTable, SUMMARY_THRESHOLDS};
pub use survival::{empirical_survival, survival_at, SurvivalCurve};
