//! Decimal Rounding
//!
//! Multipliers are displayed and persisted with two decimals, statistics
//! with six. Rounding is half-away-from-zero on the scaled value.

/// Decimal places for multipliers (rising value, thresholds, crash values).
pub const MULTIPLIER_PLACES: u32 = 2;

/// Decimal places for probabilities and summary statistics.
pub const STAT_PLACES: u32 = 6;

/// Round `value` to `places` decimal places.
///
/// Values too large to scale are already integral and come back unchanged.
#[inline]
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / factor
}

/// Round to multiplier precision.
#[inline]
pub fn round2(value: f64) -> f64 {
    round_to(value, MULTIPLIER_PLACES)
}

/// Round to statistic precision.
#[inline]
pub fn round6(value: f64) -> f64 {
    round_to(value, STAT_PLACES)
}

/// Format a threshold as a wire key ("1.50", "10.00").
pub fn threshold_key(threshold: f64) -> String {
    format!("{:.2}", threshold)
}
