//! Summary Statistics
//!
//! Recomputed from the full sample on every request.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::core::numeric::{round6, threshold_key};
use super::survival::survival_at;

/// Thresholds reported in every summary.
pub const SUMMARY_THRESHOLDS: [f64; 5] = [1.5, 2.0, 3.0, 5.0, 10.0];

/// P(X >= t) for a fixed, ascending list of thresholds.
///
/// Serialized as a JSON object keyed by the two-decimal threshold
/// (`{"1.50": 0.8, "2.00": 0.6, ...}`) in ascending order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SurvivalTable {
    entries: Vec<(f64, f64)>,
}

impl SurvivalTable {
    /// Probability for `threshold`, if it is in the table.
    pub fn get(&self, threshold: f64) -> Option<f64> {
        self.entries
            .iter()
            .find(|(t, _)| *t == threshold)
            .map(|(_, p)| *p)
    }

    /// (threshold, probability) pairs in ascending threshold order.
    pub fn entries(&self) -> &[(f64, f64)] {
        &self.entries
    }
}

impl Serialize for SurvivalTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (t, p) in &self.entries {
            map.serialize_entry(&threshold_key(*t), p)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SurvivalTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = SurvivalTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of threshold strings to probabilities")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((key, p)) = access.next_entry::<String, f64>()? {
                    let t = key
                        .parse::<f64>()
                        .map_err(|_| serde::de::Error::custom(format!("bad threshold {:?}", key)))?;
                    entries.push((t, p));
                }
                entries.sort_by(|a, b| a.0.total_cmp(&b.0));
                Ok(SurvivalTable { entries })
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// Dataset summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    /// Number of samples.
    pub n: usize,
    /// Arithmetic mean (0 when empty).
    pub mean: f64,
    /// Median (0 when empty).
    pub median: f64,
    /// Survival probability at each summary threshold.
    pub pge: SurvivalTable,
}

/// Median of a sample, 0 when empty.
pub fn median(sample: &[f64]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    let mut sorted = sample.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Arithmetic mean, 0 when empty.
pub fn mean(sample: &[f64]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    sample.iter().sum::<f64>() / sample.len() as f64
}

/// Summarize a sample against [`SUMMARY_THRESHOLDS`].
pub fn summarize(sample: &[f64]) -> SummaryStats {
    summarize_with(sample, &SUMMARY_THRESHOLDS)
}

/// Summarize a sample against custom thresholds.
pub fn summarize_with(sample: &[f64], thresholds: &[f64]) -> SummaryStats {
    let mut entries: Vec<(f64, f64)> = thresholds
        .iter()
        .map(|t| (*t, round6(survival_at(*t, sample))))
        .collect();
    entries.sort_by(|a, b| a.0.total_cmp(&b.0));

    SummaryStats {
        n: sample.len(),
        mean: round_within(mean(sample), sample),
        median: round_within(median(sample), sample),
        pge: SurvivalTable { entries },
    }
}

/// Round a central statistic, keeping it inside the sample's range.
fn round_within(value: f64, sample: &[f64]) -> f64 {
    if sample.is_empty() {
        return round6(value);
    }
    let lo = sample.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = sample.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    round6(value).max(lo).min(hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reference_summary() {
        let s = summarize(&[1.0, 2.0, 2.0, 3.0, 5.0]);
        assert_eq!(s.n, 5);
        assert_eq!(s.mean, 2.6);
        assert_eq!(s.median, 2.0);
        assert_eq!(s.pge.get(1.5), Some(0.8));
        assert_eq!(s.pge.get(2.0), Some(0.6));
        assert_eq!(s.pge.get(3.0), Some(0.2));
        assert_eq!(s.pge.get(5.0), Some(0.2));
        assert_eq!(s.pge.get(10.0), Some(0.0));
    }

    #[test]
    fn test_empty_summary() {
        let s = summarize(&[]);
        assert_eq!(s.n, 0);
        assert_eq!(s.mean, 0.0);
        assert_eq!(s.median, 0.0);
        assert_eq!(s.pge.entries().len(), SUMMARY_THRESHOLDS.len());
        assert!(s.pge.entries().iter().all(|(_, p)| *p == 0.0));
    }

    #[test]
    fn test_even_median() {
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_unsorted_odd_median() {
        assert_eq!(median(&[9.0, 1.0, 5.0]), 5.0);
    }

    #[test]
    fn test_rounding_stays_in_range() {
        let s = summarize(&[1.0000004]);
        assert_eq!(s.median, 1.0000004);
        assert_eq!(s.mean, 1.0000004);

        let s = summarize(&[2.9999996, 2.9999997]);
        assert!(s.median <= 2.9999997 && s.median >= 2.9999996);
    }

    #[test]
    fn test_wire_format() {
        let s = summarize(&[1.0, 2.0, 2.0, 3.0, 5.0]);
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(
            json,
            r#"{"n":5,"mean":2.6,"median":2.0,"pge":{"1.50":0.8,"2.00":0.6,"3.00":0.2,"5.00":0.2,"10.00":0.0}}"#
        );

        let parsed: SummaryStats = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, s);
    }

    proptest! {
        #[test]
        fn prop_median_within_bounds(sample in prop::collection::vec(1.0f64..1000.0, 1..200)) {
            let s = summarize(&sample);
            let min = sample.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = sample.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(s.median >= min && s.median <= max);
            prop_assert!(s.mean >= min && s.mean <= max);
        }

        #[test]
        fn prop_pge_matches_count(sample in prop::collection::vec(1.0f64..50.0, 1..200)) {
            let s = summarize(&sample);
            for (t, p) in s.pge.entries() {
                let count = sample.iter().filter(|v| **v >= *t).count();
                let exact = count as f64 / sample.len() as f64;
                prop_assert!((p - exact).abs() <= 5e-7);
                prop_assert!((0.0..=1.0).contains(p));
            }
        }
    }
}
