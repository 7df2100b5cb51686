//! Dataset Store
//!
//! The consolidated dataset is an append-only list of multiplier records.
//! Reads always go to the backing store so every sampler draw and summary
//! reflects the dataset at call time.
//!
//! - `json`: file-backed store (`main.json` plus audit files)
//! - `memory`: in-process store for tests and ephemeral servers
//! - `parse`: text parsing of raw multiplier strings

pub mod json;
pub mod memory;
pub mod parse;

use serde::{Serialize, Deserialize};

use crate::core::numeric::round2;

pub use json::JsonFileStore;
pub use memory::MemoryStore;
pub use parse::{parse_multiplier, parse_multiplier_list, ParseError};

/// Session label for crashes entered by hand.
pub const MANUAL_LABEL: &str = "manual";

/// Session label for bulk additions without an explicit session.
pub const WEB_LABEL: &str = "web";

/// One stored crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplierRecord {
    /// Label of the stream or session that produced the value.
    pub session_id: String,
    /// Crash multiplier, always >= 1.
    pub multiplier: f64,
}

impl MultiplierRecord {
    /// Create a record, rejecting multipliers below 1.
    pub fn new(session_id: impl Into<String>, multiplier: f64) -> Result<Self, StoreError> {
        if !is_valid_multiplier(multiplier) {
            return Err(StoreError::InvalidMultiplier(multiplier));
        }
        Ok(Self {
            session_id: session_id.into(),
            multiplier,
        })
    }
}

/// Whether `value` may enter the dataset.
#[inline]
pub fn is_valid_multiplier(value: f64) -> bool {
    value.is_finite() && value >= 1.0
}

/// Result of a bulk append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReceipt {
    /// Number of records appended.
    pub added: usize,
    /// Audit file written for this batch, if the store keeps them.
    pub file: Option<String>,
}

/// Dataset files visible to clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetListing {
    /// All dataset files (audit files and the consolidated file).
    pub files: Vec<String>,
    /// Consolidated file name, if it exists.
    pub main: Option<String>,
}

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Multiplier below 1 or not finite.
    #[error("invalid multiplier {0}, must be >= 1")]
    InvalidMultiplier(f64),

    /// Store refused the write.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read-through access to the consolidated dataset.
///
/// Implementations must be safe to share across stream tasks. Reads never
/// fail: an unreadable store is an empty one.
pub trait SampleStore: Send + Sync {
    /// All valid records in append order.
    fn load_records(&self) -> Vec<MultiplierRecord>;

    /// Multiplier values of all valid records.
    fn load_sample(&self) -> Vec<f64> {
        self.load_records()
            .into_iter()
            .map(|r| r.multiplier)
            .collect()
    }

    /// Append one record.
    fn append_record(&self, value: f64, label: &str) -> Result<(), StoreError>;

    /// Append every value >= 1 under one label; smaller values are dropped.
    fn append_batch(&self, values: &[f64], label: &str) -> Result<BatchReceipt, StoreError>;

    /// Dataset files, for stores that have them.
    fn list_datasets(&self) -> DatasetListing {
        DatasetListing::default()
    }
}

/// Record a crash entered by hand: rounded to 2 decimals, labeled `manual`.
///
/// Returns the stored value.
pub fn add_crash(store: &dyn SampleStore, value: f64) -> Result<f64, StoreError> {
    if !is_valid_multiplier(value) {
        return Err(StoreError::InvalidMultiplier(value));
    }
    let value = round2(value);
    store.append_record(value, MANUAL_LABEL)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_rejects_below_one() {
        assert!(MultiplierRecord::new("sim", 1.0).is_ok());
        assert!(matches!(
            MultiplierRecord::new("sim", 0.99),
            Err(StoreError::InvalidMultiplier(_))
        ));
        assert!(MultiplierRecord::new("sim", f64::NAN).is_err());
        assert!(MultiplierRecord::new("sim", f64::INFINITY).is_err());
    }

    #[test]
    fn test_record_wire_format() {
        let record = MultiplierRecord::new("pf", 2.5).unwrap();
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"session_id":"pf","multiplier":2.5}"#);
    }

    #[test]
    fn test_add_crash_rounds_and_labels() {
        let store = MemoryStore::new();
        assert_eq!(add_crash(&store, 2.956).unwrap(), 2.96);
        assert!(matches!(
            add_crash(&store, 0.5),
            Err(StoreError::InvalidMultiplier(_))
        ));

        let records = store.load_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].session_id, MANUAL_LABEL);
        assert_eq!(records[0].multiplier, 2.96);
    }
}
