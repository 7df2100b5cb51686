//! In-memory dataset store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use super::{is_valid_multiplier, BatchReceipt, MultiplierRecord, SampleStore, StoreError};

/// Dataset kept in process memory.
///
/// Can be switched into a failing mode where every write is refused, which
/// models an unwritable disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<MultiplierRecord>>,
    reject_writes: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `values` under one label.
    pub fn with_values(label: &str, values: &[f64]) -> Self {
        let records = values
            .iter()
            .map(|v| MultiplierRecord {
                session_id: label.to_string(),
                multiplier: *v,
            })
            .collect();
        Self {
            records: RwLock::new(records),
            reject_writes: AtomicBool::new(false),
        }
    }

    /// Refuse (or accept again) all writes.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes rejected".to_string()));
        }
        Ok(())
    }

    fn push_all(&self, new: Vec<MultiplierRecord>) -> Result<(), StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        records.extend(new);
        Ok(())
    }
}

impl SampleStore for MemoryStore {
    fn load_records(&self) -> Vec<MultiplierRecord> {
        match self.records.read() {
            Ok(records) => records
                .iter()
                .filter(|r| is_valid_multiplier(r.multiplier))
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn append_record(&self, value: f64, label: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let record = MultiplierRecord::new(label, value)?;
        self.push_all(vec![record])
    }

    fn append_batch(&self, values: &[f64], label: &str) -> Result<BatchReceipt, StoreError> {
        self.check_writable()?;
        let new: Vec<MultiplierRecord> = values
            .iter()
            .copied()
            .filter(|v| is_valid_multiplier(*v))
            .map(|multiplier| MultiplierRecord {
                session_id: label.to_string(),
                multiplier,
            })
            .collect();
        let added = new.len();
        self.push_all(new)?;
        Ok(BatchReceipt { added, file: None })
    }
}
