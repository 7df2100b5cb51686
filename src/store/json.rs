//! JSON File Store
//!
//! The consolidated dataset lives in `<data_dir>/main.json` as a JSON array
//! of `{session_id, multiplier}` objects. Bulk additions also leave an audit
//! file `session_YYYYMMDD-HHMMSS.json` holding only the new records.
//!
//! Writes are whole-file read-modify-write, serialized per store and
//! published by renaming a temp file over `main.json`, so a reader sees
//! either the old array or the new one.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, warn};

use super::{
    is_valid_multiplier, BatchReceipt, DatasetListing, MultiplierRecord, SampleStore, StoreError,
};

/// File name of the consolidated dataset.
pub const MAIN_FILE_NAME: &str = "main.json";

/// Session label given to records stored without one.
const UNLABELED: &str = "unknown";

/// File-backed dataset store.
///
/// Clones share one write lock.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    data_dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl JsonFileStore {
    /// Create a store rooted at `data_dir`. The directory is created lazily.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the consolidated file.
    pub fn main_path(&self) -> PathBuf {
        self.data_dir.join(MAIN_FILE_NAME)
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    /// Existing entries of `main.json` as raw JSON values.
    ///
    /// A corrupt or non-array file yields an empty list so the next write
    /// replaces it with a well-formed array.
    fn read_main_entries(&self) -> Vec<Value> {
        let text = match fs::read_to_string(self.main_path()) {
            Ok(text) => text,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => {
                warn!("{} is not a JSON array, treating as empty", self.main_path().display());
                Vec::new()
            }
            Err(e) => {
                warn!("{} is not valid JSON ({}), treating as empty", self.main_path().display(), e);
                Vec::new()
            }
        }
    }

    fn write_main_entries(&self, entries: &[Value]) -> Result<(), StoreError> {
        let text = serde_json::to_string(entries)?;
        let tmp = self
            .data_dir
            .join(format!(".{}.{}.tmp", MAIN_FILE_NAME, uuid::Uuid::new_v4().simple()));
        if let Err(e) = fs::write(&tmp, text).and_then(|_| fs::rename(&tmp, self.main_path())) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn append_to_main(&self, records: &[MultiplierRecord]) -> Result<(), StoreError> {
        // Held across read and write; a poisoned lock still guards a whole file.
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.ensure_dir()?;
        let mut entries = self.read_main_entries();
        for record in records {
            entries.push(serde_json::to_value(record)?);
        }
        self.write_main_entries(&entries)
    }
}

/// Interpret one stored entry, or `None` if it is malformed.
///
/// `multiplier` may be a JSON number or a numeric string.
fn record_from_value(entry: &Value) -> Option<MultiplierRecord> {
    let multiplier = match entry.get("multiplier")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !is_valid_multiplier(multiplier) {
        return None;
    }
    let session_id = match entry.get("session_id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => UNLABELED.to_string(),
    };
    Some(MultiplierRecord {
        session_id,
        multiplier,
    })
}

/// Audit file name for a batch written at `stamp`.
pub fn audit_file_name(stamp: chrono::NaiveDateTime) -> String {
    format!("session_{}.json", stamp.format("%Y%m%d-%H%M%S"))
}

impl SampleStore for JsonFileStore {
    fn load_records(&self) -> Vec<MultiplierRecord> {
        let entries = self.read_main_entries();
        let total = entries.len();
        let records: Vec<MultiplierRecord> = entries.iter().filter_map(record_from_value).collect();
        if records.len() < total {
            debug!("skipped {} malformed records", total - records.len());
        }
        records
    }

    fn append_record(&self, value: f64, label: &str) -> Result<(), StoreError> {
        let record = MultiplierRecord::new(label, value)?;
        self.append_to_main(std::slice::from_ref(&record))
    }

    fn append_batch(&self, values: &[f64], label: &str) -> Result<BatchReceipt, StoreError> {
        let records: Vec<MultiplierRecord> = values
            .iter()
            .copied()
            .filter(|v| is_valid_multiplier(*v))
            .map(|multiplier| MultiplierRecord {
                session_id: label.to_string(),
                multiplier,
            })
            .collect();

        self.ensure_dir()?;
        let name = audit_file_name(chrono::Local::now().naive_local());
        fs::write(self.data_dir.join(&name), serde_json::to_string(&records)?)?;
        self.append_to_main(&records)?;

        Ok(BatchReceipt {
            added: records.len(),
            file: Some(name),
        })
    }

    fn list_datasets(&self) -> DatasetListing {
        let mut files: Vec<String> = match fs::read_dir(&self.data_dir) {
            Ok(dir) => dir
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .filter(|name| name.ends_with(".json"))
                .collect(),
            Err(_) => Vec::new(),
        };
        files.sort();
        let main = self
            .main_path()
            .exists()
            .then(|| MAIN_FILE_NAME.to_string());
        DatasetListing { files, main }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, JsonFileStore) {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("data"));
        (dir, store)
    }

    #[test]
    fn test_missing_file_is_empty() {
        let (_dir, store) = store();
        assert!(store.load_sample().is_empty());
    }

    #[test]
    fn test_append_then_read() {
        let (_dir, store) = store();
        store.append_record(2.5, "sim").unwrap();
        store.append_record(1.0, "pf").unwrap();

        let records = store.load_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].session_id, "sim");
        assert_eq!(records[1].multiplier, 1.0);
    }

    #[test]
    fn test_append_rejects_below_one() {
        let (_dir, store) = store();
        assert!(store.append_record(0.5, "sim").is_err());
        assert!(store.load_sample().is_empty());
    }

    #[test]
    fn test_malformed_records_skipped() {
        let (_dir, store) = store();
        fs::create_dir_all(store.data_dir()).unwrap();
        fs::write(
            store.main_path(),
            r#"[
                {"session_id": "a", "multiplier": 2.0},
                {"session_id": "b", "multiplier": "3.5"},
                {"session_id": "c", "multiplier": 0.4},
                {"session_id": "d", "multiplier": "abc"},
                {"session_id": "e"},
                "garbage",
                {"multiplier": 1.2}
            ]"#,
        )
        .unwrap();

        assert_eq!(store.load_sample(), vec![2.0, 3.5, 1.2]);
        assert_eq!(store.load_records()[2].session_id, UNLABELED);
    }

    #[test]
    fn test_corrupt_file_is_empty_and_replaced() {
        let (_dir, store) = store();
        fs::create_dir_all(store.data_dir()).unwrap();
        fs::write(store.main_path(), "{not json").unwrap();
        assert!(store.load_sample().is_empty());

        store.append_record(4.0, "manual").unwrap();
        assert_eq!(store.load_sample(), vec![4.0]);
    }

    #[test]
    fn test_non_array_is_empty() {
        let (_dir, store) = store();
        fs::create_dir_all(store.data_dir()).unwrap();
        fs::write(store.main_path(), r#"{"records": []}"#).unwrap();
        assert!(store.load_sample().is_empty());
    }

    #[test]
    fn test_append_batch_writes_audit_file() {
        let (_dir, store) = store();
        store.append_record(1.5, "sim").unwrap();

        let receipt = store.append_batch(&[2.0, 0.5, 3.0], "web").unwrap();
        assert_eq!(receipt.added, 2);

        let name = receipt.file.unwrap();
        assert!(name.starts_with("session_") && name.ends_with(".json"));
        let audit: Vec<MultiplierRecord> =
            serde_json::from_str(&fs::read_to_string(store.data_dir().join(&name)).unwrap())
                .unwrap();
        assert_eq!(audit.len(), 2);

        assert_eq!(store.load_sample(), vec![1.5, 2.0, 3.0]);
    }

    #[test]
    fn test_list_datasets() {
        let (_dir, store) = store();
        assert_eq!(store.list_datasets(), DatasetListing::default());

        store.append_record(1.5, "sim").unwrap();
        fs::write(store.data_dir().join("notes.txt"), "x").unwrap();

        let listing = store.list_datasets();
        assert_eq!(listing.files, vec![MAIN_FILE_NAME.to_string()]);
        assert_eq!(listing.main.as_deref(), Some(MAIN_FILE_NAME));
    }

    #[test]
    fn test_concurrent_appends_keep_history() {
        let (_dir, store) = store();
        let history: Vec<f64> = (0..2000).map(|i| 1.0 + (i % 100) as f64 / 10.0).collect();
        store.append_batch(&history, "history").unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let store = store.clone();
                scope.spawn(move || {
                    for _ in 0..50 {
                        store.append_record(2.0, "sim").unwrap();
                        // Readers never observe a torn file.
                        assert!(store.load_records().len() >= 2000);
                    }
                });
            }
        });

        let records = store.load_records();
        assert_eq!(records.len(), 2400);
        assert_eq!(records.iter().filter(|r| r.session_id == "history").count(), 2000);
        assert_eq!(&store.load_sample()[..2000], &history[..]);
    }

    #[test]
    fn test_no_temp_files_left() {
        let (_dir, store) = store();
        store.append_record(1.5, "sim").unwrap();
        store.append_record(2.5, "sim").unwrap();
        let names: Vec<String> = fs::read_dir(store.data_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![MAIN_FILE_NAME.to_string()]);
    }

    #[test]
    fn test_audit_file_name() {
        let stamp = chrono::NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(9, 5, 2)
            .unwrap();
        assert_eq!(audit_file_name(stamp), "session_20240307-090502.json");
    }
}
