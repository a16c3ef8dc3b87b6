//! Lock records.
//!
//! One record per provisioning run, holding the lock's identity and the
//! label of the step it last reached.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Persisted state of one provisioned lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub id: u64,
    pub lock_mac: Option<String>,
    pub imei: Option<String>,
    /// Label of the last step started, or `Done`.
    pub provisioning: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockRecordUpdate {
    pub lock_mac: Option<String>,
    pub imei: Option<String>,
    pub provisioning: Option<String>,
}

impl LockRecordUpdate {
    pub fn status(label: &str) -> Self {
        Self {
            provisioning: Some(label.to_string()),
            ..Default::default()
        }
    }

    pub fn identity(lock_mac: &str, imei: &str) -> Self {
        Self {
            lock_mac: Some(lock_mac.to_string()),
            imei: Some(imei.to_string()),
            provisioning: None,
        }
    }

    fn apply(self, record: &mut LockRecord) {
        if let Some(lock_mac) = self.lock_mac {
            record.lock_mac = Some(lock_mac);
        }
        if let Some(imei) = self.imei {
            record.imei = Some(imei);
        }
        if let Some(provisioning) = self.provisioning {
            record.provisioning = Some(provisioning);
        }
        record.updated_at = Utc::now();
    }
}

/// Record store errors.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("lock record not found: {0}")]
    NotFound(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Storage for lock records.
pub trait LockRecordStore: Send + Sync {
    /// Creates an empty record and returns it.
    fn create(&self) -> Result<LockRecord, RecordError>;

    /// Applies `update` to record `id` and returns the result.
    fn update(&self, id: u64, update: LockRecordUpdate) -> Result<LockRecord, RecordError>;

    fn get(&self, id: u64) -> Result<LockRecord, RecordError>;

    /// All records, ordered by ID.
    fn list(&self) -> Result<Vec<LockRecord>, RecordError>;
}

#[derive(Debug, Default)]
struct Records {
    next_id: u64,
    records: BTreeMap<u64, LockRecord>,
}

impl Records {
    fn from_list(list: Vec<LockRecord>) -> Self {
        let next_id = list.iter().map(|r| r.id).max().unwrap_or(0);
        Self {
            next_id,
            records: list.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    fn create(&mut self) -> LockRecord {
        self.next_id += 1;
        let now = Utc::now();
        let record = LockRecord {
            id: self.next_id,
            lock_mac: None,
            imei: None,
            provisioning: None,
            created_at: now,
            updated_at: now,
        };
        self.records.insert(record.id, record.clone());
        record
    }

    fn update(&mut self, id: u64, update: LockRecordUpdate) -> Result<LockRecord, RecordError> {
        let record = self.records.get_mut(&id).ok_or(RecordError::NotFound(id))?;
        update.apply(record);
        Ok(record.clone())
    }

    fn get(&self, id: u64) -> Result<LockRecord, RecordError> {
        self.records.get(&id).cloned().ok_or(RecordError::NotFound(id))
    }

    fn list(&self) -> Vec<LockRecord> {
        self.records.values().cloned().collect()
    }
}

/// Volatile record store.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    inner: RwLock<Records>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockRecordStore for MemoryRecordStore {
    fn create(&self) -> Result<LockRecord, RecordError> {
        Ok(self.inner.write().create())
    }

    fn update(&self, id: u64, update: LockRecordUpdate) -> Result<LockRecord, RecordError> {
        self.inner.write().update(id, update)
    }

    fn get(&self, id: u64) -> Result<LockRecord, RecordError> {
        self.inner.read().get(id)
    }

    fn list(&self) -> Result<Vec<LockRecord>, RecordError> {
        Ok(self.inner.read().list())
    }
}

/// Record store persisted as a pretty-printed JSON array.
///
/// The whole file is rewritten on every change, through a temporary file
/// renamed into place.
pub struct JsonFileRecordStore {
    path: PathBuf,
    inner: RwLock<Records>,
}

impl JsonFileRecordStore {
    /// Opens the store at `path`, creating parent directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let records = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let list: Vec<LockRecord> = serde_json::from_reader(reader)?;
            tracing::debug!("Loaded {} lock records from {}", list.len(), path.display());
            Records::from_list(list)
        } else {
            Records::default()
        };

        Ok(Self {
            path,
            inner: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, records: &Records) -> Result<(), RecordError> {
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            serde_json::to_writer_pretty(&mut writer, &records.list())?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl LockRecordStore for JsonFileRecordStore {
    fn create(&self) -> Result<LockRecord, RecordError> {
        let mut inner = self.inner.write();
        let record = inner.create();
        self.save(&inner)?;
        Ok(record)
    }

    fn update(&self, id: u64, update: LockRecordUpdate) -> Result<LockRecord, RecordError> {
        let mut inner = self.inner.write();
        let record = inner.update(id, update)?;
        self.save(&inner)?;
        Ok(record)
    }

    fn get(&self, id: u64) -> Result<LockRecord, RecordError> {
        self.inner.read().get(id)
    }

    fn list(&self) -> Result<Vec<LockRecord>, RecordError> {
        Ok(self.inner.read().list())
    }
}
