//! Key-Value Store - the only state shared between requests
//!
//! The pipeline receives a store explicitly; nothing here is global.
//! Every operation is atomic at the key level, so no lock is held across
//! analysis work.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::hashing::sha256_hex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("TTL of {0}s is out of range")]
    TtlOutOfRange(i64),
}

fn expiry(ttl: Duration) -> Result<DateTime<Utc>, StoreError> {
    Utc::now()
        .checked_add_signed(ttl)
        .ok_or(StoreError::TtlOutOfRange(ttl.num_seconds()))
}

/// get/set-with-expiry over string keys and values.
pub trait KeyValueStore: Send + Sync {
    /// Value for `key`, `None` when absent or expired
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value, for `ttl`
    fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl StoredEntry {
    fn live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Process-local store, mainly for tests and single-process use.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.entries.lock().values().filter(|e| e.live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Utc::now();
        let mut entries = self.entries.lock();
        let found = entries
            .get(key)
            .map(|e| e.live(now).then(|| e.value.clone()));
        match found {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = expiry(ttl)?;
        self.entries.lock().insert(
            key.to_string(),
            StoredEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }
}

/// One JSON file per key under a directory; survives process restarts.
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sha256_hex(key.as_bytes())))
    }
}

impl KeyValueStore for DirectoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.entry_path(key);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: StoredEntry = serde_json::from_str(&content)?;
        if entry.live(Utc::now()) {
            Ok(Some(entry.value))
        } else {
            if let Err(e) = fs::remove_file(&path) {
                debug!(path = %path.display(), error = %e, "Failed to remove expired entry");
            }
            Ok(None)
        }
    }

    fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let entry = StoredEntry {
            value: value.to_string(),
            expires_at: expiry(ttl)?,
        };
        // Write then rename so readers never see a partial entry.
        // One temp file per writer.
        let path = self.entry_path(key);
        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        let written = fs::write(&tmp, serde_json::to_string(&entry)?)
            .and_then(|()| fs::rename(&tmp, &path));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                debug!(path = %tmp.display(), error = %cleanup, "Failed to remove temp entry");
            }
            return Err(e.into());
        }
        Ok(())
    }
}
