//! Contact store adapters.
//!
//! The core only needs `put` and `get` by exact email. Writes are appends: the
//! store does not deduplicate, the generator's recorded-email check does.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::ChatError;
use crate::model::contact::ContactRecord;

#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Persist a record.
    async fn put(&self, record: ContactRecord) -> Result<(), ChatError>;

    /// Look up the first record stored under exactly `email`.
    async fn get(&self, email: &str) -> Result<Option<ContactRecord>, ChatError>;
}

/// Process-local store; contents are lost on exit.
#[derive(Debug, Default)]
pub struct InMemoryContactStore {
    records: RwLock<HashMap<String, Vec<ContactRecord>>>,
}

impl InMemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of writes, duplicates included.
    pub async fn write_count(&self) -> usize {
        self.records.read().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl ContactStore for InMemoryContactStore {
    async fn put(&self, record: ContactRecord) -> Result<(), ChatError> {
        self.records
            .write()
            .await
            .entry(record.email.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn get(&self, email: &str) -> Result<Option<ContactRecord>, ChatError> {
        Ok(self
            .records
            .read()
            .await
            .get(email)
            .and_then(|v| v.first().cloned()))
    }
}

/// Store backed by a JSON array on disk.
///
/// Every `put` rewrites the file through a temporary sibling and a rename, so
/// readers never observe a half-written file.
#[derive(Debug)]
pub struct JsonFileContactStore {
    path: PathBuf,
    records: Mutex<Vec<ContactRecord>>,
}

impl JsonFileContactStore {
    /// Open `path`, loading existing records. A missing file starts empty.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ChatError> {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(text) if text.trim().is_empty() => Vec::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                ChatError::ContactStore(format!("parsing {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(ChatError::ContactStore(format!(
                    "reading {}: {e}",
                    path.display()
                )))
            }
        };
        debug!(path = %path.display(), records = records.len(), "contact store opened");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, records: &[ContactRecord]) -> Result<(), ChatError> {
        let json = serde_json::to_vec_pretty(records)
            .map_err(|e| ChatError::ContactStore(format!("serializing contacts: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ChatError::ContactStore(format!("creating {}: {e}", parent.display())))?;
        }
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| ChatError::ContactStore(format!("writing {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ChatError::ContactStore(format!("replacing {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl ContactStore for JsonFileContactStore {
    async fn put(&self, record: ContactRecord) -> Result<(), ChatError> {
        let mut records = self.records.lock().await;
        records.push(record);
        if let Err(e) = self.flush(&records).await {
            records.pop();
            return Err(e);
        }
        Ok(())
    }

    async fn get(&self, email: &str) -> Result<Option<ContactRecord>, ChatError> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .find(|r| r.email == email)
            .cloned())
    }
}
