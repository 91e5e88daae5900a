//! Session metadata persistence.
//!
//! An upsert/query store for per-conversation metadata (title, favorite
//! flag, last activity), keyed by `(user_id, session_id)`. The session
//! engine functions without it; higher layers populate it opportunistically
//! as they observe session events.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::sanitize;

/// One persisted metadata record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: String,
    pub session_id: String,
    pub title: String,
    #[serde(default)]
    pub favorite: bool,
    pub last_activity: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum MetaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Narrow interface to the metadata store.
pub trait MetadataStore: Send + Sync {
    /// Insert or replace the record for `(user_id, session_id)`.
    fn upsert(&self, record: SessionRecord) -> Result<(), MetaError>;

    /// All records for a user, in insertion order.
    fn list_for_user(&self, user_id: &str) -> Result<Vec<SessionRecord>, MetaError>;
}

/// JSON-file-backed store: one `{user}.meta.json` file per user under the
/// store root, written atomically via a temp file.
pub struct FileMetadataStore {
    root: PathBuf,
}

impl FileMetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn user_file(&self, user_id: &str) -> PathBuf {
        self.root.join(format!("{}.meta.json", sanitize(user_id)))
    }

    fn load(&self, user_id: &str) -> Result<Vec<SessionRecord>, MetaError> {
        let path = self.user_file(user_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, user_id: &str, records: &[SessionRecord]) -> Result<(), MetaError> {
        fs::create_dir_all(&self.root)?;
        let path = self.user_file(user_id);
        let temp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(records)?;
        fs::write(&temp, json)?;
        fs::rename(&temp, &path)?;
        Ok(())
    }
}

impl MetadataStore for FileMetadataStore {
    fn upsert(&self, record: SessionRecord) -> Result<(), MetaError> {
        let mut records = self.load(&record.user_id)?;
        match records
            .iter_mut()
            .find(|r| r.user_id == record.user_id && r.session_id == record.session_id)
        {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        self.save(&record.user_id, &records)
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<SessionRecord>, MetaError> {
        // Two raw user ids can share a sanitized file name; filter on the
        // raw id carried in each record.
        Ok(self
            .load(user_id)?
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .collect())
    }
}
