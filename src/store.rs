//! store.rs — Score persistence, keyed by `ticket-score:<ISSUE-KEY>`.
//!
//! `ScoreStore` is the seam; the file-backed implementation keeps one JSON
//! document per key and writes through a temp file and rename, so readers
//! only ever see complete records. The in-memory implementation backs tests.
//! Records are written exactly as assembled; the store never edits them.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::ServiceError;
use crate::record::ScoreRecord;

pub const STORAGE_KEY_PREFIX: &str = "ticket-score:";

/// The storage key for one issue, shared by every operation that touches
/// persisted scores.
pub fn storage_key(issue_key: &str) -> String {
    format!("{STORAGE_KEY_PREFIX}{issue_key}")
}

pub trait ScoreStore: Send + Sync {
    /// Persists the record under its issue key, replacing any previous one.
    fn save(&self, record: &ScoreRecord) -> Result<(), ServiceError>;

    /// Reads the stored record, `None` when nothing was ever saved.
    fn get(&self, issue_key: &str) -> Result<Option<ScoreRecord>, ServiceError>;

    /// Removes the stored record. `true` when a record existed; removing an
    /// absent key is not an error.
    fn delete(&self, issue_key: &str) -> Result<bool, ServiceError>;
}

fn short_digest(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..12].to_string()
}

fn sanitize_for_filename(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

/// One JSON file per storage key. The filename keeps the key readable and
/// appends a short digest so distinct keys stay distinct after sanitization.
#[derive(Debug, Clone)]
pub struct FileScoreStore {
    dir: PathBuf,
}

impl FileScoreStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, issue_key: &str) -> PathBuf {
        let key = storage_key(issue_key);
        let name = format!("{}-{}.json", sanitize_for_filename(&key), short_digest(&key));
        self.dir.join(name)
    }
}

impl ScoreStore for FileScoreStore {
    fn save(&self, record: &ScoreRecord) -> Result<(), ServiceError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            ServiceError::upstream(format!("score store: cannot create {:?}: {e}", self.dir))
        })?;

        let path = self.path_for(&record.issue_key);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(record)
            .map_err(|e| ServiceError::upstream(format!("score store: serialize failed: {e}")))?;
        fs::write(&tmp, &bytes)
            .map_err(|e| ServiceError::upstream(format!("score store: write failed: {e}")))?;
        fs::rename(&tmp, &path)
            .map_err(|e| ServiceError::upstream(format!("score store: rename failed: {e}")))?;

        debug!(issue_key = %record.issue_key, path = %path.display(), "score saved");
        Ok(())
    }

    fn get(&self, issue_key: &str) -> Result<Option<ScoreRecord>, ServiceError> {
        let path = self.path_for(issue_key);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ServiceError::upstream(format!(
                    "score store: read failed for {issue_key}: {e}"
                )))
            }
        };
        // A file that exists but will not parse is an error, not a miss.
        let record: ScoreRecord = serde_json::from_str(&text).map_err(|e| {
            ServiceError::upstream(format!("score store: corrupt record for {issue_key}: {e}"))
        })?;
        Ok(Some(record))
    }

    fn delete(&self, issue_key: &str) -> Result<bool, ServiceError> {
        let path = self.path_for(issue_key);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(issue_key, "score deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ServiceError::upstream(format!(
                "score store: delete failed for {issue_key}: {e}"
            ))),
        }
    }
}

#[derive(Default)]
pub struct MemoryScoreStore {
    records: Mutex<HashMap<String, ScoreRecord>>,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScoreStore for MemoryScoreStore {
    fn save(&self, record: &ScoreRecord) -> Result<(), ServiceError> {
        self.records
            .lock()
            .expect("score store poisoned")
            .insert(storage_key(&record.issue_key), record.clone());
        Ok(())
    }

    fn get(&self, issue_key: &str) -> Result<Option<ScoreRecord>, ServiceError> {
        Ok(self
            .records
            .lock()
            .expect("score store poisoned")
            .get(&storage_key(issue_key))
            .cloned())
    }

    fn delete(&self, issue_key: &str) -> Result<bool, ServiceError> {
        Ok(self
            .records
            .lock()
            .expect("score store poisoned")
            .remove(&storage_key(issue_key))
            .is_some())
    }
}
