//! Control marker persistence

use super::GateError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;
use tracing::debug;

/// Identity of one control marker: a source file on a processing date
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerKey {
    pub source: String,
    pub date: NaiveDate,
}

impl MarkerKey {
    pub fn new(source: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            source: source.into(),
            date,
        }
    }

    /// Marker file name, `<source>.<YYYY-MM-DD>.processed`
    #[must_use]
    pub fn file_name(&self) -> String {
        // keep the marker inside the store directory whatever the source id looks like
        let source: String = self
            .source
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        format!("{}.{}.processed", source, self.date.format("%Y-%m-%d"))
    }
}

impl fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.source, self.date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerStatus {
    InProgress,
    Succeeded,
    Failed,
}

/// Persisted content of a control marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub source: String,
    pub date: NaiveDate,
    pub status: MarkerStatus,
    pub claimed_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub alert_count: Option<usize>,
    pub error: Option<String>,
}

impl MarkerRecord {
    /// Fresh marker for a run that has just started
    #[must_use]
    pub fn in_progress(key: &MarkerKey) -> Self {
        Self {
            source: key.source.clone(),
            date: key.date,
            status: MarkerStatus::InProgress,
            claimed_at: Utc::now(),
            completed_at: None,
            alert_count: None,
            error: None,
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status != MarkerStatus::InProgress
    }
}

/// Storage backend for control markers.
///
/// `create_if_absent` must be atomic: of several concurrent callers for the
/// same key exactly one observes `true`.
pub trait MarkerStore: Send + Sync {
    /// Create the marker unless it already exists; `true` when this call created it
    fn create_if_absent(&self, key: &MarkerKey, record: &MarkerRecord) -> Result<bool, GateError>;

    fn load(&self, key: &MarkerKey) -> Result<Option<MarkerRecord>, GateError>;

    /// Replace an existing marker
    fn overwrite(&self, key: &MarkerKey, record: &MarkerRecord) -> Result<(), GateError>;

    /// Delete a marker; deleting a missing marker is not an error
    fn remove(&self, key: &MarkerKey) -> Result<(), GateError>;

    fn exists(&self, key: &MarkerKey) -> Result<bool, GateError> {
        Ok(self.load(key)?.is_some())
    }
}

/// One JSON marker file per key inside a control directory
#[derive(Debug, Clone)]
pub struct FileMarkerStore {
    dir: PathBuf,
}

impl FileMarkerStore {
    /// Open the store, creating the control directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, GateError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| GateError::io(&dir, e))?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, key: &MarkerKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

impl MarkerStore for FileMarkerStore {
    fn create_if_absent(&self, key: &MarkerKey, record: &MarkerRecord) -> Result<bool, GateError> {
        let path = self.path_for(key);
        let bytes = serde_json::to_vec_pretty(record)?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!("Control marker already present: {:?}", path);
                return Ok(false);
            }
            Err(e) => return Err(GateError::io(&path, e)),
        };

        file.write_all(&bytes)
            .and_then(|()| file.sync_all())
            .map_err(|e| GateError::io(&path, e))?;
        debug!("Created control marker: {:?}", path);
        Ok(true)
    }

    fn load(&self, key: &MarkerKey) -> Result<Option<MarkerRecord>, GateError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(GateError::io(&path, e)),
        };

        // a claim that is still being written counts as in progress
        if bytes.is_empty() {
            return Ok(Some(MarkerRecord::in_progress(key)));
        }

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| GateError::Corrupt { path, source })
    }

    fn overwrite(&self, key: &MarkerKey, record: &MarkerRecord) -> Result<(), GateError> {
        let path = self.path_for(key);
        let bytes = serde_json::to_vec_pretty(record)?;

        let mut temp = NamedTempFile::new_in(&self.dir).map_err(|e| GateError::io(&self.dir, e))?;
        temp.write_all(&bytes)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| GateError::io(temp.path(), e))?;
        temp.persist(&path)
            .map_err(|e| GateError::io(&path, e.error))?;
        Ok(())
    }

    fn remove(&self, key: &MarkerKey) -> Result<(), GateError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GateError::io(&path, e)),
        }
    }

    fn exists(&self, key: &MarkerKey) -> Result<bool, GateError> {
        let path = self.path_for(key);
        path.try_exists().map_err(|e| GateError::io(&path, e))
    }
}

/// In-process marker store
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    markers: Mutex<HashMap<MarkerKey, MarkerRecord>>,
}

impl MemoryMarkerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn markers(&self) -> std::sync::MutexGuard<'_, HashMap<MarkerKey, MarkerRecord>> {
        self.markers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MarkerStore for MemoryMarkerStore {
    fn create_if_absent(&self, key: &MarkerKey, record: &MarkerRecord) -> Result<bool, GateError> {
        let mut markers = self.markers();
        if markers.contains_key(key) {
            return Ok(false);
        }
        markers.insert(key.clone(), record.clone());
        Ok(true)
    }

    fn load(&self, key: &MarkerKey) -> Result<Option<MarkerRecord>, GateError> {
        Ok(self.markers().get(key).cloned())
    }

    fn overwrite(&self, key: &MarkerKey, record: &MarkerRecord) -> Result<(), GateError> {
        self.markers().insert(key.clone(), record.clone());
        Ok(())
    }

    fn remove(&self, key: &MarkerKey) -> Result<(), GateError> {
        self.markers().remove(key);
        Ok(())
    }
}
