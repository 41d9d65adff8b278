//! A [`GameStore`] that keeps every outstanding record in one file.
//!
//! The whole file is rewritten on each change: there are only ever a
//! handful of outstanding games. Writes go to a sibling `.tmp` file first
//! and are renamed into place, so a crash mid-write leaves the previous
//! contents intact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use quorum_game::{GameStore, StoreError};
use quorum_protocol::{Codec, GameRecord, JsonCodec, RecordId, StoredRecord};

use crate::QuorumError;

#[derive(Debug, Default)]
struct FileState {
    next_id: u64,
    records: BTreeMap<RecordId, GameRecord>,
}

/// File-backed store, generic over the record [`Codec`].
#[derive(Debug)]
pub struct FileStore<C: Codec = JsonCodec> {
    path: PathBuf,
    codec: C,
    state: Mutex<FileState>,
}

impl FileStore<JsonCodec> {
    /// Opens (or starts) a human-readable JSON store at `path`.
    pub fn json(path: impl Into<PathBuf>) -> Result<Self, QuorumError> {
        Self::open(path, JsonCodec)
    }
}

impl<C: Codec> FileStore<C> {
    /// Opens the store at `path`, loading any records already there. A
    /// missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>, codec: C) -> Result<Self, QuorumError> {
        let path = path.into();
        let records: Vec<StoredRecord> = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Vec::new(),
            Ok(bytes) => codec.decode(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        let next_id = records.iter().map(|r| r.id.0).max().unwrap_or(0);
        tracing::info!(path = %path.display(), records = records.len(), "game store opened");
        Ok(Self {
            path,
            codec,
            state: Mutex::new(FileState {
                next_id,
                records: records.into_iter().map(|r| (r.id, r.record)).collect(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FileState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self, state: &FileState) -> Result<(), StoreError> {
        let records: Vec<StoredRecord> = state
            .records
            .iter()
            .map(|(id, record)| StoredRecord {
                id: *id,
                record: record.clone(),
            })
            .collect();
        let bytes = self.codec.encode(&records).map_err(StoreError::backend)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, bytes).map_err(StoreError::backend)?;
        std::fs::rename(&tmp, &self.path).map_err(StoreError::backend)?;
        tracing::trace!(path = %self.path.display(), records = records.len(), "game store written");
        Ok(())
    }
}

impl<C: Codec> GameStore for FileStore<C> {
    // Each write is rolled back in memory if the file could not be written,
    // so memory never runs ahead of disk.

    fn create(&self, record: &GameRecord) -> Result<RecordId, StoreError> {
        let mut state = self.lock();
        state.next_id += 1;
        let id = RecordId(state.next_id);
        state.records.insert(id, record.clone());
        if let Err(err) = self.flush(&state) {
            state.records.remove(&id);
            return Err(err);
        }
        Ok(id)
    }

    fn update(&self, id: RecordId, record: &GameRecord) -> Result<(), StoreError> {
        let mut state = self.lock();
        let Some(existing) = state.records.get_mut(&id) else {
            return Err(StoreError::NotFound(id));
        };
        let previous = std::mem::replace(existing, record.clone());
        if let Err(err) = self.flush(&state) {
            state.records.insert(id, previous);
            return Err(err);
        }
        Ok(())
    }

    fn delete(&self, id: RecordId) -> Result<(), StoreError> {
        let mut state = self.lock();
        let Some(removed) = state.records.remove(&id) else {
            return Err(StoreError::NotFound(id));
        };
        if let Err(err) = self.flush(&state) {
            state.records.insert(id, removed);
            return Err(err);
        }
        Ok(())
    }

    fn find_all(&self) -> Result<Vec<StoredRecord>, StoreError> {
        Ok(self
            .lock()
            .records
            .iter()
            .map(|(id, record)| StoredRecord {
                id: *id,
                record: record.clone(),
            })
            .collect())
    }
}
