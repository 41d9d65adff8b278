//! The persistence contract, plus an in-memory implementation.
//!
//! The engine writes through a store after its in-memory state is already
//! consistent, and a failed write is logged and forgotten: the state
//! machine is the source of truth, the store is a mirror for restarts.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use quorum_protocol::{GameRecord, RecordId, StoredRecord};

use crate::error::StoreError;

/// Where outstanding games are mirrored.
pub trait GameStore: Send + Sync {
    /// Writes a new record and returns its handle.
    fn create(&self, record: &GameRecord) -> Result<RecordId, StoreError>;

    /// Overwrites an existing record.
    fn update(&self, id: RecordId, record: &GameRecord) -> Result<(), StoreError>;

    /// Removes a record.
    fn delete(&self, id: RecordId) -> Result<(), StoreError>;

    /// Every outstanding record, in no particular order.
    fn find_all(&self) -> Result<Vec<StoredRecord>, StoreError>;
}

/// A store handle shared by every manager in a venue.
pub type SharedStore = Arc<dyn GameStore>;

/// Keeps records in a map. Used by tests and by venues that do not need
/// to survive a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    next_id: u64,
    records: BTreeMap<RecordId, GameRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of one record.
    pub fn get(&self, id: RecordId) -> Option<GameRecord> {
        self.lock().records.get(&id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl GameStore for MemoryStore {
    fn create(&self, record: &GameRecord) -> Result<RecordId, StoreError> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = RecordId(inner.next_id);
        inner.records.insert(id, record.clone());
        Ok(id)
    }

    fn update(&self, id: RecordId, record: &GameRecord) -> Result<(), StoreError> {
        let mut inner = self.lock();
        match inner.records.get_mut(&id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(id)),
        }
    }

    fn delete(&self, id: RecordId) -> Result<(), StoreError> {
        self.lock()
            .records
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
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

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use quorum_protocol::{ParticipantId, Slot};

    use super::*;

    fn record(name: &str) -> GameRecord {
        GameRecord {
            activity: "pool".into(),
            slot: Slot::Now,
            created_time: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            quorate_time: None,
            participants: vec![ParticipantId::new(name)],
            flexible_ready: false,
        }
    }

    #[test]
    fn test_create_update_delete() {
        let store = MemoryStore::new();
        let id = store.create(&record("amy")).unwrap();
        assert_eq!(store.len(), 1);

        store.update(id, &record("bo")).unwrap();
        assert_eq!(store.get(id).unwrap().participants[0].as_str(), "bo");

        store.delete(id).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_missing_record_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.update(RecordId(9), &record("amy")),
            Err(StoreError::NotFound(RecordId(9)))
        ));
        assert!(store.delete(RecordId(9)).is_err());
    }

    #[test]
    fn test_find_all_returns_ids() {
        let store = MemoryStore::new();
        let a = store.create(&record("amy")).unwrap();
        let b = store.create(&record("bo")).unwrap();
        let ids: Vec<_> = store.find_all().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a, b]);
    }
}
