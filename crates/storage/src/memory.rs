//! In-memory reference implementation of [`VersionedEntityStore`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::record::{EntityRecord, INITIAL_VERSION};
use crate::traits::VersionedEntityStore;

type EntityKey = (String, String);

/// Entity table guarded by a single `RwLock`.
///
/// Every `compare_and_swap` runs entirely inside one write-lock critical
/// section, so the version check and the write cannot interleave with
/// another writer. The lock is never held across an `.await`.
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
    entities: RwLock<HashMap<EntityKey, EntityRecord>>,
    unavailable: AtomicBool,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records (versions are kept as given).
    pub fn with_records(records: impl IntoIterator<Item = EntityRecord>) -> Self {
        let entities = records
            .into_iter()
            .map(|r| ((r.kind.clone(), r.entity_id.clone()), r))
            .collect();
        Self {
            entities: RwLock::new(entities),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: while set, every call fails with
    /// `StorageError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "in-memory store switched offline".to_string(),
            ));
        }
        Ok(())
    }
}

fn key(kind: &str, entity_id: &str) -> EntityKey {
    (kind.to_string(), entity_id.to_string())
}

fn poisoned<T>(_: PoisonError<T>) -> StorageError {
    StorageError::Backend("entity table lock poisoned".to_string())
}

fn not_found(kind: &str, entity_id: &str) -> StorageError {
    StorageError::EntityNotFound {
        kind: kind.to_string(),
        entity_id: entity_id.to_string(),
    }
}

#[async_trait]
impl VersionedEntityStore for MemoryEntityStore {
    async fn create(
        &self,
        kind: &str,
        entity_id: &str,
        initial_state: &str,
    ) -> Result<EntityRecord, StorageError> {
        self.check_available()?;
        let mut entities = self.entities.write().map_err(poisoned)?;
        let k = key(kind, entity_id);
        if entities.contains_key(&k) {
            return Err(StorageError::AlreadyExists {
                kind: kind.to_string(),
                entity_id: entity_id.to_string(),
            });
        }
        let record = EntityRecord::new(kind, entity_id, initial_state);
        debug_assert_eq!(record.version, INITIAL_VERSION);
        entities.insert(k, record.clone());
        Ok(record)
    }

    async fn read(&self, kind: &str, entity_id: &str) -> Result<EntityRecord, StorageError> {
        self.check_available()?;
        let entities = self.entities.read().map_err(poisoned)?;
        entities
            .get(&key(kind, entity_id))
            .cloned()
            .ok_or_else(|| not_found(kind, entity_id))
    }

    async fn compare_and_swap(
        &self,
        kind: &str,
        entity_id: &str,
        expected_version: u64,
        new_state: &str,
    ) -> Result<u64, StorageError> {
        self.check_available()?;
        let mut entities = self.entities.write().map_err(poisoned)?;
        let record = entities
            .get_mut(&key(kind, entity_id))
            .ok_or_else(|| not_found(kind, entity_id))?;
        if record.version != expected_version {
            return Err(StorageError::ConcurrentConflict {
                kind: kind.to_string(),
                entity_id: entity_id.to_string(),
                expected_version,
                actual_version: record.version,
            });
        }
        record.state = new_state.to_string();
        record.version += 1;
        record.updated_at = OffsetDateTime::now_utc().max(record.updated_at);
        Ok(record.version)
    }

    async fn list(
        &self,
        kind: &str,
        state_filter: Option<&str>,
    ) -> Result<Vec<EntityRecord>, StorageError> {
        self.check_available()?;
        let entities = self.entities.read().map_err(poisoned)?;
        let mut out: Vec<EntityRecord> = entities
            .values()
            .filter(|r| r.kind == kind && state_filter.map_or(true, |s| r.state == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        Ok(out)
    }
}
