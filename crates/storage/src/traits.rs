use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{AuditRecord, EntityRecord};

/// Read/update path for lifecycle-managed entities.
///
/// Entities are addressed by `(kind, entity_id)`. State is persisted as the
/// state's code string; the typed mapping lives in the engine.
///
/// ## OCC Conflict Detection
///
/// `compare_and_swap` is the only way to change an entity's state. It is an
/// `UPDATE ... WHERE version = expected_version` in SQL terms: the version
/// check, the state write, the version bump and the timestamp update happen
/// atomically. If the stored version differs, the method returns
/// `Err(StorageError::ConcurrentConflict { .. })` and writes nothing.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so a single store can be
/// shared behind an `Arc` across request handlers and spawned tasks.
#[async_trait]
pub trait VersionedEntityStore: Send + Sync + 'static {
    /// Insert a new entity at `INITIAL_VERSION`.
    ///
    /// Returns `Err(StorageError::AlreadyExists)` if the entity already exists.
    async fn create(
        &self,
        kind: &str,
        entity_id: &str,
        initial_state: &str,
    ) -> Result<EntityRecord, StorageError>;

    /// Read an entity's current state and version without locking.
    ///
    /// Returns `Err(StorageError::EntityNotFound)` if the entity does not exist.
    async fn read(&self, kind: &str, entity_id: &str) -> Result<EntityRecord, StorageError>;

    /// Atomically replace the state if the stored version equals
    /// `expected_version`.
    ///
    /// Returns the new version (`expected_version + 1`) on success.
    async fn compare_and_swap(
        &self,
        kind: &str,
        entity_id: &str,
        expected_version: u64,
        new_state: &str,
    ) -> Result<u64, StorageError>;

    /// List all entities of a kind, optionally filtered by state code.
    async fn list(
        &self,
        kind: &str,
        state_filter: Option<&str>,
    ) -> Result<Vec<EntityRecord>, StorageError>;
}

/// Append-only destination for audit records.
///
/// Durable storage, retention and export of the trail belong to the
/// implementation; the engine only appends.
#[async_trait]
pub trait AuditSink: Send + Sync + 'static {
    /// Append one record and return the sequence number assigned to it.
    async fn append(&self, record: AuditRecord) -> Result<u64, StorageError>;
}
