/// All errors that can be returned by a `VersionedEntityStore` or `AuditSink`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency control conflict: the stored version no longer
    /// matches the version the caller read. Nothing was written.
    #[error(
        "concurrent conflict on {kind}/{entity_id}: expected version {expected_version}, found {actual_version}"
    )]
    ConcurrentConflict {
        kind: String,
        entity_id: String,
        expected_version: u64,
        actual_version: u64,
    },

    /// No record with the given (kind, entity_id).
    #[error("entity not found: {kind}/{entity_id}")]
    EntityNotFound { kind: String, entity_id: String },

    /// A record with this (kind, entity_id) already exists.
    #[error("entity already exists: {kind}/{entity_id}")]
    AlreadyExists { kind: String, entity_id: String },

    /// The backend could not be reached (network, timeout, maintenance).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A backend-specific failure (poisoned lock, serialization, constraint).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether the error is an OCC version conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::ConcurrentConflict { .. })
    }

    /// Whether the error means the system, rather than the request, failed.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_) | StorageError::Backend(_))
    }
}
