#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lifecycle_engine::{
    CommandDispatcher, CommandParams, DispatchError, EntityKind, StateCode, StateGraph,
    TransitionExecutor, TransitionGuard,
};
use lifecycle_storage::{
    EntityRecord, MemoryAuditLog, MemoryEntityStore, StorageError, VersionedEntityStore,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Fixture<S: StateCode> {
    pub executor: Arc<TransitionExecutor<S>>,
    pub store: Arc<MemoryEntityStore>,
    pub audit: Arc<MemoryAuditLog>,
}

/// Executor over an in-memory store seeded with `(id, state, version)`.
pub fn fixture<S: StateCode>(
    graph: StateGraph<S>,
    guard: TransitionGuard,
    seed: &[(&str, &str, u64)],
) -> Fixture<S> {
    init_tracing();
    let store = Arc::new(MemoryEntityStore::with_records(seed.iter().map(
        |(id, state, version)| EntityRecord::new(S::KIND.as_str(), id, state).at_version(*version),
    )));
    let audit = Arc::new(MemoryAuditLog::new());
    let executor = Arc::new(TransitionExecutor::new(
        graph,
        store.clone(),
        guard,
        audit.clone(),
    ));
    Fixture {
        executor,
        store,
        audit,
    }
}

/// Store whose first compare-and-swap loses a race: just before delegating it
/// moves the entity to `interloper_state` itself.
pub struct RacingStore {
    pub inner: Arc<MemoryEntityStore>,
    pub interloper_state: &'static str,
    raced: AtomicBool,
    pub cas_calls: AtomicUsize,
}

impl RacingStore {
    pub fn new(inner: Arc<MemoryEntityStore>, interloper_state: &'static str) -> Self {
        Self {
            inner,
            interloper_state,
            raced: AtomicBool::new(false),
            cas_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VersionedEntityStore for RacingStore {
    async fn create(
        &self,
        kind: &str,
        entity_id: &str,
        initial_state: &str,
    ) -> Result<EntityRecord, StorageError> {
        self.inner.create(kind, entity_id, initial_state).await
    }

    async fn read(&self, kind: &str, entity_id: &str) -> Result<EntityRecord, StorageError> {
        self.inner.read(kind, entity_id).await
    }

    async fn compare_and_swap(
        &self,
        kind: &str,
        entity_id: &str,
        expected_version: u64,
        new_state: &str,
    ) -> Result<u64, StorageError> {
        self.cas_calls.fetch_add(1, Ordering::SeqCst);
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.inner
                .compare_and_swap(kind, entity_id, expected_version, self.interloper_state)
                .await?;
        }
        self.inner
            .compare_and_swap(kind, entity_id, expected_version, new_state)
            .await
    }

    async fn list(
        &self,
        kind: &str,
        state_filter: Option<&str>,
    ) -> Result<Vec<EntityRecord>, StorageError> {
        self.inner.list(kind, state_filter).await
    }
}

/// Store where somebody else always got there first.
pub struct AlwaysConflictStore {
    pub inner: Arc<MemoryEntityStore>,
    pub cas_calls: AtomicUsize,
}

impl AlwaysConflictStore {
    pub fn new(inner: Arc<MemoryEntityStore>) -> Self {
        Self {
            inner,
            cas_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VersionedEntityStore for AlwaysConflictStore {
    async fn create(
        &self,
        kind: &str,
        entity_id: &str,
        initial_state: &str,
    ) -> Result<EntityRecord, StorageError> {
        self.inner.create(kind, entity_id, initial_state).await
    }

    async fn read(&self, kind: &str, entity_id: &str) -> Result<EntityRecord, StorageError> {
        self.inner.read(kind, entity_id).await
    }

    async fn compare_and_swap(
        &self,
        kind: &str,
        entity_id: &str,
        expected_version: u64,
        _new_state: &str,
    ) -> Result<u64, StorageError> {
        self.cas_calls.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::ConcurrentConflict {
            kind: kind.to_string(),
            entity_id: entity_id.to_string(),
            expected_version,
            actual_version: expected_version + 1,
        })
    }

    async fn list(
        &self,
        kind: &str,
        state_filter: Option<&str>,
    ) -> Result<Vec<EntityRecord>, StorageError> {
        self.inner.list(kind, state_filter).await
    }
}

/// Store whose reads take `delay`.
pub struct SlowStore {
    pub inner: Arc<MemoryEntityStore>,
    pub delay: Duration,
}

#[async_trait]
impl VersionedEntityStore for SlowStore {
    async fn create(
        &self,
        kind: &str,
        entity_id: &str,
        initial_state: &str,
    ) -> Result<EntityRecord, StorageError> {
        self.inner.create(kind, entity_id, initial_state).await
    }

    async fn read(&self, kind: &str, entity_id: &str) -> Result<EntityRecord, StorageError> {
        tokio::time::sleep(self.delay).await;
        self.inner.read(kind, entity_id).await
    }

    async fn compare_and_swap(
        &self,
        kind: &str,
        entity_id: &str,
        expected_version: u64,
        new_state: &str,
    ) -> Result<u64, StorageError> {
        self.inner
            .compare_and_swap(kind, entity_id, expected_version, new_state)
            .await
    }

    async fn list(
        &self,
        kind: &str,
        state_filter: Option<&str>,
    ) -> Result<Vec<EntityRecord>, StorageError> {
        self.inner.list(kind, state_filter).await
    }
}

/// Device API double that records every dispatch and can be told to fail.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub calls: Mutex<Vec<(String, String, CommandParams)>>,
    pub fail_with: Mutex<Option<String>>,
}

impl RecordingDispatcher {
    pub fn calls(&self) -> Vec<(String, String, CommandParams)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_with(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl CommandDispatcher for RecordingDispatcher {
    async fn dispatch(
        &self,
        kind: EntityKind,
        entity_id: &str,
        command: &str,
        params: &CommandParams,
    ) -> Result<(), DispatchError> {
        assert_eq!(kind, EntityKind::ManagedDevice);
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(DispatchError(message));
        }
        self.calls
            .lock()
            .unwrap()
            .push((entity_id.to_string(), command.to_string(), params.clone()));
        Ok(())
    }
}
