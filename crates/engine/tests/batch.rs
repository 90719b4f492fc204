mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{fixture, init_tracing, RecordingDispatcher};
use lifecycle_engine::lifecycle::device::{device_graph, PUSH_FIRMWARE};
use lifecycle_engine::lifecycle::news::news_graph;
use lifecycle_engine::lifecycle::order::order_graph;
use lifecycle_engine::{
    BatchOperationRunner, DeviceStatus, EngineConfig, LifecycleEngine, NewsStatus,
    OperationTemplate, OrderStatus, TransitionExecutor, TransitionGuard,
};
use lifecycle_storage::{
    EntityRecord, MemoryAuditLog, MemoryEntityStore, StorageError, VersionedEntityStore,
};

#[tokio::test]
async fn mixed_batch_reports_per_item_outcomes() {
    let fx = fixture(
        order_graph().unwrap(),
        TransitionGuard::allow_all(),
        &[("orderA", "CONFIRMED", 1), ("orderB", "CANCELLED", 1)],
    );
    let runner = BatchOperationRunner::new(fx.executor.clone());

    let report = runner
        .run_batch(
            &["orderA", "orderB"],
            &OperationTemplate::transition(OrderStatus::Processing),
            "alice",
        )
        .await;

    assert_eq!(report.total_count(), 2);
    assert_eq!(report.success_ids(), vec!["orderA"]);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.failures()[0].entity_id, "orderB");
    assert_eq!(report.failures()[0].reason, "illegal transition");

    assert_eq!(fx.store.read("order", "orderA").await.unwrap().state, "PROCESSING");
    assert_eq!(fx.store.read("order", "orderB").await.unwrap().version, 1);
    assert_eq!(fx.audit.len().unwrap(), 2);
}

#[tokio::test]
async fn one_bad_item_leaves_the_rest_untouched() {
    let seed: Vec<(String, &str, u64)> = (0..10)
        .map(|i| {
            let state = if i == 4 { "DELIVERED" } else { "SHIPPED" };
            (format!("o-{i}"), state, 3)
        })
        .collect();
    let seed: Vec<(&str, &str, u64)> = seed.iter().map(|(id, s, v)| (id.as_str(), *s, *v)).collect();
    let fx = fixture(order_graph().unwrap(), TransitionGuard::allow_all(), &seed);

    let ids: Vec<String> = (0..10).map(|i| format!("o-{i}")).collect();
    let report = BatchOperationRunner::new(fx.executor.clone())
        .run_batch(
            &ids,
            &OperationTemplate::transition(OrderStatus::Cancelled).with_reason("recall"),
            "support",
        )
        .await;

    assert_eq!(report.success_count(), 9);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.failures()[0].entity_id, "o-4");
    assert_eq!(report.summary(), "succeeded 9, failed 1");
    for success in report.successes() {
        assert_eq!(success.state, "CANCELLED");
        assert_eq!(success.version, 4);
    }
    assert_eq!(fx.store.read("order", "o-4").await.unwrap().state, "DELIVERED");
    assert!(fx
        .audit
        .records()
        .unwrap()
        .iter()
        .all(|r| r.notes.as_deref() == Some("recall")));
}

/// Reads of lower-numbered ids are slower, so with parallelism the items
/// finish in reverse order.
struct StaggeredStore {
    inner: MemoryEntityStore,
}

#[async_trait]
impl VersionedEntityStore for StaggeredStore {
    async fn create(
        &self,
        kind: &str,
        entity_id: &str,
        initial_state: &str,
    ) -> Result<EntityRecord, StorageError> {
        self.inner.create(kind, entity_id, initial_state).await
    }

    async fn read(&self, kind: &str, entity_id: &str) -> Result<EntityRecord, StorageError> {
        let n: u64 = entity_id.trim_start_matches("n-").parse().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(10 * (8 - n.min(8)))).await;
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

#[tokio::test]
async fn parallel_batch_keeps_input_order() {
    init_tracing();
    let ids: Vec<String> = (0..8).map(|i| format!("n-{i}")).collect();
    let inner = MemoryEntityStore::with_records(ids.iter().map(|id| {
        let state = if id == "n-5" { "PUBLISHED" } else { "DRAFT" };
        EntityRecord::new("news", id, state)
    }));
    let audit = Arc::new(MemoryAuditLog::new());
    let executor = Arc::new(TransitionExecutor::new(
        news_graph().unwrap(),
        Arc::new(StaggeredStore { inner }),
        TransitionGuard::allow_all(),
        audit.clone(),
    ));

    let runner = BatchOperationRunner::new(executor)
        .with_config(&EngineConfig::from_toml_str("batch_concurrency = 8").unwrap());
    assert_eq!(runner.concurrency(), 8);

    let report = runner
        .run_batch(
            &ids,
            &OperationTemplate::transition(NewsStatus::Published),
            "editor",
        )
        .await;

    assert_eq!(
        report.success_ids(),
        vec!["n-0", "n-1", "n-2", "n-3", "n-4", "n-6", "n-7"]
    );
    assert_eq!(report.failures()[0].entity_id, "n-5");
    assert_eq!(report.failures()[0].reason, "already in state PUBLISHED");

    // Completion order differs from input order; the audit trail shows it.
    let audited: Vec<String> = audit
        .records()
        .unwrap()
        .into_iter()
        .map(|r| r.entity_id)
        .collect();
    assert_eq!(audited.first().map(String::as_str), Some("n-7"));
}

#[tokio::test]
async fn empty_batch_returns_empty_report() {
    let fx = fixture(order_graph().unwrap(), TransitionGuard::allow_all(), &[]);
    let ids: [&str; 0] = [];
    let report = BatchOperationRunner::new(fx.executor.clone())
        .run_batch(
            &ids,
            &OperationTemplate::transition(OrderStatus::Confirmed),
            "alice",
        )
        .await;
    assert_eq!(report.total_count(), 0);
    assert!(report.successes().is_empty() && report.failures().is_empty());
    assert!(fx.audit.is_empty().unwrap());
}

#[tokio::test]
async fn missing_and_unknown_items_become_failures() {
    let fx = fixture(
        order_graph().unwrap(),
        TransitionGuard::allow_all(),
        &[("o-1", "PENDING", 1), ("o-2", "LOST", 1)],
    );
    let report = BatchOperationRunner::new(fx.executor.clone())
        .run_batch(
            &["o-1", "o-2", "o-3"],
            &OperationTemplate::transition(OrderStatus::Confirmed),
            "alice",
        )
        .await;

    assert_eq!(report.success_ids(), vec!["o-1"]);
    let reasons: Vec<_> = report
        .failures()
        .iter()
        .map(|f| (f.entity_id.as_str(), f.reason.as_str()))
        .collect();
    assert_eq!(
        reasons,
        vec![
            ("o-2", "unknown order state 'LOST'"),
            ("o-3", "entity not found"),
        ]
    );
    assert_eq!(fx.audit.len().unwrap(), 3);
}

#[tokio::test]
async fn duplicate_ids_are_applied_in_turn() {
    let fx = fixture(
        order_graph().unwrap(),
        TransitionGuard::allow_all(),
        &[("o-1", "PENDING", 1)],
    );
    let report = BatchOperationRunner::new(fx.executor.clone())
        .run_batch(
            &["o-1", "o-1"],
            &OperationTemplate::transition(OrderStatus::Confirmed),
            "alice",
        )
        .await;
    assert_eq!(report.total_count(), 2);
    assert_eq!(report.success_count(), 1);
    assert_eq!(report.failures()[0].reason, "already in state CONFIRMED");
}

#[tokio::test]
async fn batch_delete_skips_online_devices() {
    let fx = fixture(
        device_graph().unwrap(),
        TransitionGuard::allow_all(),
        &[
            ("dev-1", "OFFLINE", 2),
            ("dev-2", "ONLINE", 5),
            ("dev-3", "MAINTENANCE", 1),
        ],
    );
    let report = BatchOperationRunner::new(fx.executor.clone())
        .run_batch(
            &["dev-1", "dev-2", "dev-3"],
            &OperationTemplate::transition(DeviceStatus::Deleted).with_reason("decommissioned"),
            "ops",
        )
        .await;

    assert_eq!(report.success_ids(), vec!["dev-1", "dev-3"]);
    assert_eq!(report.failures()[0].entity_id, "dev-2");
    assert_eq!(report.failures()[0].reason, "illegal transition");

    // Deleted devices stay in the store at their terminal state.
    let deleted = fx.executor.list(Some(DeviceStatus::Deleted)).await.unwrap();
    assert_eq!(deleted.len(), 2);
    let online = fx.store.read("managed_device", "dev-2").await.unwrap();
    assert_eq!((online.state.as_str(), online.version), ("ONLINE", 5));

    let history = fx.audit.history("managed_device", "dev-1").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].to_state, "DELETED");
    assert_eq!(history[0].notes.as_deref(), Some("decommissioned"));
    assert_eq!(fx.audit.failures().unwrap().len(), 1);

    let again = BatchOperationRunner::new(fx.executor.clone())
        .run_batch(
            &["dev-1"],
            &OperationTemplate::transition(DeviceStatus::Online),
            "ops",
        )
        .await;
    assert_eq!(again.failures()[0].reason, "illegal transition");
}

#[tokio::test]
async fn batch_delete_news_only_accepts_drafts() {
    let fx = fixture(
        news_graph().unwrap(),
        TransitionGuard::allow_all(),
        &[("n-1", "DRAFT", 1), ("n-2", "PUBLISHED", 3)],
    );
    let report = BatchOperationRunner::new(fx.executor.clone())
        .run_batch(
            &["n-1", "n-2", "n-3"],
            &OperationTemplate::transition(NewsStatus::Deleted),
            "editor",
        )
        .await;

    assert_eq!(report.success_ids(), vec!["n-1"]);
    let reasons: Vec<_> = report
        .failures()
        .iter()
        .map(|f| (f.entity_id.as_str(), f.reason.as_str()))
        .collect();
    assert_eq!(
        reasons,
        vec![("n-2", "illegal transition"), ("n-3", "entity not found")]
    );
    assert_eq!(fx.audit.len().unwrap(), 3);
}

#[tokio::test]
async fn firmware_batch_through_engine() {
    init_tracing();
    let store = Arc::new(MemoryEntityStore::with_records([
        EntityRecord::new("managed_device", "dev-1", "ONLINE"),
        EntityRecord::new("managed_device", "dev-2", "ERROR"),
        EntityRecord::new("managed_device", "dev-3", "ONLINE"),
    ]));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let engine = LifecycleEngine::new(
        EngineConfig::from_toml_str("batch_concurrency = 2").unwrap(),
        store,
        Arc::new(MemoryAuditLog::new()),
        dispatcher.clone(),
    )
    .unwrap();

    let report = engine
        .device_batch()
        .run_batch(
            &["dev-1", "dev-2", "dev-3"],
            &OperationTemplate::command(PUSH_FIRMWARE).with_param("version", "3.0.0"),
            "ops",
        )
        .await;

    assert_eq!(report.success_ids(), vec!["dev-1", "dev-3"]);
    assert_eq!(
        report.failures()[0].reason,
        "push_firmware requires state ONLINE"
    );
    let mut pushed: Vec<_> = dispatcher.calls().into_iter().map(|c| c.0).collect();
    pushed.sort();
    assert_eq!(pushed, vec!["dev-1", "dev-3"]);
}

#[tokio::test]
async fn report_serializes_for_callers() {
    let fx = fixture(
        order_graph().unwrap(),
        TransitionGuard::allow_all(),
        &[("orderA", "CONFIRMED", 1), ("orderB", "CANCELLED", 1)],
    );
    let report = BatchOperationRunner::new(fx.executor.clone())
        .run_batch(
            &["orderA", "orderB"],
            &OperationTemplate::transition(OrderStatus::Processing),
            "alice",
        )
        .await;

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "total_count": 2,
            "successes": [
                { "entity_id": "orderA", "state": "PROCESSING", "version": 2 }
            ],
            "failures": [
                { "entity_id": "orderB", "reason": "illegal transition" }
            ]
        })
    );
}
