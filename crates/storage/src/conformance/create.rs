use std::future::Future;

use super::{seed, TestResult};
use crate::{StorageError, VersionedEntityStore, INITIAL_VERSION};

pub(super) async fn run_create_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: VersionedEntityStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "create",
            "create_starts_at_version_1",
            create_starts_at_version_1(&factory().await).await,
        ),
        TestResult::from_result(
            "create",
            "create_duplicate_is_rejected",
            create_duplicate_is_rejected(&factory().await).await,
        ),
        TestResult::from_result(
            "create",
            "list_filters_by_kind_and_state",
            list_filters_by_kind_and_state(&factory().await).await,
        ),
    ]
}

async fn create_starts_at_version_1<S: VersionedEntityStore>(store: &S) -> Result<(), String> {
    let created = store
        .create("order", "order-1", "PENDING")
        .await
        .map_err(|e| format!("create: {e}"))?;
    if created.version != INITIAL_VERSION {
        return Err(format!(
            "create returned version {}, expected {INITIAL_VERSION}",
            created.version
        ));
    }

    let read = store
        .read("order", "order-1")
        .await
        .map_err(|e| format!("read: {e}"))?;
    if read.state != "PENDING" || read.version != INITIAL_VERSION {
        return Err(format!(
            "read back {}@{}, expected PENDING@{INITIAL_VERSION}",
            read.state, read.version
        ));
    }
    Ok(())
}

async fn create_duplicate_is_rejected<S: VersionedEntityStore>(store: &S) -> Result<(), String> {
    seed(store, "order-1").await?;
    match store.create("order", "order-1", "CONFIRMED").await {
        Err(StorageError::AlreadyExists { .. }) => {}
        Ok(_) => return Err("duplicate create succeeded".to_string()),
        Err(e) => return Err(format!("expected AlreadyExists, got: {e}")),
    }

    let read = store
        .read("order", "order-1")
        .await
        .map_err(|e| format!("read: {e}"))?;
    if read.state != "PENDING" {
        return Err(format!("duplicate create overwrote state to {}", read.state));
    }
    Ok(())
}

async fn list_filters_by_kind_and_state<S: VersionedEntityStore>(
    store: &S,
) -> Result<(), String> {
    seed(store, "order-1").await?;
    seed(store, "order-2").await?;
    store
        .create("news", "order-1", "DRAFT")
        .await
        .map_err(|e| format!("create news: {e}"))?;
    store
        .compare_and_swap("order", "order-2", INITIAL_VERSION, "CONFIRMED")
        .await
        .map_err(|e| format!("swap: {e}"))?;

    let all = store
        .list("order", None)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if all.len() != 2 {
        return Err(format!("expected 2 orders, got {}", all.len()));
    }

    let pending = store
        .list("order", Some("PENDING"))
        .await
        .map_err(|e| format!("list pending: {e}"))?;
    if pending.len() != 1 || pending[0].entity_id != "order-1" {
        return Err(format!("state filter returned {pending:?}"));
    }
    Ok(())
}
