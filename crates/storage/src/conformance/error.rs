use std::future::Future;

use super::TestResult;
use crate::{StorageError, VersionedEntityStore};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: VersionedEntityStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "error",
            "read_missing_is_not_found",
            read_missing_is_not_found(&factory().await).await,
        ),
        TestResult::from_result(
            "error",
            "swap_missing_is_not_found",
            swap_missing_is_not_found(&factory().await).await,
        ),
    ]
}

async fn read_missing_is_not_found<S: VersionedEntityStore>(store: &S) -> Result<(), String> {
    match store.read("order", "ghost").await {
        Err(StorageError::EntityNotFound { kind, entity_id })
            if kind == "order" && entity_id == "ghost" =>
        {
            Ok(())
        }
        Err(e) => Err(format!("expected EntityNotFound for order/ghost, got: {e}")),
        Ok(r) => Err(format!("read of missing entity returned {r:?}")),
    }
}

async fn swap_missing_is_not_found<S: VersionedEntityStore>(store: &S) -> Result<(), String> {
    match store.compare_and_swap("order", "ghost", 1, "CONFIRMED").await {
        Err(StorageError::EntityNotFound { .. }) => {}
        Err(e) => return Err(format!("expected EntityNotFound, got: {e}")),
        Ok(v) => return Err(format!("swap of missing entity returned version {v}")),
    }
    // A failed swap must not create the entity as a side effect.
    match store.read("order", "ghost").await {
        Err(StorageError::EntityNotFound { .. }) => Ok(()),
        other => Err(format!("entity appeared after failed swap: {other:?}")),
    }
}
