use std::future::Future;

use super::{seed, TestResult};
use crate::{StorageError, VersionedEntityStore};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: VersionedEntityStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "version",
            "swap_increments_version_by_one",
            swap_increments_version_by_one(&factory().await).await,
        ),
        TestResult::from_result(
            "version",
            "stale_swap_conflicts_without_writing",
            stale_swap_conflicts_without_writing(&factory().await).await,
        ),
        TestResult::from_result(
            "version",
            "future_version_conflicts",
            future_version_conflicts(&factory().await).await,
        ),
        TestResult::from_result(
            "version",
            "swap_advances_updated_at",
            swap_advances_updated_at(&factory().await).await,
        ),
    ]
}

// ── Sequential swaps ─────────────────────────────────────────────────────────

/// Three swaps in a row, each from the version the previous one returned.
async fn swap_increments_version_by_one<S: VersionedEntityStore>(
    store: &S,
) -> Result<(), String> {
    seed(store, "order-1").await?;

    let mut version = 1;
    for state in ["CONFIRMED", "PROCESSING", "SHIPPED"] {
        let next = store
            .compare_and_swap("order", "order-1", version, state)
            .await
            .map_err(|e| format!("swap to {state}: {e}"))?;
        if next != version + 1 {
            return Err(format!(
                "swap to {state} from v{version} returned v{next}, expected v{}",
                version + 1
            ));
        }
        version = next;
    }

    let read = store
        .read("order", "order-1")
        .await
        .map_err(|e| format!("read: {e}"))?;
    if read.state != "SHIPPED" || read.version != 4 {
        return Err(format!(
            "final record {}@{}, expected SHIPPED@4",
            read.state, read.version
        ));
    }
    Ok(())
}

// ── Lost update prevention ───────────────────────────────────────────────────

/// Two writers read v1; the first swap wins, the second must conflict and
/// leave the first writer's state in place.
async fn stale_swap_conflicts_without_writing<S: VersionedEntityStore>(
    store: &S,
) -> Result<(), String> {
    seed(store, "order-1").await?;

    store
        .compare_and_swap("order", "order-1", 1, "CONFIRMED")
        .await
        .map_err(|e| format!("first swap: {e}"))?;

    match store
        .compare_and_swap("order", "order-1", 1, "CANCELLED")
        .await
    {
        Err(StorageError::ConcurrentConflict {
            expected_version,
            actual_version,
            ..
        }) => {
            if expected_version != 1 || actual_version != 2 {
                return Err(format!(
                    "conflict reported expected={expected_version} actual={actual_version}, wanted 1/2"
                ));
            }
        }
        Err(e) => return Err(format!("expected ConcurrentConflict, got: {e}")),
        Ok(v) => return Err(format!("stale swap succeeded with version {v}")),
    }

    let read = store
        .read("order", "order-1")
        .await
        .map_err(|e| format!("read: {e}"))?;
    if read.state != "CONFIRMED" || read.version != 2 {
        return Err(format!(
            "stale swap mutated the record: {}@{}",
            read.state, read.version
        ));
    }
    Ok(())
}

async fn future_version_conflicts<S: VersionedEntityStore>(store: &S) -> Result<(), String> {
    seed(store, "order-1").await?;
    match store
        .compare_and_swap("order", "order-1", 5, "CONFIRMED")
        .await
    {
        Err(StorageError::ConcurrentConflict { .. }) => Ok(()),
        Err(e) => Err(format!("expected ConcurrentConflict, got: {e}")),
        Ok(v) => Err(format!("swap from a future version succeeded with v{v}")),
    }
}

async fn swap_advances_updated_at<S: VersionedEntityStore>(store: &S) -> Result<(), String> {
    seed(store, "order-1").await?;
    let before = store
        .read("order", "order-1")
        .await
        .map_err(|e| format!("read: {e}"))?;
    store
        .compare_and_swap("order", "order-1", 1, "CONFIRMED")
        .await
        .map_err(|e| format!("swap: {e}"))?;
    let after = store
        .read("order", "order-1")
        .await
        .map_err(|e| format!("read: {e}"))?;
    if after.updated_at < before.updated_at {
        return Err(format!(
            "updated_at moved backwards: {} -> {}",
            before.updated_at, after.updated_at
        ));
    }
    Ok(())
}
