use std::future::Future;
use std::sync::Arc;

use super::{seed, TestResult};
use crate::{StorageError, VersionedEntityStore};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: VersionedEntityStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_swaps_exactly_one_wins",
        concurrent_swaps_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_creates_exactly_one_wins",
        concurrent_creates_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_swaps_different_entities_all_succeed",
        concurrent_swaps_different_entities_all_succeed(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "read_modify_swap_loop_never_loses_updates",
        read_modify_swap_loop_never_loses_updates(factory).await,
    ));

    results
}

/// Await every handle and count `true` results.
async fn count_winners(
    handles: Vec<tokio::task::JoinHandle<Result<bool, StorageError>>>,
) -> Result<usize, String> {
    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }
    Ok(winners)
}

// ── Concurrent swap: exactly one wins ────────────────────────────────────────

/// N tasks each attempt to swap the same entity from version 1. Exactly one
/// swap succeeds; the rest must get ConcurrentConflict.
async fn concurrent_swaps_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionedEntityStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);
    seed(store.as_ref(), "order-1").await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            let target = if i % 2 == 0 { "CONFIRMED" } else { "CANCELLED" };
            match s.compare_and_swap("order", "order-1", 1, target).await {
                Ok(_) => Ok(true),
                Err(StorageError::ConcurrentConflict { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let winners = count_winners(handles).await?;
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }

    let read = store
        .read("order", "order-1")
        .await
        .map_err(|e| format!("read: {e}"))?;
    if read.version != 2 {
        return Err(format!("expected version 2 after race, got {}", read.version));
    }
    Ok(())
}

// ── Concurrent creation: exactly one wins ────────────────────────────────────

async fn concurrent_creates_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionedEntityStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            match s.create("order", "order-1", "PENDING").await {
                Ok(_) => Ok(true),
                Err(StorageError::AlreadyExists { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let winners = count_winners(handles).await?;
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    Ok(())
}

// ── Concurrent swaps on different entities: all succeed ─────────────────────

/// No false conflicts when there is no contention.
async fn concurrent_swaps_different_entities_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: VersionedEntityStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);
    for i in 0..N {
        seed(store.as_ref(), &format!("order-{i}")).await?;
    }

    let mut handles = Vec::new();
    for i in 0..N {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            s.compare_and_swap("order", &format!("order-{i}"), 1, "CONFIRMED")
                .await
                .map(|_| true)
        }));
    }

    let winners = count_winners(handles).await?;
    if winners != N {
        return Err(format!("expected {N} successful swaps, got {winners}"));
    }
    Ok(())
}

// ── Read-modify-swap loop: versions never skip ──────────────────────────────

/// N tasks each loop read → swap(read.version) until their swap lands. The
/// final version must be exactly 1 + N: every success bumped it once, and no
/// conflicting swap bumped it at all.
async fn read_modify_swap_loop_never_loses_updates<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: VersionedEntityStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);
    seed(store.as_ref(), "order-1").await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let current = s.read("order", "order-1").await?;
                let state = format!("STEP_{i}");
                match s
                    .compare_and_swap("order", "order-1", current.version, &state)
                    .await
                {
                    Ok(_) => return Ok(true),
                    Err(StorageError::ConcurrentConflict { .. }) => {
                        tokio::task::yield_now().await;
                    }
                    Err(e) => return Err(e),
                }
            }
        }));
    }

    let winners = count_winners(handles).await?;
    if winners != N {
        return Err(format!("expected {N} eventual successes, got {winners}"));
    }

    let read = store
        .read("order", "order-1")
        .await
        .map_err(|e| format!("read: {e}"))?;
    let expected = 1 + N as u64;
    if read.version != expected {
        return Err(format!(
            "expected final version {expected}, got {}",
            read.version
        ));
    }
    Ok(())
}
