//! Conformance test suite for `VersionedEntityStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any store
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Creation**: entities start at version 1, duplicates are rejected
//! - **Version validation / OCC**: swaps bump the version by exactly one,
//!   stale swaps fail without writing
//! - **Error handling**: correct error variants for missing entities
//! - **Concurrency**: racing swaps on one entity have exactly one winner
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty store for each test:
//!
//! ```ignore
//! use lifecycle_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test(flavor = "multi_thread")]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_store().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod create;
mod error;
mod version;

use std::fmt;
use std::future::Future;

use crate::VersionedEntityStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "create", "version", "concurrent").
    pub category: String,
    /// Test name (e.g. "create_starts_at_version_1").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a store backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// store, ensuring test isolation. The concurrent tests spawn tokio tasks,
/// so run the suite on a multi-threaded runtime to get real contention.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: VersionedEntityStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(create::run_create_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

/// Create `Order/<id>` in `PENDING`, mapping errors to a test message.
async fn seed<S: VersionedEntityStore>(store: &S, entity_id: &str) -> Result<(), String> {
    store
        .create("order", entity_id, "PENDING")
        .await
        .map(|_| ())
        .map_err(|e| format!("create {entity_id}: {e}"))
}
