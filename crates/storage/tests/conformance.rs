//! Runs the storage conformance suite against the in-memory store.

use lifecycle_storage::conformance::run_conformance_suite;
use lifecycle_storage::MemoryEntityStore;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_store_passes_conformance_suite() {
    let report = run_conformance_suite(|| async { MemoryEntityStore::new() }).await;
    assert_eq!(report.failed, 0, "{report}");
    assert_eq!(report.total, report.results.len());
    assert!(report.total >= 13);
}
