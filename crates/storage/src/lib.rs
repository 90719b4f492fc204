//! Persistence-side contracts for the status lifecycle engine.
//!
//! The engine talks to storage only through the two traits here:
//! [`VersionedEntityStore`] for optimistic-concurrency state updates and
//! [`AuditSink`] for the append-only audit trail. In-memory implementations
//! of both are included, along with a conformance suite that any store
//! backend can run against itself.

mod audit_log;
pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use audit_log::{AuditFilter, AuditSummary, MemoryAuditLog, OutcomeFilter};
pub use error::StorageError;
pub use memory::MemoryEntityStore;
pub use record::{AuditOutcome, AuditRecord, EntityRecord, INITIAL_VERSION};
pub use traits::{AuditSink, VersionedEntityStore};
