//! In-memory audit trail with the history queries operators use.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::record::AuditRecord;
use crate::traits::AuditSink;

/// Which outcomes a query should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutcomeFilter {
    #[default]
    Any,
    SuccessOnly,
    FailureOnly,
}

/// Conjunctive filter over the audit trail. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub entity_kind: Option<String>,
    pub entity_id: Option<String>,
    pub actor: Option<String>,
    pub outcome: OutcomeFilter,
    /// Inclusive lower bound on the record timestamp.
    pub since: Option<OffsetDateTime>,
    /// Exclusive upper bound on the record timestamp.
    pub until: Option<OffsetDateTime>,
}

impl AuditFilter {
    pub fn for_entity(kind: &str, entity_id: &str) -> Self {
        Self {
            entity_kind: Some(kind.to_string()),
            entity_id: Some(entity_id.to_string()),
            ..Self::default()
        }
    }

    fn matches(&self, record: &AuditRecord) -> bool {
        let outcome_ok = match self.outcome {
            OutcomeFilter::Any => true,
            OutcomeFilter::SuccessOnly => record.is_success(),
            OutcomeFilter::FailureOnly => !record.is_success(),
        };
        outcome_ok
            && self
                .entity_kind
                .as_ref()
                .map_or(true, |k| *k == record.entity_kind)
            && self
                .entity_id
                .as_ref()
                .map_or(true, |id| *id == record.entity_id)
            && self.actor.as_ref().map_or(true, |a| *a == record.actor)
            && self.since.map_or(true, |t| record.timestamp >= t)
            && self.until.map_or(true, |t| record.timestamp < t)
    }
}

/// Outcome counts over the whole trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AuditSummary {
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
}

/// Append-only vector of audit records.
///
/// Sequence numbers start at 1 and equal the record's position in the trail.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: RwLock<Vec<AuditRecord>>,
    failing: AtomicBool,
}

fn poisoned<T>(_: PoisonError<T>) -> StorageError {
    StorageError::Backend("audit log lock poisoned".to_string())
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a broken sink: while set, `append` fails and records nothing.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All records in append order.
    pub fn records(&self) -> Result<Vec<AuditRecord>, StorageError> {
        Ok(self.records.read().map_err(poisoned)?.clone())
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Look up a record by the sequence number `append` returned.
    pub fn get(&self, seq: u64) -> Result<Option<AuditRecord>, StorageError> {
        let records = self.records.read().map_err(poisoned)?;
        let index = match usize::try_from(seq) {
            Ok(i) if i >= 1 => i - 1,
            _ => return Ok(None),
        };
        Ok(records.get(index).cloned())
    }

    /// Records matching `filter`, in append order.
    pub fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, StorageError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    /// Full history of one entity, oldest first.
    pub fn history(&self, kind: &str, entity_id: &str) -> Result<Vec<AuditRecord>, StorageError> {
        self.query(&AuditFilter::for_entity(kind, entity_id))
    }

    /// Every failed attempt across all entities.
    pub fn failures(&self) -> Result<Vec<AuditRecord>, StorageError> {
        self.query(&AuditFilter {
            outcome: OutcomeFilter::FailureOnly,
            ..AuditFilter::default()
        })
    }

    /// The newest `limit` records, newest first.
    pub fn latest(&self, limit: usize) -> Result<Vec<AuditRecord>, StorageError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }

    pub fn summary(&self) -> Result<AuditSummary, StorageError> {
        let records = self.records.read().map_err(poisoned)?;
        let successes = records.iter().filter(|r| r.is_success()).count();
        Ok(AuditSummary {
            total: records.len(),
            successes,
            failures: records.len() - successes,
        })
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<u64, StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "in-memory audit log switched offline".to_string(),
            ));
        }
        let mut records = self.records.write().map_err(poisoned)?;
        records.push(record);
        Ok(records.len() as u64)
    }
}
