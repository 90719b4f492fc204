use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Version assigned to a freshly created entity.
pub const INITIAL_VERSION: u64 = 1;

/// A snapshot of an entity's current lifecycle state as stored in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity kind discriminator, e.g. `"order"`.
    pub kind: String,
    pub entity_id: String,
    /// Persisted state code, e.g. `"PENDING"`.
    pub state: String,
    /// Starts at [`INITIAL_VERSION`] and grows by exactly one per successful swap.
    pub version: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl EntityRecord {
    /// A record in `state` at the initial version, stamped now.
    pub fn new(kind: &str, entity_id: &str, state: &str) -> Self {
        Self {
            kind: kind.to_string(),
            entity_id: entity_id.to_string(),
            state: state.to_string(),
            version: INITIAL_VERSION,
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    /// Same record with an explicit version, for seeding fixtures and imports.
    pub fn at_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }
}

/// Terminal outcome of one attempted operation.
///
/// The failure reason lives inside the `Failure` variant, so a record can
/// never carry a reason without failing or fail without a reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Success,
    Failure { reason: String },
}

/// Immutable record of one attempted transition or command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub entity_kind: String,
    pub entity_id: String,
    /// `"transition"`, `"create"`, or a command name such as `"reboot"`.
    pub operation: String,
    /// State observed before the attempt. `None` when the entity was never read
    /// (not found, store unavailable, timed out before the read).
    pub from_state: Option<String>,
    /// Requested target. Equal to `from_state` for commands.
    pub to_state: String,
    pub actor: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(flatten)]
    pub outcome: AuditOutcome,
    /// Version after a successful swap, otherwise the version observed at the
    /// time of the attempt.
    pub entity_version: Option<u64>,
    /// Free-text notes supplied by the caller.
    pub notes: Option<String>,
}

impl AuditRecord {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AuditOutcome::Success)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            AuditOutcome::Success => None,
            AuditOutcome::Failure { reason } => Some(reason),
        }
    }
}
