//! Single-entity transition and command execution.
//!
//! Every [`TransitionExecutor::execute`] call runs the same pipeline:
//!
//! 1. read the entity's `(state, version)`
//! 2. reject if the target equals the current state
//! 3. reject if the graph has no edge to the target
//! 4. ask the [`TransitionGuard`]
//! 5. compare-and-swap on the version read in step 1; on conflict start over
//!    from step 1 once, then give up
//!
//! and finally appends exactly one [`AuditRecord`] describing the terminal
//! outcome. The audit write always follows the mutation and its failure never
//! changes the result handed back to the caller.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use lifecycle_storage::{
    AuditOutcome, AuditRecord, AuditSink, EntityRecord, StorageError, VersionedEntityStore,
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};

use crate::command::{
    CommandDispatcher, CommandRequest, CommandResult, CommandSpec, NoopDispatcher,
};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::graph::{StateCode, StateGraph};
use crate::guard::{Authorization, TransitionGuard};

/// Compare-and-swap attempts per execute: the first try plus one retry.
const MAX_CAS_ATTEMPTS: u32 = 2;

pub const TRANSITION_OPERATION: &str = "transition";
pub const CREATE_OPERATION: &str = "create";

// ── Requests and results ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest<S> {
    pub entity_id: String,
    pub target: S,
    pub actor: String,
    /// Free-text reason, copied into the audit record's notes.
    pub reason: Option<String>,
    /// Overrides the executor's default deadline.
    pub deadline: Option<Duration>,
}

impl<S> TransitionRequest<S> {
    pub fn new(entity_id: impl Into<String>, target: S, actor: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            target,
            actor: actor.into(),
            reason: None,
            deadline: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionResult<S> {
    Success { from: S, state: S, version: u64 },
    Rejected(Rejection),
}

impl<S> TransitionResult<S> {
    pub fn is_success(&self) -> bool {
        matches!(self, TransitionResult::Success { .. })
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            TransitionResult::Success { .. } => None,
            TransitionResult::Rejected(r) => Some(r),
        }
    }
}

/// Why an operation was refused. Display gives the caller-facing reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    #[error("entity not found")]
    NotFound,

    #[error("already in state {state}")]
    AlreadyInState { state: String },

    #[error("illegal transition")]
    IllegalTransition { from: String, to: String },

    #[error("{reason}")]
    PermissionDenied { reason: String },

    /// The version moved under us on both attempts.
    #[error("concurrent modification")]
    ConcurrentModification,

    #[error("store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("timeout")]
    Timeout,

    #[error("{command} requires state {required}")]
    PreconditionFailed {
        command: String,
        state: String,
        required: String,
    },

    #[error("unsupported operation '{name}'")]
    UnsupportedOperation { name: String },

    #[error("{command} failed: {message}")]
    CommandFailed { command: String, message: String },
}

impl Rejection {
    pub fn reason(&self) -> String {
        self.to_string()
    }

    /// True when the system, not the request, is at fault: retrying the same
    /// request later may succeed.
    pub fn is_system_failure(&self) -> bool {
        matches!(
            self,
            Rejection::StoreUnavailable { .. }
                | Rejection::Timeout
                | Rejection::CommandFailed { .. }
        )
    }
}

impl From<StorageError> for Rejection {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::EntityNotFound { .. } => Rejection::NotFound,
            StorageError::ConcurrentConflict { .. } => Rejection::ConcurrentModification,
            other => Rejection::StoreUnavailable {
                message: other.to_string(),
            },
        }
    }
}

/// What the attempt saw of the entity, kept outside the deadline so a
/// timed-out call can still be audited.
#[derive(Debug, Default)]
struct Observed {
    state: Option<String>,
    version: Option<u64>,
}

// ── Executor ─────────────────────────────────────────────────────────────────

pub struct TransitionExecutor<S: StateCode> {
    graph: Arc<StateGraph<S>>,
    store: Arc<dyn VersionedEntityStore>,
    guard: TransitionGuard,
    audit: Arc<dyn AuditSink>,
    dispatcher: Arc<dyn CommandDispatcher>,
    commands: Vec<CommandSpec<S>>,
    default_deadline: Option<Duration>,
}

impl<S: StateCode> std::fmt::Debug for TransitionExecutor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionExecutor")
            .field("kind", &S::KIND)
            .field("commands", &self.commands)
            .field("default_deadline", &self.default_deadline)
            .finish_non_exhaustive()
    }
}

impl<S: StateCode> TransitionExecutor<S> {
    pub fn new(
        graph: StateGraph<S>,
        store: Arc<dyn VersionedEntityStore>,
        guard: TransitionGuard,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            graph: Arc::new(graph),
            store,
            guard,
            audit,
            dispatcher: Arc::new(NoopDispatcher),
            commands: Vec::new(),
            default_deadline: None,
        }
    }

    /// Register the commands this kind supports and where to send them.
    pub fn with_commands(
        mut self,
        dispatcher: Arc<dyn CommandDispatcher>,
        commands: Vec<CommandSpec<S>>,
    ) -> Self {
        self.dispatcher = dispatcher;
        self.commands = commands;
        self
    }

    pub fn with_default_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.default_deadline = deadline;
        self
    }

    /// Apply the executor-level settings from `config`.
    pub fn with_config(self, config: &EngineConfig) -> Self {
        self.with_default_deadline(config.default_deadline())
    }

    pub fn graph(&self) -> &StateGraph<S> {
        &self.graph
    }

    pub fn command(&self, name: &str) -> Option<&CommandSpec<S>> {
        self.commands.iter().find(|spec| spec.name == name)
    }

    /// Move one entity to `request.target`.
    ///
    /// Refusals come back as `Ok(TransitionResult::Rejected(..))`. `Err` is
    /// reserved for a persisted state code the graph does not declare; that
    /// attempt is still audited.
    #[instrument(
        skip(self, request),
        fields(
            kind = S::KIND.as_str(),
            entity_id = %request.entity_id,
            actor = %request.actor,
            to = request.target.code(),
        )
    )]
    pub async fn execute(
        &self,
        request: TransitionRequest<S>,
    ) -> Result<TransitionResult<S>, EngineError> {
        let mut observed = Observed::default();
        let deadline = request.deadline.or(self.default_deadline);
        let outcome = with_deadline(deadline, self.attempt_transition(&request, &mut observed))
            .await
            .unwrap_or(Ok(TransitionResult::Rejected(Rejection::Timeout)));

        let audit_outcome = match &outcome {
            Ok(TransitionResult::Success { from, state, version }) => {
                info!(%from, %state, version, "transition applied");
                AuditOutcome::Success
            }
            Ok(TransitionResult::Rejected(rejection)) => {
                warn!(reason = %rejection, "transition rejected");
                AuditOutcome::Failure {
                    reason: rejection.reason(),
                }
            }
            Err(e) => {
                error!(error = %e, "transition aborted");
                AuditOutcome::Failure {
                    reason: e.to_string(),
                }
            }
        };

        self.record(AuditRecord {
            entity_kind: S::KIND.as_str().to_string(),
            entity_id: request.entity_id.clone(),
            operation: TRANSITION_OPERATION.to_string(),
            from_state: observed.state,
            to_state: request.target.code().to_string(),
            actor: request.actor.clone(),
            timestamp: OffsetDateTime::now_utc(),
            outcome: audit_outcome,
            entity_version: observed.version,
            notes: request.reason.clone(),
        })
        .await;

        outcome
    }

    async fn attempt_transition(
        &self,
        request: &TransitionRequest<S>,
        observed: &mut Observed,
    ) -> Result<TransitionResult<S>, EngineError> {
        let kind = S::KIND.as_str();
        let target = request.target;

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = match self.store.read(kind, &request.entity_id).await {
                Ok(record) => record,
                Err(e) => return Ok(TransitionResult::Rejected(e.into())),
            };
            observed.state = Some(current.state.clone());
            observed.version = Some(current.version);

            let from = self.graph.parse_state(&current.state)?;
            if from == target {
                return Ok(TransitionResult::Rejected(Rejection::AlreadyInState {
                    state: from.code().to_string(),
                }));
            }
            if !self.graph.can_transition(from, target)? {
                return Ok(TransitionResult::Rejected(Rejection::IllegalTransition {
                    from: from.code().to_string(),
                    to: target.code().to_string(),
                }));
            }
            if let Authorization::Deny(reason) = self
                .guard
                .authorize(&request.actor, &request.entity_id, from, target)
                .await
            {
                return Ok(TransitionResult::Rejected(Rejection::PermissionDenied {
                    reason,
                }));
            }

            match self
                .store
                .compare_and_swap(kind, &request.entity_id, current.version, target.code())
                .await
            {
                Ok(version) => {
                    observed.version = Some(version);
                    return Ok(TransitionResult::Success {
                        from,
                        state: target,
                        version,
                    });
                }
                Err(StorageError::ConcurrentConflict { actual_version, .. }) => {
                    if attempt < MAX_CAS_ATTEMPTS {
                        debug!(
                            expected = current.version,
                            actual = actual_version,
                            "version conflict, retrying"
                        );
                        continue;
                    }
                    warn!(
                        expected = current.version,
                        actual = actual_version,
                        "version conflict on retry"
                    );
                }
                Err(e) => return Ok(TransitionResult::Rejected(e.into())),
            }
        }

        Ok(TransitionResult::Rejected(Rejection::ConcurrentModification))
    }

    /// Run a registered command against one entity. Commands never change
    /// state or version.
    #[instrument(
        skip(self, request),
        fields(
            kind = S::KIND.as_str(),
            entity_id = %request.entity_id,
            actor = %request.actor,
            command = %request.command,
        )
    )]
    pub async fn run_command(
        &self,
        request: CommandRequest,
    ) -> Result<CommandResult<S>, EngineError> {
        let mut observed = Observed::default();
        let deadline = request.deadline.or(self.default_deadline);
        let outcome = with_deadline(deadline, self.attempt_command(&request, &mut observed))
            .await
            .unwrap_or(Ok(CommandResult::Rejected(Rejection::Timeout)));

        let audit_outcome = match &outcome {
            Ok(CommandResult::Completed { state, .. }) => {
                info!(%state, "command completed");
                AuditOutcome::Success
            }
            Ok(CommandResult::Rejected(rejection)) => {
                warn!(reason = %rejection, "command rejected");
                AuditOutcome::Failure {
                    reason: rejection.reason(),
                }
            }
            Err(e) => {
                error!(error = %e, "command aborted");
                AuditOutcome::Failure {
                    reason: e.to_string(),
                }
            }
        };

        let state = observed.state.clone().unwrap_or_default();
        self.record(AuditRecord {
            entity_kind: S::KIND.as_str().to_string(),
            entity_id: request.entity_id.clone(),
            operation: request.command.clone(),
            from_state: observed.state,
            to_state: state,
            actor: request.actor.clone(),
            timestamp: OffsetDateTime::now_utc(),
            outcome: audit_outcome,
            entity_version: observed.version,
            notes: request.reason.clone(),
        })
        .await;

        outcome
    }

    async fn attempt_command(
        &self,
        request: &CommandRequest,
        observed: &mut Observed,
    ) -> Result<CommandResult<S>, EngineError> {
        let Some(spec) = self.command(&request.command) else {
            return Ok(CommandResult::Rejected(Rejection::UnsupportedOperation {
                name: request.command.clone(),
            }));
        };

        let current = match self.store.read(S::KIND.as_str(), &request.entity_id).await {
            Ok(record) => record,
            Err(e) => return Ok(CommandResult::Rejected(e.into())),
        };
        observed.state = Some(current.state.clone());
        observed.version = Some(current.version);

        let state = self.graph.parse_state(&current.state)?;
        if !spec.permits(state) {
            return Ok(CommandResult::Rejected(Rejection::PreconditionFailed {
                command: spec.name.to_string(),
                state: state.code().to_string(),
                required: spec.required_states(),
            }));
        }
        if let Authorization::Deny(reason) = self
            .guard
            .authorize_command(&request.actor, &request.entity_id, state, spec.name)
            .await
        {
            return Ok(CommandResult::Rejected(Rejection::PermissionDenied {
                reason,
            }));
        }

        if let Err(e) = self
            .dispatcher
            .dispatch(S::KIND, &request.entity_id, spec.name, &request.params)
            .await
        {
            return Ok(CommandResult::Rejected(Rejection::CommandFailed {
                command: spec.name.to_string(),
                message: e.to_string(),
            }));
        }

        Ok(CommandResult::Completed {
            state,
            version: current.version,
        })
    }

    /// Insert a new entity in the graph's initial state. Audited as a
    /// `create` operation.
    #[instrument(skip(self), fields(kind = S::KIND.as_str()))]
    pub async fn create_entity(
        &self,
        entity_id: &str,
        actor: &str,
    ) -> Result<EntityRecord, EngineError> {
        let initial = self.graph.initial();
        let created = self
            .store
            .create(S::KIND.as_str(), entity_id, initial.code())
            .await;

        let (outcome, version) = match &created {
            Ok(record) => (AuditOutcome::Success, Some(record.version)),
            Err(e) => (
                AuditOutcome::Failure {
                    reason: e.to_string(),
                },
                None,
            ),
        };
        self.record(AuditRecord {
            entity_kind: S::KIND.as_str().to_string(),
            entity_id: entity_id.to_string(),
            operation: CREATE_OPERATION.to_string(),
            from_state: None,
            to_state: initial.code().to_string(),
            actor: actor.to_string(),
            timestamp: OffsetDateTime::now_utc(),
            outcome,
            entity_version: version,
            notes: None,
        })
        .await;

        Ok(created?)
    }

    /// Current typed state and version of one entity.
    pub async fn current(&self, entity_id: &str) -> Result<(S, u64), EngineError> {
        let record = self.store.read(S::KIND.as_str(), entity_id).await?;
        Ok((self.graph.parse_state(&record.state)?, record.version))
    }

    /// Targets the entity could legally move to right now, ignoring
    /// permissions.
    pub async fn available_transitions(&self, entity_id: &str) -> Result<Vec<S>, EngineError> {
        let (state, _) = self.current(entity_id).await?;
        Ok(self.graph.allowed_transitions(state)?.iter().copied().collect())
    }

    /// Entities of this kind, optionally only those in `state`.
    pub async fn list(&self, state: Option<S>) -> Result<Vec<EntityRecord>, EngineError> {
        Ok(self
            .store
            .list(S::KIND.as_str(), state.map(S::code))
            .await?)
    }

    /// Number of entities in each declared state, zero counts included.
    pub async fn count_by_state(&self) -> Result<BTreeMap<S, usize>, EngineError> {
        let mut counts: BTreeMap<S, usize> = self.graph.states().map(|s| (s, 0)).collect();
        for record in self.list(None).await? {
            let state = self.graph.parse_state(&record.state)?;
            *counts.entry(state).or_default() += 1;
        }
        Ok(counts)
    }

    async fn record(&self, record: AuditRecord) {
        if let Err(e) = self.audit.append(record).await {
            error!(error = %e, "audit write failed, result unchanged");
        }
    }
}

/// `None` when the deadline elapsed first.
async fn with_deadline<T>(deadline: Option<Duration>, fut: impl Future<Output = T>) -> Option<T> {
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}
