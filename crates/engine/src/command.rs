//! Commands: operations that run against an entity in a given state without
//! moving it along its lifecycle (device reboot, firmware push).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::executor::Rejection;
use crate::graph::StateCode;
use crate::lifecycle::EntityKind;

/// Free-form command arguments, e.g. `version = "2.4.1"` for a firmware push.
pub type CommandParams = BTreeMap<String, String>;

/// A named command and the lifecycle states it may run in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec<S: StateCode> {
    pub name: &'static str,
    pub allowed_states: Vec<S>,
}

impl<S: StateCode> CommandSpec<S> {
    pub fn new(name: &'static str, allowed_states: &[S]) -> Self {
        Self {
            name,
            allowed_states: allowed_states.to_vec(),
        }
    }

    pub fn permits(&self, state: S) -> bool {
        self.allowed_states.contains(&state)
    }

    /// Comma-separated codes of the allowed states, for rejection messages.
    pub fn required_states(&self) -> String {
        self.allowed_states
            .iter()
            .map(|s| s.code())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One command invocation against one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub entity_id: String,
    pub command: String,
    pub actor: String,
    pub params: CommandParams,
    pub reason: Option<String>,
    pub deadline: Option<Duration>,
}

impl CommandRequest {
    pub fn new(
        entity_id: impl Into<String>,
        command: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            command: command.into(),
            actor: actor.into(),
            params: CommandParams::new(),
            reason: None,
            deadline: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: CommandParams) -> Self {
        self.params = params;
        self
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

/// Outcome of a command. State and version are unchanged on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandResult<S> {
    Completed { state: S, version: u64 },
    Rejected(Rejection),
}

impl<S> CommandResult<S> {
    pub fn is_completed(&self) -> bool {
        matches!(self, CommandResult::Completed { .. })
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            CommandResult::Completed { .. } => None,
            CommandResult::Rejected(r) => Some(r),
        }
    }
}

/// Error reported by the external system a command is dispatched to.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct DispatchError(pub String);

/// Outbound seam to whatever actually performs a command (a device API).
#[async_trait]
pub trait CommandDispatcher: Send + Sync + 'static {
    async fn dispatch(
        &self,
        kind: EntityKind,
        entity_id: &str,
        command: &str,
        params: &CommandParams,
    ) -> Result<(), DispatchError>;
}

/// Dispatcher that accepts every command. Used when commands are recorded but
/// carried out elsewhere, and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDispatcher;

#[async_trait]
impl CommandDispatcher for NoopDispatcher {
    async fn dispatch(
        &self,
        _kind: EntityKind,
        _entity_id: &str,
        _command: &str,
        _params: &CommandParams,
    ) -> Result<(), DispatchError> {
        Ok(())
    }
}
