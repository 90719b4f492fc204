//! Permission checks in front of every transition and command.
//!
//! [`TransitionGuard`] turns the answer of an external
//! [`AuthorizationProvider`] into an [`Authorization`] verdict. It never
//! mutates anything and never fails: a provider error is a denial.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::{ConfigError, RolePolicyConfig};
use crate::graph::StateCode;
use crate::lifecycle::EntityKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Allow,
    Deny(String),
}

impl Authorization {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Authorization::Allow)
    }
}

/// The authorization collaborator could not answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct AuthorizationError(pub String);

/// Outbound seam to whoever decides who may do what.
///
/// States are passed as their persisted codes so implementations do not need
/// to know the engine's typed state enums.
#[async_trait]
pub trait AuthorizationProvider: Send + Sync + 'static {
    async fn has_permission(
        &self,
        actor: &str,
        kind: EntityKind,
        entity_id: &str,
        from: &str,
        to: &str,
    ) -> Result<bool, AuthorizationError>;

    async fn has_command_permission(
        &self,
        actor: &str,
        kind: EntityKind,
        entity_id: &str,
        state: &str,
        command: &str,
    ) -> Result<bool, AuthorizationError>;
}

#[derive(Clone)]
pub struct TransitionGuard {
    provider: Arc<dyn AuthorizationProvider>,
}

impl std::fmt::Debug for TransitionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionGuard").finish_non_exhaustive()
    }
}

impl TransitionGuard {
    pub fn new(provider: Arc<dyn AuthorizationProvider>) -> Self {
        Self { provider }
    }

    /// A guard that lets every actor do everything.
    pub fn allow_all() -> Self {
        Self::new(Arc::new(AllowAll))
    }

    pub async fn authorize<S: StateCode>(
        &self,
        actor: &str,
        entity_id: &str,
        from: S,
        to: S,
    ) -> Authorization {
        let kind = S::KIND;
        match self
            .provider
            .has_permission(actor, kind, entity_id, from.code(), to.code())
            .await
        {
            Ok(true) => Authorization::Allow,
            Ok(false) => Authorization::Deny(format!(
                "actor '{actor}' is not permitted to move {kind} {entity_id} from {from} to {to}"
            )),
            Err(e) => {
                warn!(%kind, entity_id, actor, error = %e, "authorization check failed");
                Authorization::Deny(format!("authorization check failed: {e}"))
            }
        }
    }

    pub async fn authorize_command<S: StateCode>(
        &self,
        actor: &str,
        entity_id: &str,
        state: S,
        command: &str,
    ) -> Authorization {
        let kind = S::KIND;
        match self
            .provider
            .has_command_permission(actor, kind, entity_id, state.code(), command)
            .await
        {
            Ok(true) => Authorization::Allow,
            Ok(false) => Authorization::Deny(format!(
                "actor '{actor}' is not permitted to run {command} on {kind} {entity_id}"
            )),
            Err(e) => {
                warn!(%kind, entity_id, actor, command, error = %e, "authorization check failed");
                Authorization::Deny(format!("authorization check failed: {e}"))
            }
        }
    }
}

/// Grants everything. For trusted internal callers and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl AuthorizationProvider for AllowAll {
    async fn has_permission(
        &self,
        _actor: &str,
        _kind: EntityKind,
        _entity_id: &str,
        _from: &str,
        _to: &str,
    ) -> Result<bool, AuthorizationError> {
        Ok(true)
    }

    async fn has_command_permission(
        &self,
        _actor: &str,
        _kind: EntityKind,
        _entity_id: &str,
        _state: &str,
        _command: &str,
    ) -> Result<bool, AuthorizationError> {
        Ok(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RuleAction {
    Transition { from: Option<String>, to: String },
    Command(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RoleRule {
    kind: EntityKind,
    action: RuleAction,
    roles: BTreeSet<String>,
}

/// Role table: actors hold roles, rules say which roles may perform an
/// operation.
///
/// When at least one rule matches an operation the actor needs a role from
/// one of the matching rules. Operations no rule mentions fall back to
/// `default_allow`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePolicy {
    default_allow: bool,
    actors: BTreeMap<String, BTreeSet<String>>,
    rules: Vec<RoleRule>,
}

impl RolePolicy {
    pub fn from_config(config: &RolePolicyConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let actors = config
            .actors
            .iter()
            .map(|(actor, roles)| (actor.clone(), roles.iter().cloned().collect()))
            .collect();

        let mut rules = Vec::with_capacity(config.rules.len());
        for rule in &config.rules {
            let action = match (&rule.to, &rule.command) {
                (Some(to), None) => RuleAction::Transition {
                    from: rule.from.clone(),
                    to: to.clone(),
                },
                (None, Some(command)) => RuleAction::Command(command.clone()),
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "{} rule needs exactly one of 'to' or 'command'",
                        rule.kind
                    )))
                }
            };
            rules.push(RoleRule {
                kind: rule.kind,
                action,
                roles: rule.roles.iter().cloned().collect(),
            });
        }

        Ok(Self {
            default_allow: config.default_allow,
            actors,
            rules,
        })
    }

    fn decide<'a>(&self, actor: &str, matching: impl Iterator<Item = &'a RoleRule>) -> bool {
        let held = self.actors.get(actor);
        let mut any_rule = false;
        for rule in matching {
            any_rule = true;
            if held.is_some_and(|roles| !roles.is_disjoint(&rule.roles)) {
                return true;
            }
        }
        !any_rule && self.default_allow
    }
}

#[async_trait]
impl AuthorizationProvider for RolePolicy {
    async fn has_permission(
        &self,
        actor: &str,
        kind: EntityKind,
        _entity_id: &str,
        from: &str,
        to: &str,
    ) -> Result<bool, AuthorizationError> {
        let matching = self.rules.iter().filter(|rule| {
            rule.kind == kind
                && matches!(
                    &rule.action,
                    RuleAction::Transition { from: f, to: t }
                        if t == to && f.as_deref().map_or(true, |f| f == from)
                )
        });
        Ok(self.decide(actor, matching))
    }

    async fn has_command_permission(
        &self,
        actor: &str,
        kind: EntityKind,
        _entity_id: &str,
        _state: &str,
        command: &str,
    ) -> Result<bool, AuthorizationError> {
        let matching = self.rules.iter().filter(|rule| {
            rule.kind == kind && matches!(&rule.action, RuleAction::Command(c) if c == command)
        });
        Ok(self.decide(actor, matching))
    }
}
