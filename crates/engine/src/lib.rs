//! Permission-gated status lifecycles for orders, managed devices and news
//! articles.
//!
//! A [`StateGraph`] says which moves are legal, a [`TransitionGuard`] says who
//! may make them, and a [`TransitionExecutor`] applies them through the
//! store's compare-and-swap and leaves one audit record per attempt.
//! [`BatchOperationRunner`] fans one operation out over many entities and
//! reports per-item outcomes.

pub mod batch;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod guard;
pub mod lifecycle;

pub use batch::{
    BatchFailure, BatchOperationReport, BatchOperationRunner, BatchSuccess, Operation,
    OperationTemplate,
};
pub use command::{
    CommandDispatcher, CommandParams, CommandRequest, CommandResult, CommandSpec, DispatchError,
    NoopDispatcher,
};
pub use config::{ConfigError, EngineConfig, RolePolicyConfig, RoleRuleConfig};
pub use engine::LifecycleEngine;
pub use error::EngineError;
pub use executor::{Rejection, TransitionExecutor, TransitionRequest, TransitionResult};
pub use graph::{GraphError, StateCode, StateGraph, StateGraphBuilder, UnknownStateError};
pub use guard::{
    AllowAll, Authorization, AuthorizationError, AuthorizationProvider, RolePolicy,
    TransitionGuard,
};
pub use lifecycle::device::DeviceStatus;
pub use lifecycle::news::NewsStatus;
pub use lifecycle::order::OrderStatus;
pub use lifecycle::EntityKind;
