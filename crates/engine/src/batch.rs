//! Applying one operation to many entities.
//!
//! Each ID becomes its own request against the [`TransitionExecutor`]. Items
//! never abort or roll back each other and the batch runner never retries;
//! the only retry is the executor's single conflict retry per item.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, instrument};

use crate::command::{CommandParams, CommandRequest, CommandResult};
use crate::config::EngineConfig;
use crate::executor::{TransitionExecutor, TransitionRequest, TransitionResult};
use crate::graph::StateCode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation<S> {
    /// Move every entity to `target`.
    Transition { target: S },
    /// Run a registered command on every entity.
    Command { name: String, params: CommandParams },
}

impl<S: StateCode> Operation<S> {
    pub fn name(&self) -> &str {
        match self {
            Operation::Transition { target } => target.code(),
            Operation::Command { name, .. } => name,
        }
    }
}

/// The per-item request minus the entity ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationTemplate<S> {
    pub operation: Operation<S>,
    pub reason: Option<String>,
    pub deadline: Option<Duration>,
}

impl<S> OperationTemplate<S> {
    pub fn transition(target: S) -> Self {
        Self {
            operation: Operation::Transition { target },
            reason: None,
            deadline: None,
        }
    }

    pub fn command(name: impl Into<String>) -> Self {
        Self {
            operation: Operation::Command {
                name: name.into(),
                params: CommandParams::new(),
            },
            reason: None,
            deadline: None,
        }
    }

    /// Add a command parameter. Ignored for transitions.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Operation::Command { params, .. } = &mut self.operation {
            params.insert(key.into(), value.into());
        }
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Deadline for each item, not for the batch as a whole.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSuccess {
    pub entity_id: String,
    /// State code after the operation.
    pub state: String,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub entity_id: String,
    pub reason: String,
}

/// Aggregate outcome of a batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOperationReport {
    total_count: usize,
    successes: Vec<BatchSuccess>,
    failures: Vec<BatchFailure>,
}

impl BatchOperationReport {
    fn from_outcomes(outcomes: Vec<Result<BatchSuccess, BatchFailure>>) -> Self {
        let mut report = Self {
            total_count: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome {
                Ok(success) => report.successes.push(success),
                Err(failure) => report.failures.push(failure),
            }
        }
        report
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn successes(&self) -> &[BatchSuccess] {
        &self.successes
    }

    pub fn failures(&self) -> &[BatchFailure] {
        &self.failures
    }

    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    pub fn success_ids(&self) -> Vec<&str> {
        self.successes.iter().map(|s| s.entity_id.as_str()).collect()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "succeeded {}, failed {}",
            self.success_count(),
            self.failed_count()
        )
    }
}

#[derive(Debug)]
pub struct BatchOperationRunner<S: StateCode> {
    executor: Arc<TransitionExecutor<S>>,
    concurrency: usize,
}

impl<S: StateCode> BatchOperationRunner<S> {
    /// A runner that executes items one at a time.
    pub fn new(executor: Arc<TransitionExecutor<S>>) -> Self {
        Self {
            executor,
            concurrency: 1,
        }
    }

    /// Allow up to `concurrency` items in flight. Values below 1 are raised
    /// to 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_config(self, config: &EngineConfig) -> Self {
        self.with_concurrency(config.batch_concurrency)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[instrument(
        skip(self, entity_ids, template),
        fields(
            kind = S::KIND.as_str(),
            operation = template.operation.name(),
            count = entity_ids.len(),
        )
    )]
    pub async fn run_batch<I: AsRef<str>>(
        &self,
        entity_ids: &[I],
        template: &OperationTemplate<S>,
        actor: &str,
    ) -> BatchOperationReport {
        let outcomes = stream::iter(entity_ids)
            .map(|id| self.run_item(id.as_ref(), template, actor))
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        let report = BatchOperationReport::from_outcomes(outcomes);
        info!(
            succeeded = report.success_count(),
            failed = report.failed_count(),
            "batch finished"
        );
        report
    }

    async fn run_item(
        &self,
        entity_id: &str,
        template: &OperationTemplate<S>,
        actor: &str,
    ) -> Result<BatchSuccess, BatchFailure> {
        let failure = |reason: String| BatchFailure {
            entity_id: entity_id.to_string(),
            reason,
        };
        let success = |state: S, version: u64| BatchSuccess {
            entity_id: entity_id.to_string(),
            state: state.code().to_string(),
            version,
        };

        match &template.operation {
            Operation::Transition { target } => {
                let mut request = TransitionRequest::new(entity_id, *target, actor);
                request.reason = template.reason.clone();
                request.deadline = template.deadline;
                match self.executor.execute(request).await {
                    Ok(TransitionResult::Success { state, version, .. }) => {
                        Ok(success(state, version))
                    }
                    Ok(TransitionResult::Rejected(rejection)) => Err(failure(rejection.reason())),
                    Err(e) => Err(failure(e.to_string())),
                }
            }
            Operation::Command { name, params } => {
                let mut request =
                    CommandRequest::new(entity_id, name.as_str(), actor).with_params(params.clone());
                request.reason = template.reason.clone();
                request.deadline = template.deadline;
                match self.executor.run_command(request).await {
                    Ok(CommandResult::Completed { state, version }) => Ok(success(state, version)),
                    Ok(CommandResult::Rejected(rejection)) => Err(failure(rejection.reason())),
                    Err(e) => Err(failure(e.to_string())),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_keeps_input_order_within_partitions() {
        let report = BatchOperationReport::from_outcomes(vec![
            Ok(BatchSuccess {
                entity_id: "a".to_string(),
                state: "CONFIRMED".to_string(),
                version: 2,
            }),
            Err(BatchFailure {
                entity_id: "b".to_string(),
                reason: "illegal transition".to_string(),
            }),
            Ok(BatchSuccess {
                entity_id: "c".to_string(),
                state: "CONFIRMED".to_string(),
                version: 5,
            }),
        ]);
        assert_eq!(report.total_count(), 3);
        assert_eq!(report.success_ids(), vec!["a", "c"]);
        assert_eq!(report.failures()[0].entity_id, "b");
        assert_eq!(report.summary(), "succeeded 2, failed 1");
        assert!(!report.is_complete_success());
    }

    #[test]
    fn empty_report() {
        let report = BatchOperationReport::from_outcomes(Vec::new());
        assert_eq!(report.total_count(), 0);
        assert_eq!(report.summary(), "succeeded 0, failed 0");
        assert!(report.is_complete_success());
    }

    #[test]
    fn params_only_attach_to_commands() {
        use crate::lifecycle::device::DeviceStatus;

        let t = OperationTemplate::transition(DeviceStatus::Online).with_param("version", "1");
        assert_eq!(
            t.operation,
            Operation::Transition {
                target: DeviceStatus::Online
            }
        );

        let c = OperationTemplate::<DeviceStatus>::command("push_firmware")
            .with_param("version", "2.4.1");
        match c.operation {
            Operation::Command { name, params } => {
                assert_eq!(name, "push_firmware");
                assert_eq!(params["version"], "2.4.1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
