use std::sync::Arc;

use lifecycle_storage::{AuditSink, VersionedEntityStore};

use crate::batch::BatchOperationRunner;
use crate::command::CommandDispatcher;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::executor::TransitionExecutor;
use crate::graph::StateCode;
use crate::guard::{RolePolicy, TransitionGuard};
use crate::lifecycle::device::{device_commands, device_graph, DeviceStatus};
use crate::lifecycle::news::{news_graph, NewsStatus};
use crate::lifecycle::order::{order_graph, OrderStatus};

/// The three built-in lifecycles wired to one store, one audit sink and one
/// guard.
#[derive(Debug)]
pub struct LifecycleEngine {
    pub orders: Arc<TransitionExecutor<OrderStatus>>,
    pub devices: Arc<TransitionExecutor<DeviceStatus>>,
    pub news: Arc<TransitionExecutor<NewsStatus>>,
    config: EngineConfig,
}

impl LifecycleEngine {
    /// Build from `config`. The guard is the configured role table, or
    /// [`AllowAll`](crate::guard::AllowAll) when the config has no
    /// `[authorization]` section.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn VersionedEntityStore>,
        audit: Arc<dyn AuditSink>,
        dispatcher: Arc<dyn CommandDispatcher>,
    ) -> Result<Self, EngineError> {
        let guard = match &config.authorization {
            Some(table) => TransitionGuard::new(Arc::new(RolePolicy::from_config(table)?)),
            None => TransitionGuard::allow_all(),
        };
        Self::with_guard(config, store, audit, dispatcher, guard)
    }

    pub fn with_guard(
        config: EngineConfig,
        store: Arc<dyn VersionedEntityStore>,
        audit: Arc<dyn AuditSink>,
        dispatcher: Arc<dyn CommandDispatcher>,
        guard: TransitionGuard,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let orders = TransitionExecutor::new(
            order_graph()?,
            store.clone(),
            guard.clone(),
            audit.clone(),
        )
        .with_config(&config);
        let devices = TransitionExecutor::new(
            device_graph()?,
            store.clone(),
            guard.clone(),
            audit.clone(),
        )
        .with_commands(dispatcher, device_commands())
        .with_config(&config);
        let news = TransitionExecutor::new(news_graph()?, store, guard, audit).with_config(&config);

        Ok(Self {
            orders: Arc::new(orders),
            devices: Arc::new(devices),
            news: Arc::new(news),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn order_batch(&self) -> BatchOperationRunner<OrderStatus> {
        self.batch(&self.orders)
    }

    pub fn device_batch(&self) -> BatchOperationRunner<DeviceStatus> {
        self.batch(&self.devices)
    }

    pub fn news_batch(&self) -> BatchOperationRunner<NewsStatus> {
        self.batch(&self.news)
    }

    fn batch<S: StateCode>(&self, executor: &Arc<TransitionExecutor<S>>) -> BatchOperationRunner<S> {
        BatchOperationRunner::new(executor.clone()).with_config(&self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::NoopDispatcher;
    use lifecycle_storage::{MemoryAuditLog, MemoryEntityStore};

    #[test]
    fn batch_runners_inherit_configured_concurrency() {
        let config = EngineConfig::from_toml_str("batch_concurrency = 6").unwrap();
        let engine = LifecycleEngine::new(
            config,
            Arc::new(MemoryEntityStore::new()),
            Arc::new(MemoryAuditLog::new()),
            Arc::new(NoopDispatcher),
        )
        .unwrap();
        assert_eq!(engine.order_batch().concurrency(), 6);
        assert_eq!(engine.news_batch().concurrency(), 6);
        assert!(engine.devices.command("reboot").is_some());
        assert!(engine.orders.command("reboot").is_none());
    }

    #[test]
    fn invalid_config_is_refused() {
        let config = EngineConfig {
            batch_concurrency: 0,
            ..EngineConfig::default()
        };
        let err = LifecycleEngine::new(
            config,
            Arc::new(MemoryEntityStore::new()),
            Arc::new(MemoryAuditLog::new()),
            Arc::new(NoopDispatcher),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
