use std::sync::Arc;

use px_common::{PoolKind, PoolSettings, StrategyConfig};

use super::{TaskPool, WorkerPool};
use crate::error::PoolError;

/// Service that creates pools on request.
pub trait PoolFactory: Send + Sync {
    /// Create a pool of `kind`. `concurrency_limit` overrides the configured
    /// concurrency for that kind.
    fn new_pool(
        &self,
        kind: PoolKind,
        name: &str,
        concurrency_limit: Option<usize>,
    ) -> Result<Arc<dyn WorkerPool>, PoolError>;
}

/// Creates `TaskPool`s sized from a `StrategyConfig`.
#[derive(Debug, Clone, Default)]
pub struct TokioPoolFactory {
    config: StrategyConfig,
}

impl TokioPoolFactory {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }
}

impl PoolFactory for TokioPoolFactory {
    fn new_pool(
        &self,
        kind: PoolKind,
        name: &str,
        concurrency_limit: Option<usize>,
    ) -> Result<Arc<dyn WorkerPool>, PoolError> {
        let settings = match concurrency_limit {
            Some(limit) => PoolSettings::new(limit),
            None => self.config.pool_settings(kind).clone(),
        };
        Ok(Arc::new(TaskPool::new(name, kind, &settings)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_limit_overrides_configured_concurrency() {
        let factory = TokioPoolFactory::default();

        let configured = factory.new_pool(PoolKind::Blocking, "configured", None).unwrap();
        assert_eq!(configured.stats().unwrap().concurrency, 64);

        let limited = factory.new_pool(PoolKind::Blocking, "limited", Some(5)).unwrap();
        let stats = limited.stats().unwrap();
        assert_eq!(stats.concurrency, 5);
        assert_eq!(stats.kind, PoolKind::Blocking);
    }
}
