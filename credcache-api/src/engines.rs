//! Synchronization engine supervision.
//!
//! One engine task is spawned per credential class. The service watches the
//! set: an engine that exits with an error (failed initialization) or panics
//! is fatal for the whole process.

use std::sync::Arc;

use credcache_core::{Authority, CredentialClass, CredentialSchema};
use credcache_storage::CacheStore;
use credcache_sync::{SyncConfig, SyncEngine, SyncMetrics};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::error::{ApiError, ApiResult};

/// The running engines of the service.
pub struct EngineSet {
    metrics: Vec<Arc<SyncMetrics>>,
    tasks: JoinSet<(CredentialClass, credcache_sync::SyncResult<()>)>,
}

impl EngineSet {
    /// Validate every schema and spawn one engine per schema.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<A, S>(
        schemas: &[&'static CredentialSchema],
        authority: Arc<A>,
        store: Arc<S>,
        config: &SyncConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> ApiResult<Self>
    where
        A: Authority + 'static,
        S: CacheStore + 'static,
    {
        // Build every engine before spawning any, so a bad schema starts nothing.
        let engines = schemas
            .iter()
            .map(|&schema| {
                SyncEngine::new(schema, Arc::clone(&authority), Arc::clone(&store), config.clone())
                    .map_err(|e| ApiError::internal_error(format!("Invalid schema: {}", e)))
            })
            .collect::<ApiResult<Vec<_>>>()?;

        let mut metrics = Vec::with_capacity(engines.len());
        let mut tasks = JoinSet::new();

        for engine in engines {
            let class = engine.schema().class;
            metrics.push(engine.metrics());
            let shutdown_rx = shutdown_rx.clone();
            tasks.spawn(async move { (class, engine.start(shutdown_rx).await) });
            tracing::debug!(class = %class, "Sync engine spawned");
        }

        Ok(Self { metrics, tasks })
    }

    /// Counters of every engine, in spawn order.
    pub fn metrics(&self) -> Vec<Arc<SyncMetrics>> {
        self.metrics.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for the next engine to exit.
    ///
    /// Returns `None` when no engines remain, `Ok(class)` for an engine that
    /// stopped on shutdown, and an error for one that failed.
    pub async fn join_next(&mut self) -> Option<ApiResult<CredentialClass>> {
        let joined = self.tasks.join_next().await?;
        Some(match joined {
            Ok((class, Ok(()))) => Ok(class),
            Ok((class, Err(e))) => {
                tracing::error!(class = %class, error = %e, "Sync engine failed");
                Err(ApiError::internal_error(format!(
                    "Sync engine for {} failed: {}",
                    class, e
                )))
            }
            Err(e) => {
                tracing::error!(error = %e, "Sync engine task aborted");
                Err(ApiError::internal_error(format!("Sync engine task aborted: {}", e)))
            }
        })
    }

    /// Wait for every remaining engine to exit, returning the first failure.
    pub async fn join_all(mut self) -> ApiResult<()> {
        let mut first_error = None;
        while let Some(result) = self.join_next().await {
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
