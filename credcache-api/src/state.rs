//! Shared application state for the Axum router.

use std::sync::Arc;
use std::time::Instant;

use credcache_core::CredentialSchema;
use credcache_storage::CacheStore;
use credcache_sync::SyncMetrics;

use crate::config::ServingConfig;
use crate::serving::CredentialService;

/// State shared by every request handler.
pub struct AppState<S: CacheStore> {
    /// One lookup service per credential class, in dispatch order.
    pub services: Arc<[CredentialService<S>]>,
    pub store: Arc<S>,
    /// Counters of the running synchronization engines.
    pub engines: Arc<[Arc<SyncMetrics>]>,
    pub serving: ServingConfig,
    pub start_time: Instant,
}

impl<S: CacheStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            services: Arc::clone(&self.services),
            store: Arc::clone(&self.store),
            engines: Arc::clone(&self.engines),
            serving: self.serving,
            start_time: self.start_time,
        }
    }
}

impl<S: CacheStore> AppState<S> {
    /// Build one lookup service per schema over a shared store.
    pub fn new(
        store: Arc<S>,
        schemas: &[&'static CredentialSchema],
        serving: ServingConfig,
    ) -> Self {
        let services = schemas
            .iter()
            .map(|&schema| CredentialService::new(schema, Arc::clone(&store), serving.not_found_delay))
            .collect();

        Self {
            services,
            store,
            engines: Arc::from(Vec::new()),
            serving,
            start_time: Instant::now(),
        }
    }

    /// Attach engine counters for readiness reporting.
    pub fn with_engines(mut self, engines: Vec<Arc<SyncMetrics>>) -> Self {
        self.engines = engines.into();
        self
    }

    /// Find the service whose route prefix starts `path`, and the remainder.
    pub fn route<'p>(&self, path: &'p str) -> Option<(&CredentialService<S>, &'p str)> {
        self.services.iter().find_map(|service| {
            path.strip_prefix(service.schema().route_prefix)
                .map(|rest| (service, rest))
        })
    }
}
