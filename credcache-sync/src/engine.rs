//! Synchronization engine.
//!
//! One engine runs per credential class. It owns exclusive write access to
//! that class's collection and converges it towards the authority's index:
//!
//! 1. Init: authenticate, resolve the acting identity and rebuild the
//!    inventory snapshot from the store. Failure here is fatal.
//! 2. Poll: every `poll_interval`, query the index version. An unchanged
//!    version means no work.
//! 3. Reconcile: on a new version, fetch the index, diff it against the
//!    snapshot and apply the plan (write new or changed entries, carry
//!    unchanged ones, delete vanished ones).
//!
//! Transient failures never stop the engine. A failed fetch or store write
//! leaves the affected credential as it was and is retried on the next poll.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use credcache_core::{
    Authority, CacheEntry, CredentialDescriptor, CredentialSchema, InventorySnapshot,
};
use credcache_storage::CacheStore;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::metrics::SyncMetrics;
use crate::reconcile::{plan, Step};

// ============================================================================
// OUTCOMES
// ============================================================================

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The index version matched the last reconciled version.
    Unchanged,
    /// The index version query failed.
    VersionUnavailable,
    /// The index fetch failed.
    IndexUnavailable,
    /// A reconciliation pass ran.
    Reconciled(ReconcileReport),
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub index_version: i64,
    pub written: u64,
    pub carried: u64,
    pub deleted: u64,
    /// Credentials whose fetch, extraction, write or delete failed.
    pub failed: u64,
}

// ============================================================================
// ENGINE
// ============================================================================

/// A configured, not yet initialized synchronization engine for one class.
pub struct SyncEngine<A: Authority, S: CacheStore> {
    schema: &'static CredentialSchema,
    authority: Arc<A>,
    store: Arc<S>,
    config: SyncConfig,
    metrics: Arc<SyncMetrics>,
}

impl<A: Authority, S: CacheStore> SyncEngine<A, S> {
    /// Create an engine for `schema`. The schema is validated here.
    pub fn new(
        schema: &'static CredentialSchema,
        authority: Arc<A>,
        store: Arc<S>,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        schema.validate()?;
        Ok(Self {
            schema,
            authority,
            store,
            config,
            metrics: Arc::new(SyncMetrics::new(schema.class)),
        })
    }

    pub fn schema(&self) -> &'static CredentialSchema {
        self.schema
    }

    /// Shared handle to this engine's counters.
    pub fn metrics(&self) -> Arc<SyncMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Authenticate, resolve the identity and rebuild the snapshot.
    pub async fn init(self) -> SyncResult<SyncWorker<A, S>> {
        let class = self.schema.class;

        let session = self
            .authority
            .authenticate(&self.config.identity_file)
            .await
            .map_err(|source| SyncError::Authentication { class, source })?;

        let identity = self
            .authority
            .resolve_identity(&session)
            .await
            .map_err(|source| SyncError::Identity { class, source })?;

        tracing::info!(class = %class, identity = %identity, "Authenticated with authority");

        let cached = self
            .store
            .list_identities(self.schema)
            .map_err(|source| SyncError::Inventory { class, source })?;

        for (name, version) in &cached {
            tracing::debug!(class = %class, name = %name, version = %version, "credential is cached");
        }

        let snapshot: InventorySnapshot = cached.into_iter().collect();
        tracing::info!(class = %class, cached = snapshot.len(), "Inventory rebuilt");

        Ok(SyncWorker {
            schema: self.schema,
            authority: self.authority,
            store: self.store,
            config: self.config,
            metrics: self.metrics,
            session,
            identity,
            snapshot,
            last_index_version: None,
        })
    }

    /// Initialize and run until shutdown.
    ///
    /// Returns an error only if initialization fails.
    pub async fn start(self, shutdown_rx: watch::Receiver<bool>) -> SyncResult<()> {
        let worker = self.init().await?;
        worker.run(shutdown_rx).await;
        Ok(())
    }
}

/// An initialized engine holding a live session and the inventory snapshot.
pub struct SyncWorker<A: Authority, S: CacheStore> {
    schema: &'static CredentialSchema,
    authority: Arc<A>,
    store: Arc<S>,
    config: SyncConfig,
    metrics: Arc<SyncMetrics>,
    session: A::Session,
    identity: String,
    snapshot: InventorySnapshot,
    last_index_version: Option<i64>,
}

impl<A: Authority, S: CacheStore> SyncWorker<A, S> {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The inventory snapshot as of the last completed pass.
    pub fn snapshot(&self) -> &InventorySnapshot {
        &self.snapshot
    }

    /// Last index version fully reconciled without per-credential failures.
    pub fn last_index_version(&self) -> Option<i64> {
        self.last_index_version
    }

    pub fn metrics(&self) -> Arc<SyncMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Poll on a fixed delay until the shutdown signal is received.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let class = self.schema.class;
        let mut poll_interval = interval(self.config.poll_interval);
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            class = %class,
            poll_interval_secs = self.config.poll_interval.as_secs_f64(),
            "Sync engine started"
        );

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    // A dropped sender also means shutdown.
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!(class = %class, "Sync engine shutting down");
                        break;
                    }
                }

                _ = poll_interval.tick() => {
                    self.poll_once().await;
                }
            }
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            class = %class,
            polls = snapshot.polls,
            reconciliations = snapshot.reconciliations,
            written = snapshot.written,
            deleted = snapshot.deleted,
            "Sync engine stopped"
        );
    }

    /// Run one poll: query the version and reconcile if it changed.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let class = self.schema.class;
        self.metrics.polls.fetch_add(1, Ordering::Relaxed);

        let version = match self
            .authority
            .get_index_version(&self.session, &self.identity)
            .await
        {
            Ok(version) => version,
            Err(e) => {
                tracing::warn!(class = %class, error = %e, "Sync error (index version)");
                self.metrics.poll_failures.fetch_add(1, Ordering::Relaxed);
                return PollOutcome::VersionUnavailable;
            }
        };

        if self.last_index_version == Some(version) {
            tracing::trace!(class = %class, version, "Index unchanged");
            return PollOutcome::Unchanged;
        }

        tracing::info!(class = %class, version, "index updated");

        let index = match self
            .authority
            .get_index(&self.session, &self.identity)
            .await
        {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(class = %class, error = %e, "Sync error (index)");
                self.metrics.poll_failures.fetch_add(1, Ordering::Relaxed);
                return PollOutcome::IndexUnavailable;
            }
        };

        PollOutcome::Reconciled(self.reconcile(version, &index).await)
    }

    /// Apply one reconciliation pass against `index`.
    async fn reconcile(&mut self, version: i64, index: &[CredentialDescriptor]) -> ReconcileReport {
        let class = self.schema.class;
        let mut report = ReconcileReport {
            index_version: version,
            ..ReconcileReport::default()
        };
        let mut next = InventorySnapshot::new();

        let plan = plan(self.schema, &self.snapshot, index);

        for step in &plan.steps {
            match *step {
                Step::Carry { name, version } => {
                    next.insert(name, version);
                    report.carried += 1;
                }
                Step::Fetch {
                    descriptor,
                    previous,
                } => match self.refresh(descriptor).await {
                    Some((name, version)) => {
                        next.insert(name, version);
                        report.written += 1;
                    }
                    None => {
                        // The store still holds the previous entry, if any.
                        if let (Some(name), Some(previous)) = (descriptor.name(), previous) {
                            next.insert(name, previous);
                        }
                        report.failed += 1;
                    }
                },
            }
        }

        for &(name, cached_version) in &plan.deletions {
            match self.store.delete(self.schema, name) {
                Ok(_) => {
                    tracing::info!(class = %class, name = %name, "credential deleted");
                    report.deleted += 1;
                }
                Err(e) => {
                    tracing::error!(class = %class, name = %name, error = %e, "Failed to delete credential");
                    self.metrics.store_failures.fetch_add(1, Ordering::Relaxed);
                    next.insert(name, cached_version);
                    report.failed += 1;
                }
            }
        }

        self.snapshot = next;

        self.metrics.carried.fetch_add(report.carried, Ordering::Relaxed);
        self.metrics.written.fetch_add(report.written, Ordering::Relaxed);
        self.metrics.deleted.fetch_add(report.deleted, Ordering::Relaxed);

        // Any per-credential failure leaves this version unrecorded so the
        // next poll reconciles again even if the index has not moved.
        if report.failed == 0 {
            self.last_index_version = Some(version);
            self.metrics.record_pass(Some(version));
        } else {
            self.metrics.record_pass(None);
        }

        if report.written > 0 || report.deleted > 0 || report.failed > 0 {
            tracing::info!(
                class = %class,
                index_version = version,
                written = report.written,
                carried = report.carried,
                deleted = report.deleted,
                failed = report.failed,
                "Reconciliation pass completed"
            );
        } else {
            tracing::debug!(class = %class, index_version = version, "Reconciliation pass completed with no changes");
        }

        report
    }

    /// Fetch, extract and write one credential. Returns its name and new
    /// marker on success.
    async fn refresh(&self, descriptor: &CredentialDescriptor) -> Option<(String, String)> {
        let class = self.schema.class;

        let payloads = match self
            .authority
            .fetch_payloads(&self.session, descriptor, self.schema.payload_kind)
            .await
        {
            Ok(payloads) => payloads,
            Err(e) => {
                tracing::warn!(
                    class = %class,
                    name = descriptor.name().unwrap_or_default(),
                    error = %e,
                    "Payload error"
                );
                self.metrics.fetch_failures.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let entry = match CacheEntry::extract(self.schema, descriptor, &payloads) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(
                    class = %class,
                    name = descriptor.name().unwrap_or_default(),
                    error = %e,
                    "Incomplete credential, skipping"
                );
                self.metrics.fetch_failures.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if let Err(e) = self.store.write_entry(self.schema, &entry) {
            tracing::error!(
                class = %class,
                name = %entry.name(),
                error = %e,
                "Failed to write credential"
            );
            self.metrics.store_failures.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        tracing::info!(
            class = %class,
            name = %entry.name(),
            version = %entry.version(),
            "credential written"
        );
        Some((entry.name().to_string(), entry.version().to_string()))
    }
}
