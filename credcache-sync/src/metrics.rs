//! Per-engine counters.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use credcache_core::CredentialClass;
use serde::Serialize;

/// Sentinel stored before any index version has been recorded.
const NO_VERSION: i64 = i64::MIN;

/// Counters for one synchronization engine.
#[derive(Debug)]
pub struct SyncMetrics {
    class: CredentialClass,

    /// Index version polls attempted
    pub polls: AtomicU64,

    /// Polls where the version query or index fetch failed
    pub poll_failures: AtomicU64,

    /// Reconciliation passes completed
    pub reconciliations: AtomicU64,

    /// Credentials written (added or updated)
    pub written: AtomicU64,

    /// Credentials deleted
    pub deleted: AtomicU64,

    /// Credentials carried forward without a fetch
    pub carried: AtomicU64,

    /// Payload fetches that failed or returned an incomplete set
    pub fetch_failures: AtomicU64,

    /// Store writes or deletes that failed
    pub store_failures: AtomicU64,

    last_index_version: AtomicI64,
    reconciled: AtomicBool,
}

impl SyncMetrics {
    pub fn new(class: CredentialClass) -> Self {
        Self {
            class,
            polls: AtomicU64::new(0),
            poll_failures: AtomicU64::new(0),
            reconciliations: AtomicU64::new(0),
            written: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
            carried: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            last_index_version: AtomicI64::new(NO_VERSION),
            reconciled: AtomicBool::new(false),
        }
    }

    pub fn class(&self) -> CredentialClass {
        self.class
    }

    pub(crate) fn record_pass(&self, index_version: Option<i64>) {
        self.reconciliations.fetch_add(1, Ordering::Relaxed);
        if let Some(version) = index_version {
            self.last_index_version.store(version, Ordering::Relaxed);
        }
        self.reconciled.store(true, Ordering::Release);
    }

    /// Whether at least one reconciliation pass has completed.
    pub fn has_reconciled(&self) -> bool {
        self.reconciled.load(Ordering::Acquire)
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> SyncSnapshot {
        let last = self.last_index_version.load(Ordering::Relaxed);
        SyncSnapshot {
            class: self.class,
            polls: self.polls.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
            reconciliations: self.reconciliations.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            carried: self.carried.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            last_index_version: (last != NO_VERSION).then_some(last),
            reconciled: self.has_reconciled(),
        }
    }
}

/// Snapshot of engine metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSnapshot {
    pub class: CredentialClass,
    pub polls: u64,
    pub poll_failures: u64,
    pub reconciliations: u64,
    pub written: u64,
    pub deleted: u64,
    pub carried: u64,
    pub fetch_failures: u64,
    pub store_failures: u64,
    pub last_index_version: Option<i64>,
    pub reconciled: bool,
}
