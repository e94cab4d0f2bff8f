//! credcache Sync - keeps the local cache converged with the authority.
//!
//! A single generic [`SyncEngine`] is parameterized by a static
//! [`credcache_core::CredentialSchema`]; the service starts one per class.

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod reconcile;

pub use config::{SyncConfig, DEFAULT_IDENTITY_FILE, DEFAULT_POLL_INTERVAL_SECS};
pub use engine::{PollOutcome, ReconcileReport, SyncEngine, SyncWorker};
pub use error::{SyncError, SyncResult};
pub use metrics::{SyncMetrics, SyncSnapshot};
pub use reconcile::{plan, ReconcilePlan, Step};
