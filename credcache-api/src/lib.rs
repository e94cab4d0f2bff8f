//! credcache API - credential lookup service
//!
//! Serves credentials mirrored into the local LMDB cache by the
//! synchronization engines. Lookups never reach the authority: a request is
//! answered from the cache or not at all.

pub mod config;
pub mod constants;
pub mod engines;
pub mod error;
pub mod routes;
pub mod server;
pub mod serving;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::{ConfigError, ServiceConfig, ServingConfig, TlsPaths};
pub use engines::EngineSet;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_router;
pub use serving::{CredentialRecord, CredentialService};
pub use state::AppState;
