//! Constants for the credcache service
//!
//! Defaults for every `CREDCACHE_*` environment variable read by
//! [`crate::ServiceConfig::from_env`].

use std::net::{IpAddr, Ipv4Addr};

// ============================================================================
// LISTENER
// ============================================================================

/// Default bind address
pub const DEFAULT_BIND: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Default listen port
pub const DEFAULT_PORT: u16 = 443;

/// Default PEM certificate chain for the TLS listener
pub const DEFAULT_TLS_CERT: &str = "creds/cert.server";

/// Default PEM private key for the TLS listener
pub const DEFAULT_TLS_KEY: &str = "creds/key.server";

// ============================================================================
// STORE
// ============================================================================

/// Default LMDB environment directory
pub const DEFAULT_DATA_DIR: &str = "data/creds.db";

/// Default LMDB map size in megabytes
pub const DEFAULT_MAP_SIZE_MB: usize = 64;

// ============================================================================
// SERVING
// ============================================================================

/// Delay applied before answering a lookup for an unknown name (3 seconds)
pub const DEFAULT_NOT_FOUND_DELAY_MS: u64 = 3000;

/// Per-request timeout at the HTTP layer
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Timeout applied to each call the HTTP authority client makes
pub const DEFAULT_AUTHORITY_TIMEOUT_SECS: u64 =
    credcache_authority::DEFAULT_REQUEST_TIMEOUT.as_secs();

// ============================================================================
// LOGGING
// ============================================================================

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "credcache_api=debug,credcache_sync=info,tower_http=info,info";
