//! Service Configuration
//!
//! Everything the `credcache` binary needs is read from `CREDCACHE_*`
//! environment variables. Only the authority URL is required; every other
//! setting has a default in [`crate::constants`].

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use credcache_sync::SyncConfig;

use crate::constants::{
    DEFAULT_AUTHORITY_TIMEOUT_SECS, DEFAULT_BIND, DEFAULT_DATA_DIR, DEFAULT_MAP_SIZE_MB,
    DEFAULT_NOT_FOUND_DELAY_MS, DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TLS_CERT,
    DEFAULT_TLS_KEY,
};

/// Configuration errors. All are fatal at startup.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

// ============================================================================
// SERVING CONFIGURATION
// ============================================================================

/// Request-time behavior of the lookup endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServingConfig {
    /// Delay before answering a lookup for a missing credential
    pub not_found_delay: Duration,

    /// Upper bound on the whole request at the HTTP layer
    pub request_timeout: Duration,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            not_found_delay: Duration::from_millis(DEFAULT_NOT_FOUND_DELAY_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ServingConfig {
    pub fn with_not_found_delay(mut self, delay: Duration) -> Self {
        self.not_found_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// PEM files for the TLS listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

// ============================================================================
// SERVICE CONFIGURATION
// ============================================================================

/// Full configuration of the credcache service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,

    /// LMDB environment directory
    pub data_dir: PathBuf,
    pub map_size_mb: usize,

    /// Base URL of the credential authority
    pub authority_url: String,
    pub authority_timeout: Duration,

    /// `None` serves plain HTTP.
    pub tls: Option<TlsPaths>,

    pub serving: ServingConfig,
    pub sync: SyncConfig,
}

impl ServiceConfig {
    /// Create ServiceConfig from environment variables.
    ///
    /// Environment variables:
    /// - `CREDCACHE_BIND`: Bind IP address, v4 or v6 (default: 0.0.0.0)
    /// - `CREDCACHE_PORT`: Listen port (default: 443)
    /// - `CREDCACHE_DATA_DIR`: LMDB directory (default: data/creds.db)
    /// - `CREDCACHE_MAP_SIZE_MB`: LMDB map size (default: 64)
    /// - `CREDCACHE_AUTHORITY_URL`: Authority base URL (required)
    /// - `CREDCACHE_AUTHORITY_TIMEOUT_SECS`: Per-call authority timeout (default: 30)
    /// - `CREDCACHE_TLS_CERT` / `CREDCACHE_TLS_KEY`: PEM files (default: creds/cert.server, creds/key.server)
    /// - `CREDCACHE_TLS_DISABLED`: "true" serves plain HTTP
    /// - `CREDCACHE_NOT_FOUND_DELAY_MS`: Not-found delay (default: 3000)
    /// - `CREDCACHE_REQUEST_TIMEOUT_SECS`: Request timeout (default: 10)
    /// - `CREDCACHE_POLL_INTERVAL_SECS`, `CREDCACHE_IDENTITY_FILE`: see [`SyncConfig`]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let host: IpAddr = parse_or(
            "CREDCACHE_BIND",
            var("CREDCACHE_BIND"),
            DEFAULT_BIND,
        )?;
        let port = parse_or("CREDCACHE_PORT", var("CREDCACHE_PORT"), DEFAULT_PORT)?;
        let bind_addr = SocketAddr::new(host, port);

        let data_dir = var("CREDCACHE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let map_size_mb = parse_or(
            "CREDCACHE_MAP_SIZE_MB",
            var("CREDCACHE_MAP_SIZE_MB"),
            DEFAULT_MAP_SIZE_MB,
        )?;

        let authority_url =
            var("CREDCACHE_AUTHORITY_URL").ok_or(ConfigError::Missing("CREDCACHE_AUTHORITY_URL"))?;
        let authority_timeout = Duration::from_secs(parse_or(
            "CREDCACHE_AUTHORITY_TIMEOUT_SECS",
            var("CREDCACHE_AUTHORITY_TIMEOUT_SECS"),
            DEFAULT_AUTHORITY_TIMEOUT_SECS,
        )?);

        let tls_disabled = var("CREDCACHE_TLS_DISABLED")
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(false);
        let tls = (!tls_disabled).then(|| TlsPaths {
            cert: var("CREDCACHE_TLS_CERT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TLS_CERT)),
            key: var("CREDCACHE_TLS_KEY")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TLS_KEY)),
        });

        let serving = ServingConfig {
            not_found_delay: Duration::from_millis(parse_or(
                "CREDCACHE_NOT_FOUND_DELAY_MS",
                var("CREDCACHE_NOT_FOUND_DELAY_MS"),
                DEFAULT_NOT_FOUND_DELAY_MS,
            )?),
            request_timeout: Duration::from_secs(parse_or(
                "CREDCACHE_REQUEST_TIMEOUT_SECS",
                var("CREDCACHE_REQUEST_TIMEOUT_SECS"),
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
        };
        // A miss must be answered before the HTTP layer gives up on the request.
        if serving.not_found_delay >= serving.request_timeout {
            return Err(ConfigError::Invalid {
                var: "CREDCACHE_NOT_FOUND_DELAY_MS",
                value: serving.not_found_delay.as_millis().to_string(),
                reason: format!(
                    "must be below the request timeout of {}s",
                    serving.request_timeout.as_secs()
                ),
            });
        }

        Ok(Self {
            bind_addr,
            data_dir,
            map_size_mb,
            authority_url,
            authority_timeout,
            tls,
            serving,
            sync: SyncConfig::from_lookup(&lookup),
        })
    }
}

fn parse_or<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value,
            reason: e.to_string(),
        }),
    }
}
