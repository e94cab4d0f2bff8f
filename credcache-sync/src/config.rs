//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default delay between polls of the authority's index version.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default location of the service identity file.
pub const DEFAULT_IDENTITY_FILE: &str = "keys/private.json";

/// Configuration shared by every synchronization engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Fixed delay between polls (default: 5 seconds)
    pub poll_interval: Duration,

    /// Service identity used to authenticate with the authority
    pub identity_file: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            identity_file: PathBuf::from(DEFAULT_IDENTITY_FILE),
        }
    }
}

impl SyncConfig {
    /// Create SyncConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `CREDCACHE_POLL_INTERVAL_SECS`: Delay between polls (default: 5)
    /// - `CREDCACHE_IDENTITY_FILE`: Identity file path (default: keys/private.json)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset, empty or unparseable
    /// values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let poll_interval = Duration::from_secs(
            lookup("CREDCACHE_POLL_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
        );

        let identity_file = lookup("CREDCACHE_IDENTITY_FILE")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_IDENTITY_FILE));

        Self {
            poll_interval,
            identity_file,
        }
    }

    /// Short poll interval for tests.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}
