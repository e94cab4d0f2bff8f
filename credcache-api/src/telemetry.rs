//! Tracing Subscriber Initialization
//!
//! Installs a JSON `tracing-subscriber` filtered by `RUST_LOG`, falling back
//! to [`DEFAULT_LOG_FILTER`].

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::constants::DEFAULT_LOG_FILTER;
use crate::error::{ApiError, ApiResult};

/// Build the filter from `RUST_LOG`, or the default filter if it is unset
/// or invalid.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Initialize the global subscriber. Call once, before any tracing occurs.
pub fn init_tracing() -> ApiResult<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_version = env!("CARGO_PKG_VERSION"),
        "Tracing initialized"
    );

    Ok(())
}
