//! Health Check Endpoints
//!
//! - /health/live - Process alive check
//! - /health/ready - Store readable and every engine has reconciled once

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use credcache_core::VERSION_ATTRIBUTE;
use credcache_storage::CacheStore;
use credcache_sync::SyncSnapshot;
use serde::Serialize;

use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthDetails {
    pub store: ComponentHealth,
    pub engines: Vec<SyncSnapshot>,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/live
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready
///
/// Healthy only when the store answers reads for every class and every
/// engine has completed a reconciliation pass. A readable store with
/// engines still catching up reports `degraded` with 503.
pub async fn readiness<S: CacheStore + 'static>(
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    let store = check_store(&state);
    let engines: Vec<SyncSnapshot> = state.engines.iter().map(|m| m.snapshot()).collect();
    let synced = engines.iter().all(|snapshot| snapshot.reconciled);

    let (overall_status, message) = match (store.status, synced) {
        (HealthStatus::Healthy, true) => (HealthStatus::Healthy, None),
        (HealthStatus::Healthy, false) => (
            HealthStatus::Degraded,
            Some("Initial synchronization in progress".to_string()),
        ),
        _ => (
            HealthStatus::Unhealthy,
            Some("Cache store unavailable".to_string()),
        ),
    };

    let response = HealthResponse {
        status: overall_status,
        message,
        details: Some(HealthDetails {
            store,
            engines,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };

    let status_code = if overall_status == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

fn check_store<S: CacheStore>(state: &AppState<S>) -> ComponentHealth {
    let start = std::time::Instant::now();

    // The empty name is never a credential; this only exercises a read txn.
    let result = state
        .services
        .iter()
        .try_for_each(|service| state.store.get(service.schema(), "", VERSION_ATTRIBUTE).map(drop));

    match result {
        Ok(()) => ComponentHealth {
            status: HealthStatus::Healthy,
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Store health check failed");
            ComponentHealth {
                status: HealthStatus::Unhealthy,
                latency_ms: None,
                error: Some(format!("Store check failed: {}", e)),
            }
        }
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create health check router.
pub fn create_router<S: CacheStore + 'static>() -> Router<AppState<S>> {
    Router::new()
        .route("/live", get(liveness))
        .route("/ready", get(readiness::<S>))
}
