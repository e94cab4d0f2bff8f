//! HTTP Routes
//!
//! Health checks live under `/health`. Every other path is dispatched by
//! credential class prefix: `/{class-prefix}/{name}` is answered by that
//! class's lookup service, and anything else is an immediate 404.

pub mod health;

use axum::{
    extract::State,
    http::Uri,
    response::{IntoResponse, Response},
    Json, Router,
};
use credcache_storage::CacheStore;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::error::ApiError;
use crate::state::AppState;

/// Build the full service router.
pub fn create_router<S: CacheStore + 'static>(state: AppState<S>) -> Router {
    let request_timeout = state.serving.request_timeout;

    Router::new()
        .nest("/health", health::create_router::<S>())
        .fallback(dispatch::<S>)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout)),
        )
}

/// Route a lookup by path prefix.
///
/// The remainder after the prefix is percent-decoded and used verbatim as
/// the credential name. Any HTTP method is accepted.
pub async fn dispatch<S: CacheStore + 'static>(
    State(state): State<AppState<S>>,
    uri: Uri,
) -> Response {
    let path = uri.path();

    let Some((service, raw_name)) = state.route(path) else {
        tracing::debug!(path = %path, "No credential route");
        return ApiError::route_not_found(path).into_response();
    };

    // Names that do not decode to UTF-8 cannot be cached, but still take the
    // not-found path so they are answered with the same delay.
    let decoded = urlencoding::decode_binary(raw_name.as_bytes());
    let name = String::from_utf8_lossy(&decoded);

    match service.lookup(&name).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => e.into_response(),
    }
}
