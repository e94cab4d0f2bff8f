//! credcache Service Entry Point
//!
//! Opens the cache, starts one synchronization engine per credential class
//! and serves lookups until interrupted.

use std::sync::Arc;

use credcache_api::{
    create_router, server, telemetry::init_tracing, ApiError, ApiResult, AppState, EngineSet,
    ServiceConfig,
};
use credcache_authority::HttpAuthority;
use credcache_core::{CredentialClass, CredentialSchema};
use credcache_storage::LmdbCacheStore;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing()?;

    let config = ServiceConfig::from_env()?;
    let schemas: Vec<&'static CredentialSchema> =
        CredentialClass::ALL.iter().map(|class| class.schema()).collect();

    let store = Arc::new(
        LmdbCacheStore::open(&config.data_dir, config.map_size_mb, &schemas).map_err(|e| {
            ApiError::internal_error(format!(
                "Failed to open cache at {}: {}",
                config.data_dir.display(),
                e
            ))
        })?,
    );

    let authority = Arc::new(
        HttpAuthority::new(&config.authority_url, config.authority_timeout)
            .map_err(|e| ApiError::internal_error(e.to_string()))?,
    );

    // TLS material is loaded before anything is spawned so a bad file fails fast.
    let tls = match &config.tls {
        Some(paths) => Some(server::load_tls_config(paths).await?),
        None => None,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut engines = EngineSet::spawn(
        &schemas,
        authority,
        Arc::clone(&store),
        &config.sync,
        shutdown_rx.clone(),
    )?;

    let state = AppState::new(store, &schemas, config.serving).with_engines(engines.metrics());
    let app = create_router(state);

    let addr = config.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;
    tracing::info!(%addr, tls = tls.is_some(), "Starting credcache service");

    let mut server = tokio::spawn(server::serve(
        listener,
        app,
        tls,
        shutdown_rx,
        config.serving.request_timeout,
    ));

    let outcome = tokio::select! {
        result = &mut server => result
            .map_err(|e| ApiError::internal_error(format!("Server task failed: {}", e)))
            .and_then(|served| served),
        Some(Err(e)) = engines.join_next() => Err(e),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    };

    // Stop everything that is still running.
    let _ = shutdown_tx.send(true);
    if !server.is_finished() {
        match server.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Server stopped with error"),
            Err(e) => tracing::error!(error = %e, "Server task failed"),
            Ok(Ok(())) => {}
        }
    }
    let engines_result = engines.join_all().await;

    tracing::info!("credcache service stopped");
    outcome.and(engines_result)
}
