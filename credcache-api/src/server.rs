//! Network listener.
//!
//! Serves the router over TLS when a certificate and key are configured, or
//! over plain HTTP otherwise. Both paths stop accepting when the shutdown
//! signal flips and let in-flight connections finish.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

use crate::config::TlsPaths;
use crate::error::{ApiError, ApiResult};

/// Load the PEM certificate chain and private key into a server config.
pub async fn load_tls_config(paths: &TlsPaths) -> ApiResult<Arc<ServerConfig>> {
    let cert_pem = read_pem(&paths.cert).await?;
    let key_pem = read_pem(&paths.key).await?;

    let certs = CertificateDer::pem_slice_iter(&cert_pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            ApiError::internal_error(format!(
                "Failed to parse certificates in {}: {}",
                paths.cert.display(),
                e
            ))
        })?;
    if certs.is_empty() {
        return Err(ApiError::internal_error(format!(
            "No certificates found in {}",
            paths.cert.display()
        )));
    }

    let key = PrivateKeyDer::from_pem_slice(&key_pem).map_err(|e| {
        ApiError::internal_error(format!(
            "Failed to parse private key in {}: {}",
            paths.key.display(),
            e
        ))
    })?;

    let mut config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| ApiError::internal_error(format!("TLS protocol error: {}", e)))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ApiError::internal_error(format!("TLS config error: {}", e)))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

async fn read_pem(path: &Path) -> ApiResult<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| {
        ApiError::internal_error(format!("Failed to read {}: {}", path.display(), e))
    })
}

/// Serve `app` on `listener` until `shutdown_rx` flips to true.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    tls: Option<Arc<ServerConfig>>,
    shutdown_rx: watch::Receiver<bool>,
    drain_timeout: Duration,
) -> ApiResult<()> {
    match tls {
        Some(config) => serve_tls(listener, app, config, shutdown_rx, drain_timeout).await,
        None => {
            tracing::warn!("TLS disabled, serving plain HTTP");
            axum::serve(listener, app)
                .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
                .await
                .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))
        }
    }
}

async fn serve_tls(
    listener: TcpListener,
    app: Router,
    config: Arc<ServerConfig>,
    mut shutdown_rx: watch::Receiver<bool>,
    drain_timeout: Duration,
) -> ApiResult<()> {
    let acceptor = TlsAcceptor::from(config);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            Some(_) = connections.join_next(), if !connections.is_empty() => {}

            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                };

                let acceptor = acceptor.clone();
                let service = TowerToHyperService::new(app.clone());
                let connection_shutdown = wait_for_shutdown(shutdown_rx.clone());
                connections.spawn(async move {
                    let stream = match acceptor.accept(stream).await {
                        Ok(stream) => stream,
                        Err(e) => {
                            tracing::debug!(peer = %peer, error = %e, "TLS handshake failed");
                            return;
                        }
                    };

                    let builder = Builder::new(TokioExecutor::new());
                    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
                    tokio::pin!(conn, connection_shutdown);

                    // Idle keep-alive connections are closed once shutdown starts;
                    // requests already in flight run to completion.
                    let mut closing = false;
                    loop {
                        tokio::select! {
                            result = conn.as_mut() => {
                                if let Err(e) = result {
                                    tracing::debug!(peer = %peer, error = %e, "Connection closed with error");
                                }
                                break;
                            }
                            _ = &mut connection_shutdown, if !closing => {
                                closing = true;
                                conn.as_mut().graceful_shutdown();
                            }
                        }
                    }
                });
            }
        }
    }

    tracing::info!(open_connections = connections.len(), "Listener stopped, draining connections");
    let drained = tokio::time::timeout(drain_timeout, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!(open_connections = connections.len(), "Drain timed out, closing connections");
        connections.shutdown().await;
    }

    Ok(())
}

async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    while !*shutdown_rx.borrow_and_update() {
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}
