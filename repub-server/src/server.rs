//! HTTP server setup for the hosted package repository
//!
//! [`build_router`] wires the package API behind the bearer token middleware;
//! [`run_server`] opens the on-disk stores and serves until Ctrl+C.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::{
    api, auth,
    config::Config,
    state::AppState,
    storage::LocalBlobStore,
    store::FilePackageStore,
};

const SERVICE_NAME: &str = "repub-server";

/// Build the application router around a prepared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    let read_routes = Router::new()
        .route("/api/packages", get(api::list_packages))
        .route("/api/packages/{package}", get(api::get_package))
        .route(
            "/api/packages/{package}/versions/{version}",
            get(api::get_version),
        )
        .route(
            "/packages/{package}/versions/{version}/download",
            get(api::download_archive),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_read,
        ));

    let publish_routes = Router::new()
        .route(
            "/api/packages/versions/new",
            get(api::new_upload).post(api::upload_archive),
        )
        .route(
            "/api/packages/versions/newUploadFinish",
            get(api::finalize_upload),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_write,
        ))
        .layer(DefaultBodyLimit::max(state.config.max_upload_size_bytes()));

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .merge(read_routes)
        .merge(publish_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the repository with durable storage under `config.storage.data_dir`.
pub async fn run_server(config: Config) -> Result<()> {
    info!("Starting package repository server");

    let archives_dir = config.storage.archives_dir();
    tokio::fs::create_dir_all(&archives_dir).await.map_err(|e| {
        error!(path = %archives_dir.display(), error = %e, "Failed to create archive directory");
        anyhow::anyhow!("Failed to create {}: {}", archives_dir.display(), e)
    })?;

    let catalog_path = config.storage.catalog_path();
    let store = FilePackageStore::open(&catalog_path).await.map_err(|e| {
        error!(path = %catalog_path.display(), error = %e, "Failed to open package catalog");
        anyhow::anyhow!("Failed to open catalog {}: {}", catalog_path.display(), e)
    })?;
    let store = Arc::new(store);

    info!(
        data_dir = %config.storage.data_dir.display(),
        base_url = %config.server.base_url,
        "Using data directory"
    );

    let host = config.server.host.clone();
    let port = config.server.port;
    let addr: SocketAddr = format!("{}:{}", host, port).parse().map_err(|e| {
        error!(host = %host, port = %port, error = %e, "Invalid socket address");
        anyhow::anyhow!("Invalid socket address {}:{}: {}", host, port, e)
    })?;

    let state = AppState::new(
        config,
        store.clone(),
        Arc::new(LocalBlobStore::new(archives_dir)),
    )?;
    let app = build_router(Arc::new(state));

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!(addr = %addr, error = %e, "Failed to bind to address");
        anyhow::anyhow!("Failed to bind to {}:{}: {}", host, port, e)
    })?;

    info!("Server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = %e, "Server error");
            anyhow::anyhow!("Server error: {}", e)
        })?;

    if let Err(e) = store.flush().await {
        error!(error = %e, "Failed to write pending download counts");
    }
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let packages = match state.query.package_count().await {
        Ok(count) => count,
        Err(e) => {
            error!(error = %e, "Failed to count packages");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::CACHE_CONTROL, "no-store")],
                Json(json!({
                    "status": "degraded",
                    "service": SERVICE_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                })),
            );
        }
    };

    (
        StatusCode::OK,
        [(header::CACHE_CONTROL, "no-store")],
        Json(json!({
            "status": "ok",
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "packages": packages,
            "pending_uploads": state.staging.len(),
        })),
    )
}
