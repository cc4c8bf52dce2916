//! Newsdesk API Server Entry Point
//!
//! Bootstraps configuration, selects the data store, and starts the Axum
//! HTTP server with the live dashboard stream.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use newsdesk_api::telemetry::{init_tracer, TelemetryConfig};
use newsdesk_api::{
    create_api_router, relay_from_config, ApiConfig, ApiError, ApiResult, AppState, DbConfig,
    PgDashboardStore, StoreBackend,
};
use newsdesk_storage::{DashboardStore, InMemoryStore};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let api_config = ApiConfig::from_env();

    let store: Arc<dyn DashboardStore> = match StoreBackend::from_env()? {
        StoreBackend::Postgres => {
            let db_config = DbConfig::from_env();
            tracing::info!(
                host = %db_config.host,
                dbname = %db_config.dbname,
                pool_size = db_config.max_size,
                "Using PostgreSQL dashboard store"
            );
            Arc::new(PgDashboardStore::from_config(&db_config)?)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory dashboard store; data is not persisted");
            Arc::new(InMemoryStore::new())
        }
    };

    let relay = relay_from_config(&api_config.relay)
        .map_err(|e| ApiError::internal_error(format!("Failed to build push relay: {}", e)))?;

    let state = AppState::new(api_config, store, relay);
    let sessions = Arc::clone(&state.sessions);
    let app: Router = create_api_router(state);

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting Newsdesk API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            tracing::info!("Shutdown signal received");
            // Open SSE responses never finish on their own.
            sessions.shutdown();
        })
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("NEWSDESK_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("NEWSDESK_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
