// src/api/mod.rs — HTTP surface: status, stop and relay routes

pub mod handlers;
pub mod types;

use std::future::Future;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{delete, get};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::analysis::SessionRegistry;
use crate::infra::config::{ServerConfig, SourceCatalog};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<SessionRegistry>,
    pub catalog: Arc<SourceCatalog>,
    /// Client used to pull relay streams.
    pub http: reqwest::Client,
    pub cors_origins: Vec<String>,
}

impl ApiState {
    pub fn new(registry: Arc<SessionRegistry>, catalog: Arc<SourceCatalog>) -> Self {
        Self {
            registry,
            catalog,
            http: reqwest::Client::new(),
            cors_origins: Vec::new(),
        }
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: ApiState) -> Router {
    let origins: Vec<HeaderValue> = state
        .cors_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/api/analysis-status", get(handlers::analysis_status))
        .route("/api/analysis", delete(handlers::stop_analysis))
        .route("/api/relay", get(handlers::relay))
        .route("/api/sources", get(handlers::list_sources))
        .route("/api/health", get(handlers::health))
        .layer(cors)
        .with_state(state)
}

/// Serve the API until `shutdown` resolves.
pub async fn start_server<F>(config: &ServerConfig, state: ApiState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", config.host, config.port);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("API server listening on http://{addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
