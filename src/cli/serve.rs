// src/cli/serve.rs — `surfwatch serve`: run the API until Ctrl-C

use std::sync::Arc;

use crate::analysis::{LabelCounter, ProcessBackend, SessionRegistry, SessionSettings};
use crate::api::{self, ApiState};
use crate::infra::config::{Config, SourceCatalog};

pub async fn run_serve(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate()?;

    let registry = Arc::new(SessionRegistry::new(
        Arc::new(ProcessBackend::from_config(&config)),
        Arc::new(LabelCounter::new(config.analysis.target_label.clone())),
        SessionSettings::from_config(&config),
        &config.relay,
    ));
    let catalog = Arc::new(SourceCatalog::from_config(&config));
    tracing::info!(
        "{} source(s) configured; counting '{}' at {} fps",
        catalog.len(),
        config.analysis.target_label,
        config.analysis.max_fps
    );

    let state = ApiState::new(Arc::clone(&registry), catalog)
        .with_cors_origins(config.server.cors_origins.clone());
    let served = api::start_server(&config.server, state, shutdown_signal()).await;

    tracing::info!(
        "Shutting down; stopping {} active session(s)",
        registry.active_count()
    );
    registry.shutdown().await;
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
