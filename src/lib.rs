pub mod ai;
pub mod analytics;
pub mod api;
pub mod config;
pub mod core_state;
pub mod db;
pub mod models;
pub mod pipeline;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Core(#[from] core_state::CoreError),
    #[error(transparent)]
    Server(#[from] api::server::ServerError),
    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(std::io::Error),
}

/// Start the service and block until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::AppConfig::from_env();
    tracing::info!(
        provider_override = ?config.provider_override,
        claude_configured = config.anthropic_api_key.is_some(),
        ollama = %config.ollama_base_url,
        ollama_model = %config.ollama_model,
        database = %config.database_path.display(),
        "Configuration loaded"
    );

    let core = Arc::new(core_state::CoreState::from_config(&config).await?);
    let server = api::start_server(core.clone(), config.bind_addr).await?;
    tracing::info!(addr = %server.session.server_addr, "Listening");

    tokio::signal::ctrl_c().await.map_err(StartupError::Signal)?;
    tracing::info!("Shutdown requested");

    core.cancel_batch().ok();
    server.stop().await;
    if let Err(e) = core.persist().await {
        tracing::error!(error = %e, "Final session save failed");
    }

    tracing::info!("{} stopped", config::APP_NAME);
    Ok(())
}
