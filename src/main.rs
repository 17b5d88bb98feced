use clap::Parser;

use model_registry_server::{
    config::{Cli, Config},
    logging::init_logging,
    refresher::spawn_status_refresher,
    router, AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(&cli)?;

    init_logging(&config.log_level);

    let state = AppState::new(&config)?;

    if let Some(every) = config.refresh_interval() {
        spawn_status_refresher(state.registry.clone(), every);
    }

    let app = router(state, config.request_timeout());

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;

    tracing::info!("Model registry server starting on http://{}", config.server.bind);
    tracing::info!("Available endpoints:");
    tracing::info!("  - GET    /health                      - Server health");
    tracing::info!("  - GET    /v1/registry                 - List entries (re-probed)");
    tracing::info!("  - POST   /v1/registry                 - Register a backend");
    tracing::info!("  - PUT    /v1/registry                 - Update a backend");
    tracing::info!("  - DELETE /v1/registry                 - Remove a backend");
    tracing::info!("  - POST   /v1/registry/generate        - Proxy a generation request");
    tracing::info!("  - POST   /v1/registry/generate/stream - Streaming generation (SSE)");
    tracing::info!("  - GET    /v1/logs                     - Query interaction log");
    tracing::info!("  - POST   /v1/logs                     - Append to interaction log");
    tracing::info!("  - DELETE /v1/logs                     - Clear interaction log");

    axum::serve(listener, app).await?;
    Ok(())
}
