use std::net::SocketAddr;
use std::sync::Arc;

use rust_diagnostico_api::config::Config;
use rust_diagnostico_api::handlers::AppState;
use rust_diagnostico_api::routes::build_router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// Initializes tracing, loads configuration, builds the external clients,
/// warms the matrix cache and starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_diagnostico_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let port = config.port;

    let app_state = Arc::new(AppState::from_config(config));

    // Load the matrix before accepting traffic; a missing file is reported by /health
    match app_state.matrix.get().await {
        Ok(table) => tracing::info!("Matrix cache warmed: {} offers", table.len()),
        Err(e) => tracing::warn!("Matrix not loaded at startup: {}", e),
    }

    let app = build_router(app_state, true)?;

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
