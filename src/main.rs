use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vitrine_console::config::Config;
use vitrine_console::handlers::AppState;
use vitrine_console::routes::build_router;

/// Main entry point for the application.
///
/// Initializes tracing, loads the configuration, builds the shared state
/// (assistant API client, postal lookup, client stores, caches) and serves
/// the console router.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vitrine_console=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let app_state = Arc::new(AppState::new(config.clone())?);
    tracing::info!("✓ Assistant API client initialized: {}", config.assistant_api_url);

    let app = build_router(app_state, true)?;

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
