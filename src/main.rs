use problem_baba::{build_state, config::Config, errors::AppError, routes::create_router};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing (logging)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "problem_baba=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Config::load reads .env itself; failures here are fatal.
    let config = Config::load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        AppError::from(e)
    })?;
    tracing::info!(persistence = ?config.persistence, model = %config.completion.model, "Configuration loaded");

    let state = Arc::new(build_state(&config).await?);
    let app = create_router(state);

    tracing::info!("Server listening on http://{}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
