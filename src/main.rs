use map_gateway::{
    api::{create_router, AppState},
    config::Config,
    maps::ConfigProvider,
    observability::{init_tracing, HealthChecker},
    rate_limit::RateLimiter,
    store::create_store,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration; refuse to serve on anything missing
    let config = Config::load()?;
    config.validate()?;

    // Initialize tracing/logging
    init_tracing(&config.observability)?;

    tracing::info!("Starting map gateway");
    tracing::info!("Configuration loaded: {:?}", config.server);

    let provider = ConfigProvider::from_config(&config.maps)?;

    let store = create_store(&config.store).await?;
    tracing::info!(backend = ?config.store.backend, "Rate limit store ready");

    let limiter = RateLimiter::from_config(
        store.clone(),
        &config.rate_limit,
        Duration::from_millis(config.store.timeout_ms),
    )?;
    tracing::info!(
        max_requests = %config.rate_limit.max_requests,
        window_seconds = %config.rate_limit.window_seconds,
        "Rate limiter configured"
    );

    let state = AppState {
        limiter: Arc::new(limiter),
        provider: Arc::new(provider),
        health_checker: Arc::new(HealthChecker::new(store)),
    };

    // Create router
    let app = create_router(state, config.observability.metrics_enabled);

    // Bind server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Map gateway is ready to accept requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
