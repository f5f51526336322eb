use tracing_subscriber::EnvFilter;

use villa_booking::{config::AppConfig, create_router, AppState};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging; RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Pool Villa Booking API - Starting...");

    // Get configuration from environment variables
    let config = AppConfig::from_env().expect("Invalid configuration");

    let state = AppState::from_config(&config)
        .await
        .expect("Failed to load data collections");

    // Sweep points that expired while the server was down
    match state.engine.loyalty().sweep_all(chrono::Utc::now()).await {
        Ok(expired) if expired > 0 => tracing::info!("Expired {} points batches on startup", expired),
        Ok(_) => {}
        Err(e) => tracing::warn!("Startup points expiry sweep failed: {}", e),
    }

    for conflict in state.engine.detect_conflicts().await {
        tracing::warn!(
            kind = %conflict.kind,
            first = %conflict.first_id,
            second = %conflict.second_id,
            "Conflicting rules will reject quotes on shared nights"
        );
    }

    let engine = state.engine.clone();

    // Create the application router
    let app = create_router(state);

    // Start the Axum server
    let addr = config.bind_address();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Pool Villa Booking API is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    engine.metrics().log_summary();
    tracing::info!("Pool Villa Booking API stopped");
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    tracing::info!("Shutdown signal received, finishing in-flight requests");
}
