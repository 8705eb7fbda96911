//! LedaaS API Server
//!
//! Main entry point for the ledger service: the HTTP API plus the webhook
//! delivery workers, sharing one connection pool.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledaas_api::{AppState, create_router};
use ledaas_db::connect;
use ledaas_shared::config::AppConfig;
use ledaas_worker::spawn_workers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledaas=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load().expect("Failed to load configuration");

    // Connect to database
    let db = connect(&config.database).await?;
    info!("Connected to database");

    // Start the delivery workers on a shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = spawn_workers(&db, &config.webhook, &shutdown_rx)?;
    info!(count = workers.len(), "Webhook workers running");

    // Create application state
    let state = AppState {
        db: Arc::new(db),
        config: Arc::new(config.clone()),
    };

    // Create router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let in-flight deliveries finish before exiting
    info!("Shutting down webhook workers");
    shutdown_tx.send(true)?;
    for worker in workers {
        worker.await?;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
