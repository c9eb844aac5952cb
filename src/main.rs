mod config;
mod db;
mod error;
mod extractor;
mod fetcher;
mod routes;
mod scheduler;
mod slug;

use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::extractor::ContentExtractor;
use crate::fetcher::Fetcher;
use crate::routes::AppState;
use crate::scheduler::Scheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "news4u=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load("news4u.toml")?;
    info!("Loaded {} feeds from configuration", config.feeds.len());

    // Initialize database
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:news4u.db?mode=rwc".to_string());
    let db = Database::new(&database_url).await?;
    db.initialize().await?;
    db.sync_feeds(&config.feeds).await?;
    info!("Database initialized");

    let db = Arc::new(db);

    let fetcher = Arc::new(Fetcher::new(
        db.clone(),
        Duration::from_secs(config.request_timeout_seconds),
    )?);
    let extractor = Arc::new(ContentExtractor::new(db.clone())?);
    let scheduler = Arc::new(Scheduler::new(fetcher.clone(), extractor.clone(), &config));

    // First fetch pass runs as soon as the jobs spawn
    scheduler.start().await;
    info!(
        "Scheduler started: fetch every {} minutes, extract every {} seconds",
        config.fetch_interval_minutes, config.extract_interval_seconds
    );

    let state = Arc::new(AppState {
        db: db.clone(),
        fetcher,
        extractor,
        scheduler: scheduler.clone(),
    });

    // Build router
    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server starting on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await;
    info!("Scheduler stopped, goodbye");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}
