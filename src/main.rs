use axum::Router;
use reaper::api;
use reaper::config::Config;
use reaper::services::{
    LedgerService, OutcomeResolver, PriceFeed, SettingsService, SqliteStore, SweepMonitor,
};
use reaper::AppState;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reaper=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env());
    info!("Starting Reaper server on {}:{}", config.host, config.port);

    // Storage and core services
    let store = Arc::new(SqliteStore::new(&config.database_path)?);
    let settings = Arc::new(SettingsService::new(store.clone()));
    let resolver = OutcomeResolver::new(settings.clone());
    let ledger = Arc::new(LedgerService::from_config(store.clone(), resolver, &config));
    let price_feed = Arc::new(PriceFeed::new(
        config.price_api_url.clone(),
        Duration::from_millis(config.price_timeout_ms),
        Duration::from_millis(config.price_ttl_ms),
    ));

    if config.admin_key.is_none() {
        warn!("No ADMIN_KEY configured, operator endpoints are disabled");
    }

    // Start the expiry/liquidation monitor
    let monitor = SweepMonitor::new(
        ledger.clone(),
        price_feed.clone(),
        Duration::from_millis(config.monitor_interval_ms),
    )
    .spawn();

    // Create application state
    let state = AppState {
        config: config.clone(),
        store,
        ledger,
        settings,
        price_feed,
    };

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    let app = Router::new()
        .merge(api::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Reaper server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Tear the monitor down with the server; in-flight closes finish first
    monitor.stop().await;
    info!("Reaper server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
