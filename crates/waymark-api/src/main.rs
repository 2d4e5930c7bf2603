//! Waymark API server entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use waymark_api::delivery::LogDeliveryChannel;
use waymark_api::{routes, state};
use waymark_core::clock::SystemClock;
use waymark_engine::SchedulePolicy;
use waymark_store::PgProgressStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Waymark API server");

    // Read configuration from environment.
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| "DATABASE_URL environment variable must be set")?;
    let catalog_path: PathBuf = std::env::var("CATALOG_PATH")
        .unwrap_or_else(|_| "catalog.yaml".to_string())
        .into();
    let dispatch_secret = std::env::var("DISPATCH_SECRET")
        .map_err(|_| "DISPATCH_SECRET environment variable must be set")?;
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .map_err(|e| format!("PORT must be a valid u16: {e}"))?;
    let morning_hour: u32 = std::env::var("MORNING_HOUR")
        .unwrap_or_else(|_| "8".to_string())
        .parse()
        .map_err(|e| format!("MORNING_HOUR must be an hour of day: {e}"))?;
    let utc_offset_minutes: i32 = std::env::var("UTC_OFFSET_MINUTES")
        .unwrap_or_else(|_| "0".to_string())
        .parse()
        .map_err(|e| format!("UTC_OFFSET_MINUTES must be an integer: {e}"))?;

    // Load and validate the catalog. A validation failure is a deploy-time
    // gate: the server refuses to start rather than serving a broken quest.
    let catalog = waymark_catalog::from_yaml_file(&catalog_path)
        .map_err(|e| format!("catalog {} failed to load: {e}", catalog_path.display()))?;
    tracing::info!(chapters = catalog.chapters.len(), "catalog loaded");

    let policy = SchedulePolicy::new(morning_hour, utc_offset_minutes)?;

    // Create database connection pool.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    // Build application state.
    let app_state = state::AppState::new(
        Arc::new(catalog),
        Arc::new(PgProgressStore::new(pool)),
        Arc::new(LogDeliveryChannel),
        Arc::new(SystemClock),
        policy,
        dispatch_secret,
    );

    // Build router.
    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/quest", routes::quest::router())
        .nest("/api/v1/admin", routes::admin::router())
        .nest("/api/v1/dispatch", routes::dispatch::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server.
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| format!("invalid HOST:PORT combination: {e}"))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
