use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use consultbook::config::AppConfig;
use consultbook::db;
use consultbook::routes;
use consultbook::services::lifecycle;
use consultbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    if config.admin_token.is_empty() {
        tracing::warn!("ADMIN_TOKEN is empty, admin endpoints will reject every request");
    }

    let conn = db::init_db(&config.database_url)?;
    let state = Arc::new(AppState::new(conn, config.clone()));

    if config.sweep_interval.is_zero() {
        tracing::info!("periodic sweep disabled, appointments expire on read only");
    } else {
        tracing::info!("sweeping elapsed appointments every {:?}", config.sweep_interval);
        tokio::spawn(lifecycle::run_sweeper(Arc::clone(&state), config.sweep_interval));
    }

    let app = routes::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
