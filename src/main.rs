use std::sync::Arc;

mod accounts;
mod app;
mod config;
mod db;
mod error;
mod pictures;
mod state;
mod storage;

use crate::{app::build_app, config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "unimap=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = Arc::new(AppConfig::from_env()?);
    let pool = db::connect(&config).await?;
    db::migrate(&pool).await;

    let state = AppState::init(config.clone(), pool.clone()).await?;
    let app = build_app(state);

    app::serve(app, &config).await?;

    pool.close().await;
    tracing::info!("database pool closed");
    Ok(())
}
