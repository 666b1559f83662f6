// =============================================================================
// aurora-autotrade — Single-instrument paper-trading engine entry point
// =============================================================================

mod api;
mod broker;
mod config;
mod engine;
mod error;
mod events;
mod exporter;
mod market_data;
mod providers;
mod time_buffer;
mod trader;
mod types;

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::engine::{Engine, EngineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let product = std::env::var("PRODUCT").unwrap_or_else(|_| "BTC-USD".to_string());
    let api_base_url = std::env::var("COINBASE_API_BASE_URL")
        .unwrap_or_else(|_| "wss://advanced-trade-ws.coinbase.com".to_string());
    let export_bucket =
        std::env::var("EXPORT_BUCKET").unwrap_or_else(|_| "./export".to_string());
    // API_KEY_PATH / SECRET_KEY_PATH are consumed by the (out-of-scope)
    // authenticated execution client; read here only so misconfiguration
    // surfaces at startup rather than silently later.
    let _api_key_path = std::env::var("API_KEY_PATH").ok();
    let _secret_key_path = std::env::var("SECRET_KEY_PATH").ok();

    let backtest_dir = std::env::var("BACKTEST_DIR").ok().map(PathBuf::from);
    let backtest_real_time_factor = std::env::var("BACKTEST_REAL_TIME_FACTOR")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1.0);

    let bind_addr = std::env::var("API_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let engine_config = EngineConfig {
        product,
        feed_ws_url: api_base_url,
        config_path: PathBuf::from("runtime_config.json"),
        export_dir: PathBuf::from(export_bucket),
        backtest_dir,
        backtest_real_time_factor,
        starting_cash: 10_000.0,
        tick_size: 0.01,
        api_bind_addr: bind_addr.parse().with_context(|| format!("invalid API_BIND_ADDR: {bind_addr}"))?,
    };

    tracing::info!(product = %engine_config.product, "starting aurora-autotrade");

    let engine = Arc::new(Engine::new(engine_config));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let run_handle = tokio::spawn(engine.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, stopping engine");
    let _ = shutdown_tx.send(true);

    run_handle.await.context("engine task panicked")?;
    Ok(())
}
