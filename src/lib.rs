//! Hyperliquid Webhook - charting alerts to perpetual-futures orders
//!
//! Receives buy/sell alerts over HTTP, sizes them against the venue's
//! quantization rules and reconciles the account's net position per symbol
//! (open, hold/scale, or close-then-flip).

pub mod brokers;
pub mod config;
pub mod error;
pub mod services;
pub mod state;
pub mod webhook;

use config::Config;
use state::AppState;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webhook::WebhookServer;

/// Initialize logging, load config and serve until Ctrl-C
pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hyperliquid_webhook=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Hyperliquid webhook server...");

    let config = Config::load()?;
    let state = Arc::new(AppState::from_config(config)?);

    if state.exchange.is_none() {
        tracing::warn!(
            "HYPERLIQUID_ACCOUNT_ADDRESS / HYPERLIQUID_SECRET_KEY not set: running in demo mode, no orders will be submitted"
        );
    }

    let mut server = WebhookServer::new(state);
    server.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received");

    server.stop();
    server.join().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
