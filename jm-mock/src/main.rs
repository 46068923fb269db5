/// JoinMarket Daemon Mock Server
///
/// A lightweight stand-in for jmwalletd and the Jam backend. Serves the
/// session, auth, rescan and features endpoints plus the `/jmws` websocket.
/// Designed for local development of Jam clients.

mod handlers;
mod server;
mod state;
mod types;

use anyhow::{Context, Result};
use serde_json::json;
use std::env;
use std::sync::Arc;

use server::run_server;
use state::MockState;

#[derive(Debug)]
struct Config {
    // Wallet served by the mock
    wallet_name: String,
    wallet_password: String,

    // Capabilities
    websocket_enabled: bool,
    logs_feature: bool,

    // Server
    server_host: String,
    server_port: u16,
}

impl Config {
    fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let wallet_name = env::var("MOCK_WALLET_NAME")
            .unwrap_or_else(|_| "wallet.jmdat".to_string());

        let wallet_password = env::var("MOCK_WALLET_PASSWORD")
            .context("MOCK_WALLET_PASSWORD environment variable not set")?;

        let websocket_enabled = env::var("MOCK_WEBSOCKET")
            .map(|v| v != "0" && v.to_lowercase() != "false")
            .unwrap_or(true);

        let logs_feature = env::var("MOCK_FEATURE_LOGS")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let server_host = env::var("SERVER_HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "28183".to_string())
            .parse()
            .context("Invalid SERVER_PORT")?;

        Ok(Self {
            wallet_name,
            wallet_password,
            websocket_enabled,
            logs_feature,
            server_host,
            server_port,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    log::info!("Starting jmwalletd mock server...");

    // Load configuration
    let config = Config::from_env()
        .context("Failed to load configuration")?;

    log::info!("Wallet: {}", config.wallet_name);
    log::info!("Websocket enabled: {}", config.websocket_enabled);
    log::info!("Server will listen on {}:{}", config.server_host, config.server_port);

    let mut state = MockState::new()
        .with_wallet(&config.wallet_name, &config.wallet_password)
        .with_features(json!({ "features": { "logs": config.logs_feature } }))
        .with_rescan(false, None);
    if !config.websocket_enabled {
        state = state.without_websocket();
    }

    // Run server
    run_server(Arc::new(state), config.server_host, config.server_port)
        .await
        .context("Server error")?;

    Ok(())
}
