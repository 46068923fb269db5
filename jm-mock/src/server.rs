/// Axum HTTP server setup and routing

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::*;
use crate::state::MockState;

pub fn create_router(state: Arc<MockState>) -> Router {
    // Configure CORS to allow requests from browser clients/tests
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Session and auth endpoints
        .route("/api/v1/session", get(get_session))
        .route("/api/v1/token", post(refresh_token))
        .route("/api/v1/wallet/:walletname/unlock", post(unlock_wallet))
        .route("/api/v1/wallet/:walletname/lock", get(lock_wallet))
        .route("/api/v1/wallet/:walletname/getrescaninfo", get(get_rescan_info))

        // Jam backend
        .route("/jam/api/v0/features", get(get_features))

        // Push notifications
        .route("/jmws", get(websocket))

        // Test helper endpoints
        .route("/mock/notify", post(notify))
        .route("/mock/status", post(set_status))

        // Shared state
        .with_state(state)

        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(state: Arc<MockState>, host: String, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("🚀 jmwalletd mock listening on http://{}", addr);
    log::info!("📡 Websocket endpoint: ws://{}/jmws", addr);
    log::info!("🔔 Push a frame: POST /mock/notify");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Serve on an ephemeral localhost port in the background
pub async fn spawn_local(state: Arc<MockState>) -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = create_router(state);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            log::error!("Mock server error: {}", e);
        }
    });

    log::debug!("Mock server listening on {}", addr);
    Ok(addr)
}
