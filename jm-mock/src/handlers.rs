/// Axum HTTP handlers for the jmwalletd endpoints

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::state::MockState;
use crate::types::*;

/// Shared application state
pub type AppState = Arc<MockState>;

/// Header the Jam reverse proxy forwards as `Authorization`
pub const AUTH_HEADER: &str = "x-jm-authorization";

/// Custom error type for handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid credentials.")]
    Unauthorized,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
        };

        let message = self.to_string();
        (status, Json(ErrorBody { message })).into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Token must be present and issued for `wallet`
async fn authorize(state: &MockState, headers: &HeaderMap, wallet: &str) -> Result<(), ApiError> {
    let token = bearer_token(headers).ok_or(ApiError::Unauthorized)?;
    match state.token_wallet(&token).await {
        Some(owner) if owner == wallet => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

/// GET /api/v1/session
/// Answers without a token; a present but invalid token is rejected
pub async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    if let Some(token) = bearer_token(&headers) {
        if state.token_wallet(&token).await.is_none() {
            return Err(ApiError::Unauthorized);
        }
    }
    Ok(Json(state.session().await))
}

/// POST /api/v1/wallet/{walletname}/unlock
pub async fn unlock_wallet(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
    Json(req): Json<UnlockRequest>,
) -> Result<Json<UnlockResponse>, ApiError> {
    let (token, refresh_token) = state
        .unlock(&wallet, &req.password)
        .await
        .ok_or(ApiError::Unauthorized)?;

    log::info!("Unlocked wallet {}", wallet);
    Ok(Json(UnlockResponse {
        walletname: wallet,
        token,
        refresh_token,
    }))
}

/// GET /api/v1/wallet/{walletname}/lock
pub async fn lock_wallet(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
    headers: HeaderMap,
) -> Result<Json<LockResponse>, ApiError> {
    authorize(&state, &headers, &wallet).await?;
    let already_locked = state.lock(&wallet).await;

    log::info!("Locked wallet {}", wallet);
    Ok(Json(LockResponse {
        walletname: wallet,
        already_locked,
    }))
}

/// POST /api/v1/token
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    if req.grant_type != "refresh_token" {
        return Err(ApiError::BadRequest(format!(
            "unsupported grant type: {}",
            req.grant_type
        )));
    }
    let (token, refresh_token) = state
        .refresh(&req.refresh_token)
        .await
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(TokenResponse {
        token,
        refresh_token,
    }))
}

/// GET /api/v1/wallet/{walletname}/getrescaninfo
/// 404 when the daemon is too old to report rescan progress
pub async fn get_rescan_info(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RescanInfoResponse>, ApiError> {
    let info = state
        .rescan()
        .await
        .ok_or_else(|| ApiError::NotFound("Not found".to_string()))?;
    authorize(&state, &headers, &wallet).await?;
    Ok(Json(info))
}

/// GET /jam/api/v0/features
pub async fn get_features(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let features = state
        .features()
        .await
        .ok_or_else(|| ApiError::NotFound("Not found".to_string()))?;
    let token = bearer_token(&headers).ok_or(ApiError::Unauthorized)?;
    if state.token_wallet(&token).await.is_none() {
        return Err(ApiError::Unauthorized);
    }
    Ok(Json(features))
}

/// GET /jmws
/// Websocket upgrade; 404 when push is disabled
pub async fn websocket(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    if !state.websocket_enabled() {
        return ApiError::NotFound("Not found".to_string()).into_response();
    }
    ws.on_upgrade(move |socket| serve_socket(state, socket))
}

/// First frame carries the access token; notifications only flow after it
async fn serve_socket(state: AppState, mut socket: WebSocket) {
    let token = match socket.recv().await {
        Some(Ok(Message::Text(token))) => token,
        _ => return,
    };
    if state.token_wallet(&token).await.is_none() {
        log::warn!("Websocket authentication failed");
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    log::info!("Websocket client authenticated");
    let mut notifications = state.subscribe_notifications();
    loop {
        tokio::select! {
            note = notifications.recv() => match note {
                Ok(text) => {
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Websocket client lagged, {} notifications skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    log::info!("Websocket client disconnected");
}

/// POST /mock/notify
/// Push a status frame to every authenticated websocket client
pub async fn notify(
    State(state): State<AppState>,
    Json(frame): Json<Value>,
) -> Json<NotifyResponse> {
    let delivered_to = state.notify(&frame);
    log::info!("Pushed notification to {} clients", delivered_to);
    Json(NotifyResponse { delivered_to })
}

/// POST /mock/status
/// Merge fields into the session response
pub async fn set_status(
    State(state): State<AppState>,
    Json(fields): Json<Value>,
) -> Result<StatusCode, ApiError> {
    if !fields.is_object() {
        return Err(ApiError::Conflict("status fields must be an object".to_string()));
    }
    state.set_status(fields).await;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}
