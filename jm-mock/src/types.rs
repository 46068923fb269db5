/// jmwalletd request and response types
///
/// Field names match the daemon's JSON so clients consume them unchanged.

use serde::{Deserialize, Serialize};

/// Body of POST /api/v1/wallet/{walletname}/unlock
#[derive(Debug, Clone, Deserialize)]
pub struct UnlockRequest {
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockResponse {
    pub walletname: String,
    pub token: String,
    pub refresh_token: String,
}

/// Response of GET /api/v1/wallet/{walletname}/lock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockResponse {
    pub walletname: String,
    pub already_locked: bool,
}

/// Body of POST /api/v1/token
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    pub refresh_token: String,
}

/// Response of GET /api/v1/wallet/{walletname}/getrescaninfo
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RescanInfoResponse {
    pub rescanning: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

/// Error body used by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

/// Response of POST /mock/notify
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyResponse {
    pub delivered_to: usize,
}
