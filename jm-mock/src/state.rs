/// In-memory daemon state shared by all handlers

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde_json::{json, Map, Value};
use tokio::sync::{broadcast, RwLock};

use crate::types::RescanInfoResponse;

const NOTIFICATION_CAPACITY: usize = 64;

#[derive(Default)]
struct Backend {
    /// Wallet name -> password
    wallets: HashMap<String, String>,
    /// Access token -> wallet name
    tokens: HashMap<String, String>,
    /// Refresh token -> wallet name
    refresh_tokens: HashMap<String, String>,
    active_wallet: Option<String>,
    /// Extra fields merged into the session response
    status: Map<String, Value>,
    /// `None` makes the features endpoint answer 404
    features: Option<Value>,
    /// `None` makes the rescan endpoint answer 404
    rescan: Option<RescanInfoResponse>,
}

pub struct MockState {
    backend: RwLock<Backend>,
    notifications: broadcast::Sender<String>,
    websocket_enabled: AtomicBool,
    next_token: AtomicU64,
}

impl Default for MockState {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    pub fn new() -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            backend: RwLock::new(Backend::default()),
            notifications,
            websocket_enabled: AtomicBool::new(true),
            next_token: AtomicU64::new(1),
        }
    }

    pub fn with_wallet(mut self, name: &str, password: &str) -> Self {
        self.backend
            .get_mut()
            .wallets
            .insert(name.to_string(), password.to_string());
        self
    }

    pub fn with_features(mut self, features: Value) -> Self {
        self.backend.get_mut().features = Some(features);
        self
    }

    pub fn with_rescan(mut self, rescanning: bool, progress: Option<f64>) -> Self {
        self.backend.get_mut().rescan = Some(RescanInfoResponse {
            rescanning,
            progress,
        });
        self
    }

    /// Answer the websocket upgrade with 404, like a daemon without push
    pub fn without_websocket(self) -> Self {
        self.websocket_enabled.store(false, Ordering::SeqCst);
        self
    }

    pub fn websocket_enabled(&self) -> bool {
        self.websocket_enabled.load(Ordering::SeqCst)
    }

    /// Unlock a wallet, returning (token, refresh_token)
    pub async fn unlock(&self, wallet: &str, password: &str) -> Option<(String, String)> {
        let mut backend = self.backend.write().await;
        if backend.wallets.get(wallet).map(String::as_str) != Some(password) {
            return None;
        }

        let (token, refresh_token) = self.issue_tokens();
        backend.tokens.insert(token.clone(), wallet.to_string());
        backend
            .refresh_tokens
            .insert(refresh_token.clone(), wallet.to_string());
        backend.active_wallet = Some(wallet.to_string());
        Some((token, refresh_token))
    }

    /// Lock the active wallet; returns whether it was already locked
    pub async fn lock(&self, wallet: &str) -> bool {
        let mut backend = self.backend.write().await;
        let was_active = backend.active_wallet.as_deref() == Some(wallet);
        backend.tokens.retain(|_, w| w != wallet);
        backend.refresh_tokens.retain(|_, w| w != wallet);
        if was_active {
            backend.active_wallet = None;
        }
        !was_active
    }

    /// Trade a refresh token for a fresh pair
    pub async fn refresh(&self, refresh_token: &str) -> Option<(String, String)> {
        let mut backend = self.backend.write().await;
        let wallet = backend.refresh_tokens.remove(refresh_token)?;

        let (token, refresh_token) = self.issue_tokens();
        backend.tokens.insert(token.clone(), wallet.clone());
        backend.refresh_tokens.insert(refresh_token.clone(), wallet);
        Some((token, refresh_token))
    }

    /// Wallet the token was issued for, if it is still valid
    pub async fn token_wallet(&self, token: &str) -> Option<String> {
        self.backend.read().await.tokens.get(token).cloned()
    }

    /// Invalidate every issued access token
    pub async fn revoke_tokens(&self) {
        self.backend.write().await.tokens.clear();
    }

    /// Session response body
    pub async fn session(&self) -> Value {
        let backend = self.backend.read().await;
        let mut body = json!({
            "session": backend.active_wallet.is_some(),
            "maker_running": false,
            "coinjoin_in_process": false,
            "wallet_name": backend.active_wallet.clone().unwrap_or_else(|| "None".to_string()),
        });
        if let Value::Object(ref mut map) = body {
            for (key, value) in &backend.status {
                map.insert(key.clone(), value.clone());
            }
        }
        body
    }

    /// Merge fields into every following session response
    pub async fn set_status(&self, fields: Value) {
        if let Value::Object(fields) = fields {
            self.backend.write().await.status.extend(fields);
        }
    }

    pub async fn features(&self) -> Option<Value> {
        self.backend.read().await.features.clone()
    }

    pub async fn set_features(&self, features: Option<Value>) {
        self.backend.write().await.features = features;
    }

    pub async fn rescan(&self) -> Option<RescanInfoResponse> {
        self.backend.read().await.rescan
    }

    pub async fn set_rescan(&self, rescan: Option<RescanInfoResponse>) {
        self.backend.write().await.rescan = rescan;
    }

    /// Push a frame to every authenticated websocket; returns the receiver count
    pub fn notify(&self, message: &Value) -> usize {
        self.notifications.send(message.to_string()).unwrap_or(0)
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<String> {
        self.notifications.subscribe()
    }

    fn issue_tokens(&self) -> (String, String) {
        let n = self.next_token.fetch_add(1, Ordering::SeqCst);
        (format!("access-{}", n), format!("refresh-{}", n))
    }
}
