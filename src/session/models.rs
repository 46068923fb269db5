//! Data models for session persistence

use serde::{Deserialize, Serialize};

/// Bearer tokens issued by jmwalletd on unlock or refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// The single JSON object persisted under the session key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(
        rename = "walletFileName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub wallet_file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashed_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthTokens>,
}

impl PersistedSession {
    pub fn is_empty(&self) -> bool {
        self.wallet_file_name.is_none() && self.hashed_password.is_none() && self.auth.is_none()
    }

    /// Derive the live credential, if the session carries a token
    pub fn credential(&self) -> Option<Credential> {
        let auth = self.auth.as_ref()?;
        if auth.token.is_empty() {
            return None;
        }
        Some(Credential {
            wallet_id: self.wallet_file_name.clone(),
            token: auth.token.clone(),
            refresh_token: auth.refresh_token.clone(),
        })
    }

    /// Merge a partial update; returns whether anything changed
    pub fn merge(&mut self, update: SessionUpdate) -> bool {
        let before = self.clone();

        if let Some(name) = update.wallet_file_name {
            self.wallet_file_name = Some(name);
        }
        if let Some(hashed) = update.hashed_password {
            self.hashed_password = Some(hashed);
        }
        match (update.token, update.refresh_token) {
            (Some(token), refresh_token) => {
                let refresh_token = refresh_token
                    .or_else(|| self.auth.as_ref().and_then(|a| a.refresh_token.clone()));
                self.auth = Some(AuthTokens {
                    token,
                    refresh_token,
                });
            }
            (None, Some(refresh_token)) => {
                if let Some(auth) = self.auth.as_mut() {
                    auth.refresh_token = Some(refresh_token);
                }
            }
            (None, None) => {}
        }

        *self != before
    }
}

/// Bearer credential authorizing requests for one wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Wallet file name (`<name>.jmdat`), when known
    pub wallet_id: Option<String>,
    pub token: String,
    pub refresh_token: Option<String>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            wallet_id: None,
            token: token.into(),
            refresh_token: None,
        }
    }

    pub fn for_wallet(wallet_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            wallet_id: Some(wallet_id.into()),
            token: token.into(),
            refresh_token: None,
        }
    }
}

/// Partial session fields passed to `CredentialStore::update`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    pub wallet_file_name: Option<String>,
    pub hashed_password: Option<String>,
    pub token: Option<String>,
    pub refresh_token: Option<String>,
}

impl SessionUpdate {
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Default::default()
        }
    }

    pub fn wallet(mut self, wallet_file_name: impl Into<String>) -> Self {
        self.wallet_file_name = Some(wallet_file_name.into());
        self
    }

    pub fn refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn hashed_password(mut self, hashed_password: impl Into<String>) -> Self {
        self.hashed_password = Some(hashed_password.into());
        self
    }
}
