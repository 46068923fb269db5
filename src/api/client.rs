use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, Url};

use super::types::{
    ApiErrorBody, RescanInfo, StatusPayload, TokenRefreshRequest, TokenResponse,
    UnlockWalletRequest, UnlockWalletResponse,
};
use crate::config::SyncConfig;
use crate::error::SyncError;

/// Header the reverse proxy forwards to jmwalletd as `Authorization`
pub const AUTH_HEADER: &str = "x-jm-authorization";

/// HTTP client for the jmwalletd REST API and the Jam features endpoint
#[derive(Clone)]
pub struct JmApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl JmApiClient {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Session status; the token is optional since jmwalletd answers either way
    pub async fn get_session(&self, token: Option<&str>) -> Result<StatusPayload, SyncError> {
        let url = self.endpoint(&["api", "v1", "session"])?;
        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.header(AUTH_HEADER, bearer(token));
        }
        let response = check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    pub async fn get_rescan_info(
        &self,
        token: &str,
        wallet_name: &str,
    ) -> Result<RescanInfo, SyncError> {
        let url = self.endpoint(&["api", "v1", "wallet", wallet_name, "getrescaninfo"])?;
        let response = self
            .client
            .get(url)
            .header(AUTH_HEADER, bearer(token))
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    /// Raw features document; only JSON bodies are accepted
    pub async fn get_features(&self, token: &str) -> Result<serde_json::Value, SyncError> {
        let url = self.endpoint(&["jam", "api", "v0", "features"])?;
        let response = self
            .client
            .get(url)
            .header(AUTH_HEADER, bearer(token))
            .send()
            .await?;
        let response = check(response).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("application/json") {
            return Err(SyncError::UnexpectedContentType(content_type));
        }

        Ok(response.json().await?)
    }

    /// Exchange wallet name and password for bearer tokens
    pub async fn unlock_wallet(
        &self,
        wallet_name: &str,
        password: &str,
    ) -> Result<UnlockWalletResponse, SyncError> {
        let url = self.endpoint(&["api", "v1", "wallet", wallet_name, "unlock"])?;
        log::info!("Unlocking wallet {}", wallet_name);
        let response = self
            .client
            .post(url)
            .json(&UnlockWalletRequest { password })
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    /// Block access to the wallet; further requests with the token fail
    pub async fn lock_wallet(&self, token: &str, wallet_name: &str) -> Result<(), SyncError> {
        let url = self.endpoint(&["api", "v1", "wallet", wallet_name, "lock"])?;
        log::info!("Locking wallet {}", wallet_name);
        let response = self
            .client
            .get(url)
            .header(AUTH_HEADER, bearer(token))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, SyncError> {
        let url = self.endpoint(&["api", "v1", "token"])?;
        let response = self
            .client
            .post(url)
            .json(&TokenRefreshRequest {
                grant_type: "refresh_token",
                refresh_token,
            })
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SyncError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SyncError::InvalidConfig(format!("base URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidConfig(format!("base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

pub(crate) fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Pass successful responses through, classify the rest
async fn check(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let fallback = status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string();
    let message = match response.json::<ApiErrorBody>().await {
        Ok(body) => body.message,
        Err(_) => fallback,
    };
    Err(SyncError::from_status(status.as_u16(), message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_wallet_name() {
        let client = JmApiClient::with_base_url("http://localhost:28183/");
        let url = client
            .endpoint(&["api", "v1", "wallet", "my wallet.jmdat", "lock"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:28183/api/v1/wallet/my%20wallet.jmdat/lock"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = JmApiClient::with_base_url("https://host/jam");
        let url = client.endpoint(&["api", "v1", "session"]).unwrap();
        assert_eq!(url.as_str(), "https://host/jam/api/v1/session");
    }

    #[test]
    fn test_invalid_base_url() {
        let client = JmApiClient::with_base_url("not a url");
        assert!(matches!(
            client.endpoint(&["api"]),
            Err(SyncError::InvalidConfig(_))
        ));
    }
}
