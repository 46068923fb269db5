//! Status transports
//!
//! The channel talks to the backend through two seams: a pull source for
//! periodic polls and a push connector for the websocket. Both classify
//! failures into named outcomes so capability detection never depends on
//! inspecting raw errors.

use futures::future::{self, BoxFuture};
use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::api::{JmApiClient, RescanInfo, StatusPayload};
use crate::error::SyncError;

/// Result of one pull request, classified
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    Ok(T),
    /// The endpoint does not exist on this backend
    NotFound,
    Unauthorized,
    /// Transport error, unexpected status or malformed body
    Failed(String),
}

impl<T> From<Result<T, SyncError>> for FetchOutcome<T> {
    fn from(result: Result<T, SyncError>) -> Self {
        match result {
            Ok(value) => FetchOutcome::Ok(value),
            Err(SyncError::NotFound(_)) => FetchOutcome::NotFound,
            Err(SyncError::Unauthorized(_)) => FetchOutcome::Unauthorized,
            Err(e) => FetchOutcome::Failed(e.to_string()),
        }
    }
}

/// Pull side: session status and rescan progress
pub trait StatusSource: Send + Sync + 'static {
    fn fetch_session(&self, token: &str) -> BoxFuture<'static, FetchOutcome<StatusPayload>>;

    fn fetch_rescan_info(
        &self,
        token: &str,
        wallet_name: &str,
    ) -> BoxFuture<'static, FetchOutcome<RescanInfo>>;
}

impl StatusSource for JmApiClient {
    fn fetch_session(&self, token: &str) -> BoxFuture<'static, FetchOutcome<StatusPayload>> {
        let client = self.clone();
        let token = token.to_string();
        Box::pin(async move { client.get_session(Some(&token)).await.into() })
    }

    fn fetch_rescan_info(
        &self,
        token: &str,
        wallet_name: &str,
    ) -> BoxFuture<'static, FetchOutcome<RescanInfo>> {
        let client = self.clone();
        let token = token.to_string();
        let wallet_name = wallet_name.to_string();
        Box::pin(async move { client.get_rescan_info(&token, &wallet_name).await.into() })
    }
}

/// Why a push connection attempt did not produce a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushRejection {
    /// The backend has no push endpoint; never worth retrying
    Unsupported,
    Unauthorized,
    /// Transient; retry with backoff
    Failed(String),
}

/// Decoded status frames; the stream ends when the connection closes
pub type PushStream = BoxStream<'static, StatusPayload>;

/// Push side: opens an authenticated notification stream
pub trait PushConnector: Send + Sync + 'static {
    fn connect(&self, token: &str) -> BoxFuture<'static, Result<PushStream, PushRejection>>;
}

/// jmwalletd websocket at `/jmws`
///
/// The daemon only delivers notifications to sockets that sent a valid
/// token as their first frame.
#[derive(Clone, Debug)]
pub struct WebsocketConnector {
    url: String,
}

impl WebsocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl PushConnector for WebsocketConnector {
    fn connect(&self, token: &str) -> BoxFuture<'static, Result<PushStream, PushRejection>> {
        let url = self.url.clone();
        let token = token.to_string();

        Box::pin(async move {
            log::debug!("Connecting websocket {}", url);
            let (mut ws, _) = connect_async(url.as_str()).await.map_err(classify_handshake)?;

            ws.send(Message::Text(token))
                .await
                .map_err(|e| PushRejection::Failed(format!("sending token: {}", e)))?;

            let frames = ws
                .take_while(|frame| {
                    if let Err(e) = frame {
                        log::warn!("Websocket read error: {}", e);
                    }
                    future::ready(frame.is_ok())
                })
                .filter_map(|frame| {
                    future::ready(match frame {
                        Ok(Message::Text(text)) => decode_frame(&text),
                        _ => None,
                    })
                });

            Ok(frames.boxed())
        })
    }
}

fn classify_handshake(error: tungstenite::Error) -> PushRejection {
    match error {
        tungstenite::Error::Http(response) => match response.status().as_u16() {
            401 | 403 => PushRejection::Unauthorized,
            400 | 404 | 405 | 426 | 501 => PushRejection::Unsupported,
            status => PushRejection::Failed(format!("handshake rejected with status {}", status)),
        },
        other => PushRejection::Failed(other.to_string()),
    }
}

fn decode_frame(text: &str) -> Option<StatusPayload> {
    match serde_json::from_str::<StatusPayload>(text) {
        Ok(payload) if payload.is_empty() => {
            log::debug!("Ignoring websocket frame without status fields: {}", text);
            None
        }
        Ok(payload) => Some(payload),
        Err(e) => {
            log::debug!("Ignoring undecodable websocket frame ({}): {}", e, text);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ActiveWallet;

    #[test]
    fn test_fetch_outcome_classification() {
        let not_found: FetchOutcome<()> = Err(SyncError::from_status(404, "gone")).into();
        assert_eq!(not_found, FetchOutcome::NotFound);

        let unauthorized: FetchOutcome<()> = Err(SyncError::from_status(401, "")).into();
        assert_eq!(unauthorized, FetchOutcome::Unauthorized);

        let failed: FetchOutcome<()> = Err(SyncError::from_status(500, "boom")).into();
        assert!(matches!(failed, FetchOutcome::Failed(_)));
    }

    #[test]
    fn test_decode_frame() {
        let payload = decode_frame(r#"{"coinjoin_state": 0}"#).unwrap();
        assert_eq!(payload.coinjoin_in_progress(), Some(true));
        assert_eq!(payload.wallet_name, ActiveWallet::Unknown);
        assert!(decode_frame("not json").is_none());
        assert!(decode_frame("[1, 2]").is_none());
    }

    #[test]
    fn test_transaction_notification_frame_dropped() {
        let frame = r#"{"txid": "ab12", "txdetails": {"hex": "0200", "inputs": [], "outputs": []}}"#;
        assert!(decode_frame(frame).is_none());
    }
}
