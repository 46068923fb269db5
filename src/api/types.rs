// jmwalletd API request/response types

use serde::{Deserialize, Deserializer, Serialize};

use crate::schedule::ScheduledTransaction;

/// Status object served by `GET /api/v1/session` and pushed over the websocket
///
/// Every field is optional: an absent field is unknown, never false.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatusPayload {
    #[serde(default)]
    pub session: Option<bool>,
    #[serde(default)]
    pub maker_running: Option<bool>,
    #[serde(default)]
    pub coinjoin_in_process: Option<bool>,
    #[serde(default)]
    pub wallet_name: ActiveWallet,
    #[serde(default)]
    pub rescanning: Option<bool>,
    #[serde(default, alias = "rescan_progress")]
    pub progress: Option<f64>,
    /// A schedule that fails to parse is treated as unknown
    #[serde(default, deserialize_with = "lenient_schedule")]
    pub schedule: Option<Vec<ScheduledTransaction>>,
    #[serde(default)]
    pub nickname: Option<String>,
    /// Websocket-only: 0 taker running, 1 maker running, 2 none running
    #[serde(default)]
    pub coinjoin_state: Option<i64>,
}

pub const CJ_STATE_TAKER_RUNNING: i64 = 0;
pub const CJ_STATE_MAKER_RUNNING: i64 = 1;
pub const CJ_STATE_NONE_RUNNING: i64 = 2;

impl StatusPayload {
    /// Maker flag, falling back to the websocket `coinjoin_state`
    pub fn maker_running(&self) -> Option<bool> {
        self.maker_running
            .or_else(|| self.coinjoin_state.map(|s| s == CJ_STATE_MAKER_RUNNING))
    }

    /// Taker flag, falling back to the websocket `coinjoin_state`
    pub fn coinjoin_in_progress(&self) -> Option<bool> {
        self.coinjoin_in_process
            .or_else(|| self.coinjoin_state.map(|s| s == CJ_STATE_TAKER_RUNNING))
    }

    /// Whether the payload states nothing about the service
    ///
    /// jmwalletd also pushes transaction notifications (`txid`, `txdetails`)
    /// over the websocket; those decode to an empty payload.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Lay a partial frame over this payload
    ///
    /// Fields the frame states win, the rest are kept. A `coinjoin_state`
    /// in the frame replaces both maker and taker flags.
    pub fn overlay(mut self, frame: StatusPayload) -> Self {
        if frame.coinjoin_state.is_some() {
            self.maker_running = None;
            self.coinjoin_in_process = None;
        }
        let wallet_name = if frame.wallet_name.is_known() {
            frame.wallet_name
        } else {
            self.wallet_name
        };
        Self {
            session: frame.session.or(self.session),
            maker_running: frame.maker_running.or(self.maker_running),
            coinjoin_in_process: frame.coinjoin_in_process.or(self.coinjoin_in_process),
            wallet_name,
            rescanning: frame.rescanning.or(self.rescanning),
            progress: frame.progress.or(self.progress),
            schedule: frame.schedule.or(self.schedule),
            nickname: frame.nickname.or(self.nickname),
            coinjoin_state: frame.coinjoin_state.or(self.coinjoin_state),
        }
    }
}

/// Active wallet as the daemon reports it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ActiveWallet {
    /// The payload does not say
    #[default]
    Unknown,
    /// No wallet is unlocked; jmwalletd reports the literal string "None"
    Locked,
    Named(String),
}

impl ActiveWallet {
    pub fn named(name: impl Into<String>) -> Self {
        ActiveWallet::Named(name.into())
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ActiveWallet::Unknown)
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ActiveWallet::Named(name) => Some(name),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for ActiveWallet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name: Option<String> = Option::deserialize(deserializer)?;
        Ok(match name {
            None => ActiveWallet::Unknown,
            Some(name) if name == "None" || name.is_empty() => ActiveWallet::Locked,
            Some(name) => ActiveWallet::Named(name),
        })
    }
}

fn lenient_schedule<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<ScheduledTransaction>>, D::Error> {
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match serde_json::from_value(value) {
        Ok(schedule) => Some(schedule),
        Err(e) => {
            log::warn!("Ignoring malformed schedule: {}", e);
            None
        }
    }))
}

/// `GET /api/v1/wallet/{wallet}/getrescaninfo`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RescanInfo {
    #[serde(default)]
    pub rescanning: Option<bool>,
    #[serde(default)]
    pub progress: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct UnlockWalletRequest<'a> {
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnlockWalletResponse {
    pub walletname: String,
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenRefreshRequest<'a> {
    pub grant_type: &'static str,
    pub refresh_token: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_name_none_string_means_locked() {
        let payload: StatusPayload = serde_json::from_str(
            r#"{"session": false, "maker_running": false, "coinjoin_in_process": false, "wallet_name": "None"}"#,
        )
        .unwrap();
        assert_eq!(payload.wallet_name, ActiveWallet::Locked);
        assert_eq!(payload.wallet_name.name(), None);
        assert_eq!(payload.session, Some(false));
    }

    #[test]
    fn test_missing_wallet_name_is_unknown() {
        let payload: StatusPayload = serde_json::from_str(r#"{"coinjoin_state": 2}"#).unwrap();
        assert_eq!(payload.wallet_name, ActiveWallet::Unknown);

        let payload: StatusPayload =
            serde_json::from_str(r#"{"wallet_name": "alice.jmdat"}"#).unwrap();
        assert_eq!(payload.wallet_name, ActiveWallet::named("alice.jmdat"));
    }

    #[test]
    fn test_malformed_schedule_keeps_other_fields() {
        let payload: StatusPayload = serde_json::from_str(
            r#"{"session": true, "wallet_name": "alice.jmdat",
                "schedule": [[0, 0.1, 9, "INTERNAL", 1.5, 16, null]]}"#,
        )
        .unwrap();
        assert_eq!(payload.schedule, None);
        assert_eq!(payload.session, Some(true));
        assert_eq!(payload.wallet_name.name(), Some("alice.jmdat"));

        let payload: StatusPayload =
            serde_json::from_str(r#"{"schedule": [[0, 0.1, 9, "INTERNAL", 1.5, 16, 1, "extra"]]}"#)
                .unwrap();
        assert_eq!(payload.schedule, None);
    }

    #[test]
    fn test_transaction_notification_is_empty() {
        let payload: StatusPayload =
            serde_json::from_str(r#"{"txid": "ab", "txdetails": {}}"#).unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn test_overlay_coinjoin_state_frame() {
        let polled = StatusPayload {
            session: Some(true),
            maker_running: Some(false),
            coinjoin_in_process: Some(false),
            wallet_name: ActiveWallet::named("alice.jmdat"),
            rescanning: Some(true),
            ..Default::default()
        };
        let frame: StatusPayload = serde_json::from_str(r#"{"coinjoin_state": 1}"#).unwrap();

        let merged = polled.overlay(frame);
        assert_eq!(merged.maker_running(), Some(true));
        assert_eq!(merged.coinjoin_in_progress(), Some(false));
        assert_eq!(merged.session, Some(true));
        assert_eq!(merged.rescanning, Some(true));
        assert_eq!(merged.wallet_name.name(), Some("alice.jmdat"));
    }

    #[test]
    fn test_absent_fields_stay_unknown() {
        let payload: StatusPayload = serde_json::from_str(r#"{"rescanning": true}"#).unwrap();
        assert_eq!(payload.rescanning, Some(true));
        assert_eq!(payload.progress, None);
        assert_eq!(payload.maker_running(), None);
        assert_eq!(payload.session, None);
    }

    #[test]
    fn test_coinjoin_state_maps_to_flags() {
        let payload: StatusPayload = serde_json::from_str(r#"{"coinjoin_state": 1}"#).unwrap();
        assert_eq!(payload.maker_running(), Some(true));
        assert_eq!(payload.coinjoin_in_progress(), Some(false));

        let payload: StatusPayload = serde_json::from_str(r#"{"coinjoin_state": 2}"#).unwrap();
        assert_eq!(payload.maker_running(), Some(false));
        assert_eq!(payload.coinjoin_in_progress(), Some(false));
    }
}
