use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::{RescanInfo, StatusPayload};
use crate::schedule::{project_schedule, ProgressModel, ScheduledTransaction};

/// Runtime knowledge of an optional backend capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Capability {
    #[default]
    Unknown,
    Supported,
    Unsupported,
}

impl Capability {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Capability::Unsupported)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Availability {
    /// Nothing heard from the service yet
    #[default]
    Unknown,
    Reachable,
    /// Too many consecutive polls failed
    Unreachable,
}

/// Point-in-time view of the backend service
///
/// Never mutated once published; every update produces a new value.
/// `None` fields are unknown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatusSnapshot {
    pub sequence: u64,
    pub observed_at: DateTime<Utc>,
    pub availability: Availability,
    /// Last known values retained while the source is reconnecting or failing
    pub stale: bool,
    pub push_support: Capability,
    pub progress_reporting: Capability,
    pub session_active: Option<bool>,
    pub wallet_name: Option<String>,
    pub maker_running: Option<bool>,
    pub coinjoin_in_progress: Option<bool>,
    pub rescanning: Option<bool>,
    /// Fraction in [0, 1]
    pub rescan_progress: Option<f64>,
    pub schedule: Option<Vec<ScheduledTransaction>>,
    pub nickname: Option<String>,
}

impl ServiceStatusSnapshot {
    /// Snapshot with every service field unknown
    pub fn unknown(sequence: u64, push_support: Capability, progress_reporting: Capability) -> Self {
        Self {
            sequence,
            observed_at: Utc::now(),
            availability: Availability::Unknown,
            stale: false,
            push_support,
            progress_reporting,
            session_active: None,
            wallet_name: None,
            maker_running: None,
            coinjoin_in_progress: None,
            rescanning: None,
            rescan_progress: None,
            schedule: None,
            nickname: None,
        }
    }

    /// Build a fresh snapshot from a payload, replacing every service field
    pub fn from_payload(
        sequence: u64,
        payload: StatusPayload,
        push_support: Capability,
        progress_reporting: Capability,
    ) -> Self {
        Self {
            sequence,
            observed_at: Utc::now(),
            availability: Availability::Reachable,
            stale: false,
            push_support,
            progress_reporting,
            session_active: payload.session,
            maker_running: payload.maker_running(),
            coinjoin_in_progress: payload.coinjoin_in_progress(),
            rescanning: payload.rescanning,
            rescan_progress: payload.progress.and_then(valid_fraction),
            wallet_name: payload.wallet_name.name().map(str::to_string),
            schedule: payload.schedule,
            nickname: payload.nickname,
        }
    }

    /// Copy of this snapshot with new metadata, service fields untouched
    pub(crate) fn restamped(&self, sequence: u64) -> Self {
        Self {
            sequence,
            observed_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Progress of the running schedule, if one is reported
    pub fn schedule_progress(&self) -> Option<ProgressModel> {
        self.schedule
            .as_deref()
            .filter(|schedule| !schedule.is_empty())
            .map(project_schedule)
    }
}

/// Fill rescan fields the session payload left unknown
pub(crate) fn merge_rescan_info(payload: &mut StatusPayload, info: RescanInfo) {
    if payload.rescanning.is_none() {
        payload.rescanning = info.rescanning;
    }
    if payload.progress.is_none() {
        payload.progress = info.progress;
    }
}

fn valid_fraction(value: f64) -> Option<f64> {
    if (0.0..=1.0).contains(&value) {
        Some(value)
    } else {
        log::debug!("Ignoring rescan progress outside [0, 1]: {}", value);
        None
    }
}
