use std::sync::Arc;

use tokio::sync::watch;

use super::snapshot::{merge_rescan_info, Availability, Capability, ServiceStatusSnapshot};
use super::transport::FetchOutcome;
use crate::api::{ActiveWallet, RescanInfo, StatusPayload};

/// Lifecycle of the status channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No credential; nothing is fetched
    Disconnected,
    /// Establishing push; polling keeps the snapshot fresh meanwhile
    Connecting,
    Live(TransportMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Push,
    /// Push is unavailable on this backend
    PollingOnly,
}

/// Notifications for the embedding application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The backend rejected the credential; the channel has disconnected
    Unauthorized,
    /// The backend reports a different active wallet than the credential's
    WalletMismatch {
        expected: String,
        active: Option<String>,
    },
}

/// Identifies one dispatched poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PollTicket {
    pub epoch: u64,
    pub generation: u64,
    pub fetch_rescan: bool,
}

/// Everything one poll brought back
#[derive(Debug, Clone)]
pub(crate) struct PollReport {
    pub session: FetchOutcome<StatusPayload>,
    pub rescan: Option<FetchOutcome<RescanInfo>>,
}

/// State machine behind the status channel
///
/// Pure bookkeeping with no I/O. The driver feeds it transport results and
/// it publishes snapshots. Results are accepted only when they belong to
/// the current epoch (bumped on every start and teardown) and are newer
/// than the last applied generation.
pub(crate) struct ChannelCore {
    unreachable_after: u32,
    state: watch::Sender<ChannelState>,
    snapshot: watch::Sender<Arc<ServiceStatusSnapshot>>,
    push_support: Capability,
    progress_reporting: Capability,
    epoch: u64,
    issued: u64,
    applied: u64,
    failures: u32,
    sequence: u64,
    expected_wallet: Option<String>,
    mismatch_reported: bool,
    /// Last accepted poll, the base that partial push frames are laid over
    polled: Option<StatusPayload>,
}

impl ChannelCore {
    pub fn new(unreachable_after: u32) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        let (snapshot, _) = watch::channel(Arc::new(ServiceStatusSnapshot::unknown(
            0,
            Capability::Unknown,
            Capability::Unknown,
        )));
        Self {
            unreachable_after: unreachable_after.max(1),
            state,
            snapshot,
            push_support: Capability::Unknown,
            progress_reporting: Capability::Unknown,
            epoch: 0,
            issued: 0,
            applied: 0,
            failures: 0,
            sequence: 0,
            expected_wallet: None,
            mismatch_reported: false,
            polled: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<Arc<ServiceStatusSnapshot>> {
        self.snapshot.subscribe()
    }

    pub fn current(&self) -> Arc<ServiceStatusSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn push_support(&self) -> Capability {
        self.push_support
    }

    /// Begin a session for a new credential
    ///
    /// Returns whether the driver should attempt push.
    pub fn start(&mut self, expected_wallet: Option<String>) -> bool {
        self.epoch += 1;
        self.failures = 0;
        self.expected_wallet = expected_wallet;
        self.mismatch_reported = false;
        self.polled = None;

        if self.push_support.is_unsupported() {
            self.set_state(ChannelState::Live(TransportMode::PollingOnly));
            false
        } else {
            self.set_state(ChannelState::Connecting);
            true
        }
    }

    /// Drop back to Disconnected; in-flight results become stale
    pub fn teardown(&mut self) {
        self.epoch += 1;
        self.failures = 0;
        self.expected_wallet = None;
        self.mismatch_reported = false;
        self.polled = None;
        self.set_state(ChannelState::Disconnected);

        self.sequence += 1;
        let snapshot =
            ServiceStatusSnapshot::unknown(self.sequence, self.push_support, self.progress_reporting);
        self.snapshot.send_replace(Arc::new(snapshot));
    }

    pub fn push_connected(&mut self) {
        if self.state() == ChannelState::Disconnected {
            return;
        }
        self.failures = 0;
        self.set_state(ChannelState::Live(TransportMode::Push));
        if self.push_support != Capability::Supported {
            self.push_support = Capability::Supported;
            self.republish(|_| {});
        }
    }

    /// The backend has no push endpoint; remembered for the channel's lifetime
    pub fn push_unsupported(&mut self) {
        log::info!("Push notifications unsupported, falling back to polling");
        self.push_support = Capability::Unsupported;
        if self.state() != ChannelState::Disconnected {
            self.set_state(ChannelState::Live(TransportMode::PollingOnly));
        }
        self.republish(|_| {});
    }

    /// Push stream closed or a connect attempt failed transiently
    ///
    /// Only losing a live stream makes the snapshot stale; while connecting,
    /// polls keep it fresh.
    pub fn push_lost(&mut self) {
        match self.state() {
            ChannelState::Disconnected => {}
            ChannelState::Live(TransportMode::Push) => {
                self.set_state(ChannelState::Connecting);
                if !self.current().stale {
                    self.republish(|snapshot| snapshot.stale = true);
                }
            }
            _ => self.set_state(ChannelState::Connecting),
        }
    }

    /// Apply a pushed frame; ignored unless push is the live transport
    ///
    /// Frames are partial: the fields they state are laid over the last
    /// accepted poll. Frames stating nothing about the service are dropped.
    pub fn apply_push(&mut self, frame: StatusPayload) -> Option<ChannelEvent> {
        if self.state() != ChannelState::Live(TransportMode::Push) {
            log::debug!("Dropping push frame in state {:?}", self.state());
            return None;
        }
        if frame.is_empty() {
            log::debug!("Ignoring push frame without status fields");
            return None;
        }
        self.issued += 1;
        self.applied = self.issued;
        self.failures = 0;

        let payload = match &self.polled {
            Some(polled) => polled.clone().overlay(frame),
            None => frame,
        };
        self.publish_payload(payload)
    }

    /// Reserve a generation for a poll, unless disconnected
    pub fn begin_poll(&mut self) -> Option<PollTicket> {
        if self.state() == ChannelState::Disconnected {
            return None;
        }
        self.issued += 1;
        Some(PollTicket {
            epoch: self.epoch,
            generation: self.issued,
            fetch_rescan: !self.progress_reporting.is_unsupported(),
        })
    }

    pub fn finish_poll(&mut self, ticket: PollTicket, report: PollReport) -> Option<ChannelEvent> {
        if ticket.epoch != self.epoch || self.state() == ChannelState::Disconnected {
            log::debug!("Discarding poll from epoch {}", ticket.epoch);
            return None;
        }
        if ticket.generation <= self.applied {
            log::debug!(
                "Discarding poll {} superseded by {}",
                ticket.generation,
                self.applied
            );
            return None;
        }

        let mut payload = match report.session {
            FetchOutcome::Ok(payload) => payload,
            FetchOutcome::Unauthorized => return Some(self.unauthorized()),
            FetchOutcome::NotFound => {
                self.poll_failed("session endpoint not found");
                return None;
            }
            FetchOutcome::Failed(reason) => {
                self.poll_failed(&reason);
                return None;
            }
        };

        match report.rescan {
            Some(FetchOutcome::Ok(info)) => {
                self.progress_reporting = Capability::Supported;
                merge_rescan_info(&mut payload, info);
            }
            Some(FetchOutcome::NotFound) => {
                log::info!("Rescan progress not reported by this backend");
                self.progress_reporting = Capability::Unsupported;
            }
            Some(FetchOutcome::Unauthorized) => return Some(self.unauthorized()),
            Some(FetchOutcome::Failed(reason)) => {
                log::debug!("Rescan info request failed: {}", reason);
            }
            None => {}
        }

        self.applied = ticket.generation;
        self.failures = 0;
        self.polled = Some(payload.clone());
        self.publish_payload(payload)
    }

    /// Credential rejected: tear down and report
    pub fn unauthorized(&mut self) -> ChannelEvent {
        log::warn!("Backend rejected the credential, disconnecting status channel");
        self.teardown();
        ChannelEvent::Unauthorized
    }

    fn poll_failed(&mut self, reason: &str) {
        self.failures += 1;
        log::warn!(
            "Status poll failed ({}/{}): {}",
            self.failures,
            self.unreachable_after,
            reason
        );

        let current = self.current();
        if self.failures >= self.unreachable_after
            && current.availability != Availability::Unreachable
        {
            log::error!("Service unreachable after {} failed polls", self.failures);
            self.republish(|snapshot| {
                snapshot.availability = Availability::Unreachable;
                snapshot.stale = true;
            });
        }
    }

    fn publish_payload(&mut self, payload: StatusPayload) -> Option<ChannelEvent> {
        let active = payload.wallet_name.clone();
        self.sequence += 1;
        let snapshot = ServiceStatusSnapshot::from_payload(
            self.sequence,
            payload,
            self.push_support,
            self.progress_reporting,
        );
        self.snapshot.send_replace(Arc::new(snapshot));
        self.check_wallet(&active)
    }

    /// Compare the reported wallet with the credential's
    ///
    /// Only a payload that names the active wallet, or states that none is
    /// unlocked, can mismatch.
    fn check_wallet(&mut self, active: &ActiveWallet) -> Option<ChannelEvent> {
        let expected = self.expected_wallet.as_ref()?;
        let active = match active {
            ActiveWallet::Unknown => return None,
            ActiveWallet::Locked => None,
            ActiveWallet::Named(name) => Some(name.clone()),
        };
        if active.as_deref() == Some(expected.as_str()) {
            self.mismatch_reported = false;
            return None;
        }
        if self.mismatch_reported {
            return None;
        }

        log::warn!(
            "Active wallet {:?} does not match session wallet {}",
            active,
            expected
        );
        self.mismatch_reported = true;
        Some(ChannelEvent::WalletMismatch {
            expected: expected.clone(),
            active,
        })
    }

    fn republish(&mut self, edit: impl FnOnce(&mut ServiceStatusSnapshot)) {
        self.sequence += 1;
        let mut snapshot = self.current().restamped(self.sequence);
        snapshot.push_support = self.push_support;
        snapshot.progress_reporting = self.progress_reporting;
        edit(&mut snapshot);
        self.snapshot.send_replace(Arc::new(snapshot));
    }

    fn set_state(&mut self, state: ChannelState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            log::debug!("Status channel {:?} -> {:?}", current, state);
            *current = state;
            true
        });
    }
}
