//! Common test utilities for jam-sync integration tests
//!
//! This module provides shared test infrastructure including:
//! - Logging setup
//! - Scripted status sources and push connectors
//! - Waiting on channel snapshots and state
//! - A jmwalletd mock bound to an ephemeral port

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::channel::mpsc;
use futures::future::{self, BoxFuture};
use futures::StreamExt;
use jam_sync::api::{ActiveWallet, RescanInfo, StatusPayload};
use jam_sync::status::{
    ChannelState, FetchOutcome, PushConnector, PushRejection, PushStream,
    ServiceStatusChannel, ServiceStatusSnapshot, StatusSource,
};
use jm_mock::MockState;

/// Upper bound for any single wait; virtual under a paused clock
pub const WAIT: Duration = Duration::from_secs(300);

pub const WALLET: &str = "alice.jmdat";
pub const PASSWORD: &str = "correct horse";

pub fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

/// Session payload of an unlocked wallet
pub fn active_session(wallet: &str) -> StatusPayload {
    StatusPayload {
        session: Some(true),
        wallet_name: ActiveWallet::named(wallet),
        ..Default::default()
    }
}

// ============================================================================
// Scripted status source
// ============================================================================

#[derive(Default)]
struct SourceScript {
    sessions: VecDeque<FetchOutcome<StatusPayload>>,
    fallback: Option<FetchOutcome<StatusPayload>>,
    rescan: Option<FetchOutcome<RescanInfo>>,
    tokens: Vec<String>,
    rescan_calls: usize,
}

/// Answers scripted outcomes first, then the fallback forever
#[derive(Clone, Default)]
pub struct FakeStatusSource {
    script: Arc<Mutex<SourceScript>>,
}

impl FakeStatusSource {
    pub fn answering(payload: StatusPayload) -> Self {
        let source = Self::default();
        source.script.lock().unwrap().fallback = Some(FetchOutcome::Ok(payload));
        source
    }

    pub fn failing() -> Self {
        let source = Self::default();
        source.script.lock().unwrap().fallback =
            Some(FetchOutcome::Failed("connection refused".to_string()));
        source
    }

    /// Queue an outcome ahead of the fallback
    pub fn then(self, outcome: FetchOutcome<StatusPayload>) -> Self {
        self.script.lock().unwrap().sessions.push_back(outcome);
        self
    }

    pub fn with_rescan(self, outcome: FetchOutcome<RescanInfo>) -> Self {
        self.script.lock().unwrap().rescan = Some(outcome);
        self
    }

    /// Tokens of every session request, in order
    pub fn tokens(&self) -> Vec<String> {
        self.script.lock().unwrap().tokens.clone()
    }

    pub fn session_calls(&self) -> usize {
        self.script.lock().unwrap().tokens.len()
    }

    pub fn rescan_calls(&self) -> usize {
        self.script.lock().unwrap().rescan_calls
    }
}

impl StatusSource for FakeStatusSource {
    fn fetch_session(&self, token: &str) -> BoxFuture<'static, FetchOutcome<StatusPayload>> {
        let mut script = self.script.lock().unwrap();
        script.tokens.push(token.to_string());
        let outcome = script
            .sessions
            .pop_front()
            .or_else(|| script.fallback.clone())
            .unwrap_or_else(|| FetchOutcome::Failed("nothing scripted".to_string()));
        Box::pin(future::ready(outcome))
    }

    fn fetch_rescan_info(
        &self,
        _token: &str,
        _wallet_name: &str,
    ) -> BoxFuture<'static, FetchOutcome<RescanInfo>> {
        let mut script = self.script.lock().unwrap();
        script.rescan_calls += 1;
        let outcome = script.rescan.clone().unwrap_or(FetchOutcome::NotFound);
        Box::pin(future::ready(outcome))
    }
}

// ============================================================================
// Scripted push connector
// ============================================================================

enum Attempt {
    Accept(mpsc::UnboundedReceiver<StatusPayload>),
    Reject(PushRejection),
}

struct PushScript {
    attempts: VecDeque<Attempt>,
    fallback: PushRejection,
    connects: usize,
}

/// Plays queued connection attempts, then rejects with the fallback
#[derive(Clone)]
pub struct FakePushConnector {
    script: Arc<Mutex<PushScript>>,
}

impl FakePushConnector {
    /// Transient failures once the queue is drained
    pub fn new() -> Self {
        Self::rejecting(PushRejection::Failed("offline".to_string()))
    }

    pub fn rejecting(rejection: PushRejection) -> Self {
        Self {
            script: Arc::new(Mutex::new(PushScript {
                attempts: VecDeque::new(),
                fallback: rejection,
                connects: 0,
            })),
        }
    }

    /// Queue a successful connection; frames sent on the returned handle
    /// reach the channel, dropping it closes the connection
    pub fn accept(&self) -> mpsc::UnboundedSender<StatusPayload> {
        let (tx, rx) = mpsc::unbounded();
        self.script
            .lock()
            .unwrap()
            .attempts
            .push_back(Attempt::Accept(rx));
        tx
    }

    pub fn connects(&self) -> usize {
        self.script.lock().unwrap().connects
    }
}

impl PushConnector for FakePushConnector {
    fn connect(&self, _token: &str) -> BoxFuture<'static, Result<PushStream, PushRejection>> {
        let mut script = self.script.lock().unwrap();
        script.connects += 1;
        let result = match script.attempts.pop_front() {
            Some(Attempt::Accept(frames)) => Ok(frames.boxed()),
            Some(Attempt::Reject(rejection)) => Err(rejection),
            None => Err(script.fallback.clone()),
        };
        Box::pin(future::ready(result))
    }
}

// ============================================================================
// Waiting
// ============================================================================

pub async fn wait_for_snapshot<F>(
    channel: &ServiceStatusChannel,
    predicate: F,
) -> Arc<ServiceStatusSnapshot>
where
    F: FnMut(&Arc<ServiceStatusSnapshot>) -> bool,
{
    let mut snapshots = channel.subscribe();
    let found = tokio::time::timeout(WAIT, snapshots.wait_for(predicate))
        .await
        .expect("timed out waiting for snapshot")
        .expect("status channel stopped");
    let snapshot = Arc::clone(&found);
    snapshot
}

pub async fn wait_for_state(channel: &ServiceStatusChannel, expected: ChannelState) {
    let mut states = channel.watch_state();
    tokio::time::timeout(WAIT, states.wait_for(|state| *state == expected))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for state {:?}", expected))
        .expect("status channel stopped");
}

/// Poll a condition until it holds
pub async fn wait_until<F: FnMut() -> bool>(mut condition: F) {
    let polling = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    tokio::time::timeout(WAIT, polling)
        .await
        .expect("timed out waiting for condition");
}

/// Await with the shared timeout
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("timed out")
}

// ============================================================================
// Mock daemon
// ============================================================================

/// Serve a mock daemon with one wallet; returns its base URL
pub async fn spawn_mock(state: Arc<MockState>) -> String {
    let addr = jm_mock::spawn_local(state)
        .await
        .expect("Failed to start mock server");
    format!("http://{}", addr)
}

pub fn mock_with_wallet() -> MockState {
    MockState::new().with_wallet(WALLET, PASSWORD)
}
