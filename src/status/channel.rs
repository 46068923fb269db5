use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use super::core::{
    ChannelCore, ChannelEvent, ChannelState, PollReport, PollTicket,
};
use super::snapshot::ServiceStatusSnapshot;
use super::transport::{
    FetchOutcome, PushConnector, PushRejection, PushStream, StatusSource, WebsocketConnector,
};
use crate::api::{JmApiClient, StatusPayload};
use crate::config::{ChannelConfig, SyncConfig};
use crate::session::Credential;

const EVENT_CAPACITY: usize = 16;

enum Command {
    SetCredential(Option<Credential>),
    Shutdown,
}

/// Live view of the backend service
///
/// Owns a background task that polls the session per credential and keeps
/// a push connection alongside when the backend offers one. Readers get the latest
/// snapshot without blocking; the task is the only writer.
pub struct ServiceStatusChannel {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<Arc<ServiceStatusSnapshot>>,
    state: watch::Receiver<ChannelState>,
    events: broadcast::Sender<ChannelEvent>,
    task: JoinHandle<()>,
}

impl ServiceStatusChannel {
    /// Start the channel task in the Disconnected state
    pub fn spawn<S, P>(config: ChannelConfig, source: S, push: P) -> Self
    where
        S: StatusSource,
        P: PushConnector,
    {
        let core = ChannelCore::new(config.unreachable_after);
        let snapshot = core.watch_snapshot();
        let state = core.watch_state();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (commands, command_rx) = mpsc::unbounded_channel();

        let worker = Worker {
            ticker: new_ticker(config.poll_interval),
            backoff: config.reconnect_min,
            config,
            core,
            source: Arc::new(source),
            push: Arc::new(push),
            events: events.clone(),
            credential: None,
            polls: JoinSet::new(),
            connecting: None,
            push_stream: None,
            reconnect_at: None,
        };
        let task = tokio::spawn(worker.run(command_rx));

        Self {
            commands,
            snapshot,
            state,
            events,
            task,
        }
    }

    /// Channel against jmwalletd: REST polls plus the `/jmws` websocket
    pub fn for_backend(config: &SyncConfig, client: JmApiClient) -> Self {
        Self::spawn(
            config.channel.clone(),
            client,
            WebsocketConnector::new(config.websocket_url.clone()),
        )
    }

    pub fn snapshot(&self) -> Arc<ServiceStatusSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<ServiceStatusSnapshot>> {
        self.snapshot.clone()
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    /// Switch credentials; `None` disconnects
    ///
    /// Setting the credential already in use is a no-op.
    pub fn set_credential(&self, credential: Option<Credential>) {
        if self.commands.send(Command::SetCredential(credential)).is_err() {
            log::warn!("Status channel task has stopped, credential ignored");
        }
    }

    /// Forward every credential the store publishes
    ///
    /// The forwarding task ends when the store or the channel goes away.
    pub fn follow(&self, mut credentials: watch::Receiver<Option<Credential>>) -> JoinHandle<()> {
        let commands = self.commands.clone();
        tokio::spawn(async move {
            loop {
                let credential = credentials.borrow_and_update().clone();
                if commands.send(Command::SetCredential(credential)).is_err() {
                    break;
                }
                if credentials.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Stop the task and wait for it; in-flight requests are aborted
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            log::error!("Status channel task failed: {}", e);
        }
    }
}

enum Wake {
    Command(Option<Command>),
    Tick,
    PollDone(Result<(PollTicket, PollReport), JoinError>),
    Connected(Result<PushStream, PushRejection>),
    Frame(Option<StatusPayload>),
    Reconnect,
}

struct Worker<S, P> {
    config: ChannelConfig,
    core: ChannelCore,
    source: Arc<S>,
    push: Arc<P>,
    events: broadcast::Sender<ChannelEvent>,
    credential: Option<Credential>,
    ticker: Interval,
    polls: JoinSet<(PollTicket, PollReport)>,
    connecting: Option<BoxFuture<'static, Result<PushStream, PushRejection>>>,
    push_stream: Option<PushStream>,
    reconnect_at: Option<Instant>,
    backoff: Duration,
}

impl<S: StatusSource, P: PushConnector> Worker<S, P> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        log::debug!("Status channel task started");

        loop {
            let polling = self.polling_active();
            let wake = tokio::select! {
                command = commands.recv() => Wake::Command(command),
                _ = self.ticker.tick(), if polling => Wake::Tick,
                Some(done) = self.polls.join_next(), if !self.polls.is_empty() => Wake::PollDone(done),
                outcome = await_connect(&mut self.connecting), if self.connecting.is_some() => {
                    Wake::Connected(outcome)
                }
                frame = next_frame(&mut self.push_stream), if self.push_stream.is_some() => {
                    Wake::Frame(frame)
                }
                _ = sleep_until(self.reconnect_at), if self.reconnect_at.is_some() => Wake::Reconnect,
            };

            match wake {
                Wake::Command(Some(Command::SetCredential(credential))) => {
                    self.on_credential(credential)
                }
                Wake::Command(Some(Command::Shutdown)) | Wake::Command(None) => break,
                Wake::Tick => self.dispatch_poll(),
                Wake::PollDone(Ok((ticket, report))) => {
                    if let Some(event) = self.core.finish_poll(ticket, report) {
                        self.emit(event);
                    }
                }
                Wake::PollDone(Err(e)) => {
                    if !e.is_cancelled() {
                        log::error!("Status poll task failed: {}", e);
                    }
                }
                Wake::Connected(outcome) => self.on_connected(outcome),
                Wake::Frame(Some(payload)) => {
                    if let Some(event) = self.core.apply_push(payload) {
                        self.emit(event);
                    }
                }
                Wake::Frame(None) => {
                    log::warn!("Push connection closed");
                    self.push_stream = None;
                    self.core.push_lost();
                    self.schedule_reconnect();
                }
                Wake::Reconnect => {
                    self.reconnect_at = None;
                    self.connect_push();
                }
            }
        }

        self.stop_transports();
        self.core.teardown();
        log::debug!("Status channel task stopped");
    }

    /// Session and rescan info are polled under every transport; push
    /// frames only carry partial updates
    fn polling_active(&self) -> bool {
        self.credential.is_some() && self.core.state() != ChannelState::Disconnected
    }

    fn on_credential(&mut self, credential: Option<Credential>) {
        let active = self.core.state() != ChannelState::Disconnected;
        if active && self.credential == credential {
            return;
        }

        self.stop_transports();
        if active {
            self.core.teardown();
        }

        let Some(credential) = credential else {
            log::info!("Credential cleared, status channel disconnected");
            self.credential = None;
            return;
        };

        log::info!(
            "Starting status channel for wallet {}",
            credential.wallet_id.as_deref().unwrap_or("<unknown>")
        );
        let wants_push = self.core.start(credential.wallet_id.clone());
        self.credential = Some(credential);
        self.ticker = new_ticker(self.config.poll_interval);
        if wants_push {
            self.connect_push();
        }
    }

    fn dispatch_poll(&mut self) {
        let Some(credential) = self.credential.as_ref() else {
            return;
        };
        let Some(ticket) = self.core.begin_poll() else {
            return;
        };

        let source = self.source.clone();
        let token = credential.token.clone();
        let wallet_hint = credential.wallet_id.clone();
        self.polls.spawn(async move {
            let report = poll_once(source.as_ref(), &token, wallet_hint, ticket.fetch_rescan).await;
            (ticket, report)
        });
    }

    fn connect_push(&mut self) {
        if self.core.push_support().is_unsupported() {
            return;
        }
        let Some(credential) = self.credential.as_ref() else {
            return;
        };
        self.connecting = Some(self.push.connect(&credential.token));
    }

    fn on_connected(&mut self, outcome: Result<PushStream, PushRejection>) {
        self.connecting = None;
        match outcome {
            Ok(stream) => {
                log::info!("Push connection established");
                self.push_stream = Some(stream);
                self.backoff = self.config.reconnect_min;
                self.core.push_connected();
            }
            Err(PushRejection::Unsupported) => self.core.push_unsupported(),
            Err(PushRejection::Unauthorized) => {
                let event = self.core.unauthorized();
                self.emit(event);
            }
            Err(PushRejection::Failed(reason)) => {
                log::warn!("Push connection failed: {}", reason);
                self.core.push_lost();
                self.schedule_reconnect();
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        log::debug!("Reconnecting push in {:?}", self.backoff);
        self.reconnect_at = Some(Instant::now() + self.backoff);
        self.backoff = (self.backoff * 2).min(self.config.reconnect_max);
    }

    fn emit(&mut self, event: ChannelEvent) {
        if event == ChannelEvent::Unauthorized {
            self.stop_transports();
            self.credential = None;
        }
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    fn stop_transports(&mut self) {
        // Dropping the set aborts every in-flight poll
        self.polls = JoinSet::new();
        self.connecting = None;
        self.push_stream = None;
        self.reconnect_at = None;
        self.backoff = self.config.reconnect_min;
    }
}

async fn poll_once<S: StatusSource>(
    source: &S,
    token: &str,
    wallet_hint: Option<String>,
    fetch_rescan: bool,
) -> PollReport {
    let session = source.fetch_session(token).await;

    let wallet_name = match &session {
        FetchOutcome::Ok(payload) => payload.wallet_name.name().map(str::to_string).or(wallet_hint),
        _ => None,
    };
    let rescan = match wallet_name {
        Some(wallet_name) if fetch_rescan => {
            Some(source.fetch_rescan_info(token, &wallet_name).await)
        }
        _ => None,
    };

    PollReport { session, rescan }
}

fn new_ticker(period: Duration) -> Interval {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn await_connect(
    connecting: &mut Option<BoxFuture<'static, Result<PushStream, PushRejection>>>,
) -> Result<PushStream, PushRejection> {
    match connecting {
        Some(future) => future.await,
        None => pending().await,
    }
}

async fn next_frame(stream: &mut Option<PushStream>) -> Option<StatusPayload> {
    match stream {
        Some(stream) => stream.next().await,
        None => pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => pending().await,
    }
}
