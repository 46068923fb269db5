use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use jam_sync::{
    ChannelEvent, CredentialStore, DurationSummary, FeatureResolver, FileStorage, JmApiClient,
    ServiceStatusChannel, ServiceStatusSnapshot, SessionUpdate, SyncConfig,
};
use tokio::sync::broadcast::error::RecvError;

/// Monitor settings on top of `SyncConfig`
///
/// Environment variables:
/// - `JAM_WALLET` / `JAM_PASSWORD`: unlock this wallet at startup (optional)
/// - `JAM_SESSION_DIR`: directory of the persisted session (default: temp dir)
/// - `JAM_FEATURE`: feature flag to track (default: `logs`)
#[derive(Debug)]
struct MonitorConfig {
    wallet: Option<(String, String)>,
    session_dir: Option<PathBuf>,
    feature: String,
}

impl MonitorConfig {
    fn from_env() -> Self {
        let wallet = match (env::var("JAM_WALLET"), env::var("JAM_PASSWORD")) {
            (Ok(wallet), Ok(password)) => Some((wallet, password)),
            (Ok(wallet), Err(_)) => {
                log::warn!("JAM_WALLET={} set without JAM_PASSWORD, not unlocking", wallet);
                None
            }
            _ => None,
        };

        Self {
            wallet,
            session_dir: env::var("JAM_SESSION_DIR").ok().map(PathBuf::from),
            feature: env::var("JAM_FEATURE").unwrap_or_else(|_| "logs".to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok(); // Load .env file if present

    // Initialize logger (set RUST_LOG=debug for verbose output, RUST_LOG=info for normal)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let sync_config = SyncConfig::from_env();
    let config = MonitorConfig::from_env();

    let storage = match &config.session_dir {
        Some(dir) => FileStorage::new_with_base_dir(dir.clone()),
        None => FileStorage::new(),
    };
    log::info!("Session storage at {}", storage.base_dir().display());
    let store = Arc::new(CredentialStore::load(Arc::new(storage.clone())));

    let client = JmApiClient::new(&sync_config).context("Failed to create API client")?;

    if let Some((wallet, password)) = &config.wallet {
        let unlocked = client
            .unlock_wallet(wallet, password)
            .await
            .with_context(|| format!("Failed to unlock wallet {}", wallet))?;
        let mut update = SessionUpdate::token(unlocked.token).wallet(unlocked.walletname);
        if let Some(refresh_token) = unlocked.refresh_token {
            update = update.refresh_token(refresh_token);
        }
        store.update(update);
    }

    if !store.is_logged_in() {
        log::warn!("No session; status stays unknown until a wallet is unlocked");
    }

    log::info!("Monitoring jmwalletd at {}", sync_config.base_url);
    let channel = ServiceStatusChannel::for_backend(&sync_config, client.clone());
    let forwarder = channel.follow(store.subscribe());

    let resolver = FeatureResolver::new(client.clone(), sync_config.build_mode);
    let (mut feature, feature_task) = resolver.track(config.feature.clone(), store.subscribe());

    let mut snapshots = channel.subscribe();
    let mut events = channel.events();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                describe(&snapshot);
            }
            changed = feature.changed() => {
                if changed.is_err() {
                    break;
                }
                let resolution = *feature.borrow_and_update();
                log::info!(
                    "Feature '{}': enabled={} definitive={}",
                    config.feature,
                    resolution.enabled,
                    resolution.definitive
                );
            }
            event = events.recv() => match event {
                Ok(event) => handle_event(event, &store, &storage, &client).await,
                Err(RecvError::Lagged(skipped)) => log::warn!("Missed {} channel events", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = &mut shutdown => break,
        }
    }

    forwarder.abort();
    feature_task.abort();
    channel.shutdown().await;
    end_session(&storage);
    log::info!("Monitor stopped");
    Ok(())
}

/// Try the refresh token once, otherwise log out
async fn handle_event(
    event: ChannelEvent,
    store: &CredentialStore,
    storage: &FileStorage,
    client: &JmApiClient,
) {
    match event {
        ChannelEvent::Unauthorized => {
            let refresh_token = store.credential().and_then(|c| c.refresh_token);
            if let Some(refresh_token) = refresh_token {
                match client.refresh_token(&refresh_token).await {
                    Ok(tokens) => {
                        log::info!("Session token refreshed");
                        let mut update = SessionUpdate::token(tokens.token);
                        if let Some(refresh_token) = tokens.refresh_token {
                            update = update.refresh_token(refresh_token);
                        }
                        store.update(update);
                        return;
                    }
                    Err(e) => log::warn!("Token refresh failed: {}", e),
                }
            }
            log::warn!("Session expired, logging out");
            log_out(store, storage);
        }
        ChannelEvent::WalletMismatch { expected, active } => {
            log::warn!(
                "Backend switched wallets ({} -> {}), logging out",
                expected,
                active.as_deref().unwrap_or("none")
            );
            log_out(store, storage);
        }
    }
}

fn log_out(store: &CredentialStore, storage: &FileStorage) {
    store.clear();
    end_session(storage);
}

fn end_session(storage: &FileStorage) {
    if let Err(e) = storage.end_session() {
        log::warn!("Failed to remove session storage: {}", e);
    }
}

fn describe(snapshot: &ServiceStatusSnapshot) {
    log::info!(
        "#{} {:?}{} session={:?} wallet={:?} maker={:?} coinjoin={:?} rescanning={:?} progress={:?}",
        snapshot.sequence,
        snapshot.availability,
        if snapshot.stale { " (stale)" } else { "" },
        snapshot.session_active,
        snapshot.wallet_name,
        snapshot.maker_running,
        snapshot.coinjoin_in_progress,
        snapshot.rescanning,
        snapshot.rescan_progress,
    );

    if let Some(progress) = snapshot.schedule_progress() {
        let remaining = match progress.duration_summary() {
            DurationSummary::Seconds(s) => format!("{}s", s),
            DurationSummary::Hours(h) => format!("~{}h", h),
        };
        log::info!(
            "Schedule: {}/{} transactions done, {} of waiting in total",
            progress.completed_count,
            progress.steps.len(),
            remaining
        );
    }

    if log::log_enabled!(log::Level::Debug) {
        if let Ok(json) = serde_json::to_string(snapshot) {
            log::debug!("{}", json);
        }
    }
}

/// Handle graceful shutdown signals (Ctrl+C, SIGTERM)
async fn shutdown_signal() {
    // Wait for SIGTERM or Ctrl+C
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            log::info!("Received SIGTERM signal");
        },
    }

    log::info!("Shutting down status monitor");
}
