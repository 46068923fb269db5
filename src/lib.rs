//! Jam Sync: client-side session and service-status core for JoinMarket
//!
//! This crate keeps a Jam client in step with a `jmwalletd` backend without
//! any UI concerns: it persists the wallet session, answers feature-flag
//! queries, maintains a live view of the daemon's status, and turns
//! coinjoin schedules into progress models.
//!
//! # Architecture
//!
//! - **Credential Store**: persisted session and the derived credential
//! - **Feature Resolver**: per-request capability lookup with build-mode fallback
//! - **Service Status Channel**: websocket push with polling fallback
//! - **Schedule Projector**: pure schedule → progress model projection
//!
//! # Example
//!
//! ```ignore
//! use jam_sync::{CredentialStore, FileStorage, JmApiClient, ServiceStatusChannel, SyncConfig};
//!
//! let config = SyncConfig::from_env();
//! let store = CredentialStore::load(Arc::new(FileStorage::new()));
//! let client = JmApiClient::new(&config)?;
//!
//! let channel = ServiceStatusChannel::for_backend(&config, client);
//! channel.follow(store.subscribe());
//!
//! let snapshot = channel.snapshot();
//! if let Some(progress) = snapshot.schedule_progress() {
//!     println!("{} of {} done", progress.completed_count, progress.steps.len());
//! }
//! ```

// Public modules
pub mod api;
pub mod config;
pub mod error;
pub mod features;
pub mod schedule;
pub mod session;
pub mod status;

// Re-exports for convenience
pub use api::{ActiveWallet, JmApiClient, StatusPayload};
pub use config::{BuildMode, ChannelConfig, SyncConfig};
pub use error::{StorageError, SyncError};
pub use features::{FeatureResolution, FeatureResolver, FeatureSource};
pub use schedule::{
    project_schedule, Completion, Destination, DurationSummary, ProgressModel, ProgressStep,
    ScheduledTransaction, StepState,
};
pub use session::{
    Credential, CredentialStore, FileStorage, MemoryStorage, PersistedSession, SessionStorage,
    SessionUpdate,
};
pub use status::{
    Availability, Capability, ChannelEvent, ChannelState, ServiceStatusChannel,
    ServiceStatusSnapshot, TransportMode,
};

// Common result type
pub type Result<T> = std::result::Result<T, SyncError>;
