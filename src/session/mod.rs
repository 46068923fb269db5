//! Session persistence layer
//!
//! - Key-value storage backends
//! - Persisted session models
//! - Credential Store

mod models;
mod storage;
mod store;

pub use models::{AuthTokens, Credential, PersistedSession, SessionUpdate};
pub use storage::{FileStorage, MemoryStorage, SessionStorage};
pub use store::{CredentialStore, SESSION_KEY};
