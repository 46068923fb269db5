use std::sync::Arc;

use tokio::sync::watch;

use super::models::{Credential, PersistedSession, SessionUpdate};
use super::storage::SessionStorage;

/// Storage key the session object is persisted under
pub const SESSION_KEY: &str = "joinmarket";

/// Holds the current session and its persisted copy
///
/// Shared as an `Arc` by every consumer. State is only mutated through
/// `update` and `clear`; readers get clones or a `watch` subscription of the
/// derived credential.
pub struct CredentialStore {
    storage: Arc<dyn SessionStorage>,
    session: watch::Sender<PersistedSession>,
    credential: watch::Sender<Option<Credential>>,
}

impl CredentialStore {
    /// Restore the store from storage
    ///
    /// A missing, unreadable or corrupt entry yields a logged-out store.
    pub fn load(storage: Arc<dyn SessionStorage>) -> Self {
        let session = restore(storage.as_ref());
        let credential = session.credential();
        if let Some(ref c) = credential {
            log::info!(
                "Restored session for wallet {}",
                c.wallet_id.as_deref().unwrap_or("<unknown>")
            );
        }

        Self {
            storage,
            session: watch::Sender::new(session),
            credential: watch::Sender::new(credential),
        }
    }

    /// Current session object
    pub fn current(&self) -> PersistedSession {
        self.session.borrow().clone()
    }

    /// Current credential, `None` when logged out
    pub fn credential(&self) -> Option<Credential> {
        self.credential.borrow().clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.credential.borrow().is_some()
    }

    /// Follow credential changes
    pub fn subscribe(&self) -> watch::Receiver<Option<Credential>> {
        self.credential.subscribe()
    }

    /// Merge fields into the session and persist it
    pub fn update(&self, update: SessionUpdate) {
        let mut changed = false;
        self.session.send_if_modified(|session| {
            changed = session.merge(update);
            changed
        });
        if !changed {
            return;
        }

        let session = self.current();
        self.persist(&session);
        self.publish(session.credential());
    }

    /// Drop all session state, in memory and in storage
    pub fn clear(&self) {
        self.session.send_replace(PersistedSession::default());
        if let Err(e) = self.storage.remove_item(SESSION_KEY) {
            log::warn!("Failed to remove persisted session: {}", e);
        }
        self.publish(None);
        log::info!("Session cleared");
    }

    fn persist(&self, session: &PersistedSession) {
        let result = serde_json::to_string(session)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                self.storage
                    .set_item(SESSION_KEY, &json)
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = result {
            log::warn!("Failed to persist session: {}", e);
        }
    }

    fn publish(&self, credential: Option<Credential>) {
        self.credential.send_if_modified(|current| {
            if *current == credential {
                false
            } else {
                *current = credential;
                true
            }
        });
    }
}

fn restore(storage: &dyn SessionStorage) -> PersistedSession {
    let raw = match storage.get_item(SESSION_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return PersistedSession::default(),
        Err(e) => {
            log::warn!("Could not read persisted session ({}), starting logged out", e);
            return PersistedSession::default();
        }
    };

    match serde_json::from_str::<PersistedSession>(&raw) {
        Ok(session) => session,
        Err(e) => {
            log::warn!("Discarding corrupt persisted session: {}", e);
            if let Err(e) = storage.remove_item(SESSION_KEY) {
                log::warn!("Failed to remove corrupt session: {}", e);
            }
            PersistedSession::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::storage::MemoryStorage;

    #[test]
    fn test_update_creates_session() {
        let store = CredentialStore::load(Arc::new(MemoryStorage::new()));
        assert!(!store.is_logged_in());

        store.update(SessionUpdate::token("x").wallet("w.jmdat"));

        let credential = store.credential().unwrap();
        assert_eq!(credential.token, "x");
        assert_eq!(credential.wallet_id.as_deref(), Some("w.jmdat"));
    }

    #[test]
    fn test_clear_logs_out() {
        let storage = Arc::new(MemoryStorage::new());
        let store = CredentialStore::load(storage.clone());
        store.update(SessionUpdate::token("x"));
        store.clear();

        assert!(store.credential().is_none());
        assert!(store.current().is_empty());
        assert_eq!(storage.get_item(SESSION_KEY).unwrap(), None);
    }

    #[test]
    fn test_subscription_skips_identical_updates() {
        let store = CredentialStore::load(Arc::new(MemoryStorage::new()));
        let mut rx = store.subscribe();

        store.update(SessionUpdate::token("x"));
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        store.update(SessionUpdate::token("x"));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_hashed_password_alone_is_not_a_credential() {
        let store = CredentialStore::load(Arc::new(MemoryStorage::new()));
        store.update(SessionUpdate::default().hashed_password("abc"));
        assert!(store.credential().is_none());
        assert_eq!(store.current().hashed_password.as_deref(), Some("abc"));
    }
}
