//! Bearer credential lifecycle.
//!
//! # Design
//! The token and the cached user record live in a `KeyValueStore` under the
//! configured keys. Invalidation is published on a broadcast channel instead
//! of being acted on here: whoever owns navigation subscribes and decides
//! what a `SessionEvent` means for the user.
//!
//! Only the request engines call `expire()` (on a 401). Every other mutation
//! comes from an explicit auth facade call.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::StorageKeys;
use crate::storage::{KeyValueStore, MemoryStore, StorageError};
use crate::types::{Credential, User};

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    /// The backend rejected the token with a 401.
    SessionExpired,
    /// The user (or the app) signed out explicitly.
    SignedOut,
}

impl InvalidationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidationReason::SessionExpired => "session_expired",
            InvalidationReason::SignedOut => "signed_out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Invalidated { reason: InvalidationReason },
}

impl SessionEvent {
    /// Navigation hint for the layer that owns routing.
    pub fn login_redirect(&self) -> String {
        match self {
            SessionEvent::Invalidated { reason } => format!("/login?reason={}", reason.as_str()),
        }
    }
}

#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Arc<dyn KeyValueStore>,
    keys: StorageKeys,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("keys", &self.inner.keys)
            .field("authenticated", &self.get().is_some())
            .finish()
    }
}

impl TokenStore {
    pub fn new(storage: Arc<dyn KeyValueStore>, keys: StorageKeys) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                storage,
                keys,
                events,
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), StorageKeys::default())
    }

    /// The bearer token, if a non-empty one is stored.
    pub fn get(&self) -> Option<String> {
        self.inner
            .storage
            .get(&self.inner.keys.token_key)
            .filter(|token| !token.is_empty())
    }

    /// The cached user. Never returned without a token alongside it.
    pub fn user(&self) -> Option<User> {
        self.credential().map(|c| c.user)
    }

    pub fn credential(&self) -> Option<Credential> {
        let token = self.get()?;
        let raw = self.inner.storage.get(&self.inner.keys.user_key)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(Credential { token, user }),
            Err(e) => {
                tracing::warn!(error = %e, "cached user record is unreadable");
                None
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.get().is_some()
    }

    /// Persist a new credential, replacing any previous one.
    pub fn set(&self, token: &str, user: &User) -> Result<(), StorageError> {
        if token.is_empty() {
            return Err(StorageError::EmptyToken);
        }
        let user = serde_json::to_string(user)?;
        self.inner.storage.set(&self.inner.keys.user_key, &user)?;
        self.inner.storage.set(&self.inner.keys.token_key, token)
    }

    /// Remove the credential and announce a sign-out.
    pub fn clear(&self) {
        self.invalidate(InvalidationReason::SignedOut);
    }

    pub(crate) fn expire(&self) {
        self.invalidate(InvalidationReason::SessionExpired);
    }

    /// Emits exactly one event per call, even when the store is already
    /// empty. Storage failures are logged, never raised.
    fn invalidate(&self, reason: InvalidationReason) {
        for key in [&self.inner.keys.token_key, &self.inner.keys.user_key] {
            if let Err(e) = self.inner.storage.remove(key) {
                tracing::warn!(key = %key, error = %e, "failed to remove credential entry");
            }
        }
        // No subscribers is fine.
        let _ = self.inner.events.send(SessionEvent::Invalidated { reason });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn alice() -> User {
        User {
            id: "u1".into(),
            email: "alice@example.com".into(),
            name: Some("Alice".into()),
            tier: "pro".into(),
        }
    }

    #[test]
    fn set_then_get() {
        let store = TokenStore::in_memory();
        assert_eq!(store.get(), None);
        store.set("tok", &alice()).unwrap();
        assert_eq!(store.get().as_deref(), Some("tok"));
        assert_eq!(store.user(), Some(alice()));
    }

    #[test]
    fn set_replaces_previous_credential() {
        let store = TokenStore::in_memory();
        store.set("old", &alice()).unwrap();
        let bob = User {
            id: "u2".into(),
            email: "bob@example.com".into(),
            name: None,
            tier: "free".into(),
        };
        store.set("new", &bob).unwrap();
        let credential = store.credential().unwrap();
        assert_eq!(credential.token, "new");
        assert_eq!(credential.user.email, "bob@example.com");
    }

    #[test]
    fn empty_token_is_rejected() {
        let store = TokenStore::in_memory();
        assert!(matches!(store.set("", &alice()), Err(StorageError::EmptyToken)));
        assert!(!store.is_authenticated());
    }

    #[test]
    fn user_without_token_is_not_valid() {
        let storage = Arc::new(MemoryStore::new());
        let keys = StorageKeys::default();
        storage
            .set(&keys.user_key, &serde_json::to_string(&alice()).unwrap())
            .unwrap();
        storage.set(&keys.token_key, "").unwrap();
        let store = TokenStore::new(storage, keys);
        assert_eq!(store.user(), None);
    }

    #[test]
    fn clear_removes_both_and_notifies() {
        let store = TokenStore::in_memory();
        let mut events = store.subscribe();
        store.set("tok", &alice()).unwrap();

        store.clear();

        assert_eq!(store.get(), None);
        assert_eq!(store.user(), None);
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Invalidated {
                reason: InvalidationReason::SignedOut
            }
        );
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn clearing_empty_store_is_a_no_op() {
        let store = TokenStore::in_memory();
        store.clear();
        store.clear();
        assert_eq!(store.get(), None);
    }

    #[test]
    fn expire_reports_session_expired() {
        let store = TokenStore::in_memory();
        let mut events = store.subscribe();
        store.set("tok", &alice()).unwrap();
        store.expire();
        let event = events.try_recv().unwrap();
        assert_eq!(event.login_redirect(), "/login?reason=session_expired");
    }

    #[test]
    fn clones_share_state() {
        let store = TokenStore::in_memory();
        let other = store.clone();
        store.set("tok", &alice()).unwrap();
        assert_eq!(other.get().as_deref(), Some("tok"));
        other.clear();
        assert_eq!(store.get(), None);
    }
}
