//! Typed access to the local auth cache.

use crate::{KeyValueStore, StorageKeys, StorageResult};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// How long a pending OAuth state stays valid.
pub const PENDING_STATE_TTL_SECS: i64 = 600;

/// A state token issued for an authorization URL that has not come back yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOAuthState {
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

impl PendingOAuthState {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            created_at: Utc::now(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::seconds(PENDING_STATE_TTL_SECS)
    }
}

/// Cache of login state shared by the auth facades.
///
/// Cheap to clone; all clones talk to the same store.
#[derive(Clone)]
pub struct LocalAuthCache {
    store: Arc<dyn KeyValueStore>,
}

impl LocalAuthCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    // ========================================
    // Login mirror (auth_token / user)
    // ========================================

    pub fn store_auth_token(&self, token: &str) -> StorageResult<()> {
        self.store.set(StorageKeys::AUTH_TOKEN, token)
    }

    pub fn auth_token(&self) -> StorageResult<Option<String>> {
        self.store.get(StorageKeys::AUTH_TOKEN)
    }

    pub fn store_user<T: Serialize>(&self, user: &T) -> StorageResult<()> {
        let json = serde_json::to_string(user)?;
        self.store.set(StorageKeys::USER, &json)
    }

    pub fn user<T: DeserializeOwned>(&self) -> StorageResult<Option<T>> {
        self.get_json(StorageKeys::USER)
    }

    /// Store token and user together after a successful login.
    pub fn store_login<T: Serialize>(&self, token: &str, user: &T) -> StorageResult<()> {
        self.store_auth_token(token)?;
        self.store_user(user)?;
        debug!("Cached login token and user");
        Ok(())
    }

    pub fn clear_login(&self) -> StorageResult<()> {
        self.store.delete(StorageKeys::AUTH_TOKEN)?;
        self.store.delete(StorageKeys::USER)?;
        Ok(())
    }

    // ========================================
    // Pending OAuth states
    // ========================================

    /// Record a freshly issued state for `provider`.
    pub fn save_pending_state(&self, state: &str, provider: &str) -> StorageResult<()> {
        self.insert_pending_state(state, &PendingOAuthState::new(provider))
    }

    /// Record a state with an explicit entry, e.g. one restored from elsewhere.
    pub fn insert_pending_state(
        &self,
        state: &str,
        pending: &PendingOAuthState,
    ) -> StorageResult<()> {
        self.set_json(&StorageKeys::oauth_state(state), pending)
    }

    /// Remove and return the entry for `state`.
    ///
    /// Each state can be taken once. Expired entries are deleted and reported
    /// as absent.
    pub fn take_pending_state(&self, state: &str) -> StorageResult<Option<PendingOAuthState>> {
        let key = StorageKeys::oauth_state(state);
        let pending: Option<PendingOAuthState> = self.get_json(&key)?;
        if pending.is_none() {
            return Ok(None);
        }
        self.store.delete(&key)?;

        match pending {
            Some(p) if p.is_expired_at(Utc::now()) => {
                debug!(provider = %p.provider, "Pending OAuth state expired");
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Drop every pending state older than the TTL. Returns how many went.
    pub fn purge_expired_states(&self) -> StorageResult<usize> {
        let now = Utc::now();
        let mut purged = 0;
        for key in self
            .store
            .list_keys_with_prefix(StorageKeys::OAUTH_STATE_PREFIX)?
        {
            let expired = match self.get_json::<PendingOAuthState>(&key) {
                Ok(Some(p)) => p.is_expired_at(now),
                Ok(None) => false,
                Err(e) => {
                    warn!(key = %key, error = %e, "Dropping unreadable OAuth state entry");
                    true
                }
            };
            if expired && self.store.delete(&key)? {
                purged += 1;
            }
        }
        Ok(purged)
    }

    // ========================================
    // Backend session
    // ========================================

    pub fn save_session<T: Serialize>(&self, project_ref: &str, session: &T) -> StorageResult<()> {
        self.set_json(&StorageKeys::backend_session(project_ref), session)
    }

    pub fn load_session<T: DeserializeOwned>(&self, project_ref: &str) -> StorageResult<Option<T>> {
        self.get_json(&StorageKeys::backend_session(project_ref))
    }

    pub fn clear_session(&self, project_ref: &str) -> StorageResult<bool> {
        self.store.delete(&StorageKeys::backend_session(project_ref))
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        let json = serde_json::to_string(value)?;
        self.store.set(key, &json)
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.store.get(key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for LocalAuthCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAuthCache").finish_non_exhaustive()
    }
}
