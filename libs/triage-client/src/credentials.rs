//! Durable persistence of the session triple across page reloads.
//!
//! The backing store sees exactly three key/value entries (token, expiry,
//! serialized user) so any flat string store can host them. No component
//! other than the session manager touches this; everything else reads the
//! manager's in-memory mirror.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::UserSummary;

const TOKEN_KEY: &str = "triage.token";
const EXPIRY_KEY: &str = "triage.expires_at";
const USER_KEY: &str = "triage.user";

/// The persisted session triple.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCredentials {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: Option<UserSummary>,
}

/// Abstraction over the durable key/value backend.
///
/// Infallible by contract: a backend that cannot read yields `None` from
/// `load` rather than raising, so callers are safe to run before any real
/// storage is available.
pub trait CredentialStore: Send + Sync {
    fn save(&self, credentials: &StoredCredentials);
    fn load(&self) -> Option<StoredCredentials>;
    fn clear(&self);
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests and headless use)
// ---------------------------------------------------------------------------

pub struct MemoryCredentialStore {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save(&self, credentials: &StoredCredentials) {
        let mut data = self.data.lock();
        data.insert(TOKEN_KEY.to_string(), credentials.token.clone());
        data.insert(EXPIRY_KEY.to_string(), credentials.expires_at.to_rfc3339());
        match &credentials.user {
            Some(user) => match serde_json::to_string(user) {
                Ok(json) => {
                    data.insert(USER_KEY.to_string(), json);
                }
                Err(e) => {
                    tracing::warn!(?e, "failed to serialize cached user");
                    data.remove(USER_KEY);
                }
            },
            None => {
                data.remove(USER_KEY);
            }
        }
    }

    fn load(&self) -> Option<StoredCredentials> {
        let data = self.data.lock();
        let token = data.get(TOKEN_KEY)?.clone();
        let expires_at = DateTime::parse_from_rfc3339(data.get(EXPIRY_KEY)?)
            .ok()?
            .with_timezone(&Utc);
        // A missing or corrupt cached user is not fatal. The token/expiry
        // pair is what matters; the profile can be re-fetched.
        let user = data
            .get(USER_KEY)
            .and_then(|json| serde_json::from_str(json).ok());
        Some(StoredCredentials {
            token,
            expires_at,
            user,
        })
    }

    fn clear(&self) {
        let mut data = self.data.lock();
        data.remove(TOKEN_KEY);
        data.remove(EXPIRY_KEY);
        data.remove(USER_KEY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StoredCredentials {
        StoredCredentials {
            token: "T1".to_string(),
            expires_at: DateTime::from_timestamp(1_700_003_600, 0).unwrap(),
            user: Some(UserSummary {
                id: "usr_1".to_string(),
                username: "alice".to_string(),
                display_name: None,
                email: None,
                role: "analyst".to_string(),
            }),
        }
    }

    #[test]
    fn save_load_roundtrip() {
        let store = MemoryCredentialStore::new();
        let credentials = sample();
        store.save(&credentials);
        assert_eq!(store.load(), Some(credentials));
    }

    #[test]
    fn load_on_empty_store_is_absent() {
        let store = MemoryCredentialStore::new();
        assert!(store.load().is_none());
    }

    #[test]
    fn clear_removes_all_entries() {
        let store = MemoryCredentialStore::new();
        store.save(&sample());
        store.clear();
        assert!(store.load().is_none());
    }

    #[test]
    fn missing_user_entry_still_loads_token() {
        let store = MemoryCredentialStore::new();
        let mut credentials = sample();
        credentials.user = None;
        store.save(&credentials);
        let loaded = store.load().unwrap();
        assert_eq!(loaded.token, "T1");
        assert!(loaded.user.is_none());
    }
}
