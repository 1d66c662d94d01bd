//! Session-scoped key/value storage
//!
//! Carries values across the provider redirect, which does not echo them back.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

/// Provider selected before redirecting to the authorize page
pub const PROVIDER_HINT_KEY: &str = "oauth_provider";
/// CSRF state sent with the authorize request
pub const OAUTH_STATE_KEY: &str = "oauth_state";
/// Set once this session has issued a CSRF state; outlives the state itself
pub const OAUTH_STATE_ISSUED_KEY: &str = "oauth_state_issued";

#[derive(Debug, Clone, Error)]
#[error("session storage unavailable: {0}")]
pub struct SessionStoreError(pub String);

/// Storage that lives as long as one client session
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SessionStoreError>;
    fn set(&self, key: &str, value: String) -> Result<(), SessionStoreError>;
    fn remove(&self, key: &str) -> Result<Option<String>, SessionStoreError>;
    fn clear(&self) -> Result<(), SessionStoreError>;
}

/// In-process session storage
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, SessionStoreError> {
        self.entries
            .lock()
            .map_err(|_| SessionStoreError("session lock poisoned".to_string()))
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionStoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), SessionStoreError> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<Option<String>, SessionStoreError> {
        Ok(self.lock()?.remove(key))
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        self.lock()?.clear();
        Ok(())
    }
}
