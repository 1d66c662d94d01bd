//! # Connection State Store
//!
//! Remembers which authorization codes this session has already exchanged so a
//! re-delivered callback cannot trigger a second connection run. Only SHA-256
//! digests of codes are kept.
//!
//! The guard is client-side only: the backend must still tolerate duplicate
//! connect calls from other sessions or network retries.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use lru::LruCache;
use thiserror::Error;

use crate::models::{AuthorizationCode, ProviderKind};

#[derive(Debug, Clone, Error)]
#[error("connection state store unavailable: {0}")]
pub struct StoreUnavailable(pub String);

/// Key of a [`ConnectionStateStore`] record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttemptKey(String);

impl AttemptKey {
    pub fn new(provider: ProviderKind, code: &AuthorizationCode) -> Self {
        Self(format!("{}:{}", provider.as_str(), code.digest()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Replay guard storage
///
/// Methods are synchronous so the check-and-set in [`ConnectionStateStore::try_claim`]
/// never spans an await point.
pub trait ConnectionStateStore: Send + Sync {
    fn has_processed(&self, key: &AttemptKey) -> Result<bool, StoreUnavailable>;

    fn mark_processed(&self, key: &AttemptKey) -> Result<(), StoreUnavailable>;

    /// Atomically mark `key` as in flight. Returns `false` if it is already
    /// processed or in flight.
    fn try_claim(&self, key: &AttemptKey) -> Result<bool, StoreUnavailable>;

    /// Drop the in-flight marker without recording the code as processed.
    fn release(&self, key: &AttemptKey);

    fn clear(&self) -> Result<(), StoreUnavailable>;
}

/// Exclusive right to process one authorization code
///
/// [`ReplayClaim::complete`] records the code as processed. Dropping the claim
/// without completing it releases the code, so an abandoned run can be retried.
pub struct ReplayClaim {
    store: Arc<dyn ConnectionStateStore>,
    key: AttemptKey,
    completed: bool,
}

impl ReplayClaim {
    pub fn key(&self) -> &AttemptKey {
        &self.key
    }

    pub fn complete(mut self) -> Result<(), StoreUnavailable> {
        self.completed = true;
        self.store.mark_processed(&self.key)
    }
}

impl Drop for ReplayClaim {
    fn drop(&mut self) {
        if !self.completed {
            self.store.release(&self.key);
        }
    }
}

/// Claim `code` for `provider`.
///
/// `Ok(None)` means the code was already handled and the callback must be ignored.
pub fn claim(
    store: &Arc<dyn ConnectionStateStore>,
    provider: ProviderKind,
    code: &AuthorizationCode,
) -> Result<Option<ReplayClaim>, StoreUnavailable> {
    let key = AttemptKey::new(provider, code);
    if store.try_claim(&key)? {
        Ok(Some(ReplayClaim {
            store: Arc::clone(store),
            key,
            completed: false,
        }))
    } else {
        Ok(None)
    }
}

struct GuardState {
    processed: LruCache<AttemptKey, DateTime<Utc>>,
    in_flight: HashSet<AttemptKey>,
}

/// Bounded in-memory replay guard; the least recently processed codes are evicted first
pub struct MemoryStateStore {
    state: Mutex<GuardState>,
}

impl MemoryStateStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(GuardState {
                processed: LruCache::new(capacity),
                in_flight: HashSet::new(),
            }),
        }
    }

    /// When `key` was recorded as processed.
    pub fn processed_at(&self, key: &AttemptKey) -> Option<DateTime<Utc>> {
        self.lock().ok()?.processed.peek(key).copied()
    }

    fn lock(&self) -> Result<MutexGuard<'_, GuardState>, StoreUnavailable> {
        self.state
            .lock()
            .map_err(|_| StoreUnavailable("replay guard lock poisoned".to_string()))
    }
}

impl ConnectionStateStore for MemoryStateStore {
    fn has_processed(&self, key: &AttemptKey) -> Result<bool, StoreUnavailable> {
        Ok(self.lock()?.processed.contains(key))
    }

    fn mark_processed(&self, key: &AttemptKey) -> Result<(), StoreUnavailable> {
        let mut state = self.lock()?;
        state.in_flight.remove(key);
        state.processed.put(key.clone(), Utc::now());
        Ok(())
    }

    fn try_claim(&self, key: &AttemptKey) -> Result<bool, StoreUnavailable> {
        let mut state = self.lock()?;
        if state.processed.contains(key) || state.in_flight.contains(key) {
            return Ok(false);
        }
        state.in_flight.insert(key.clone());
        Ok(true)
    }

    fn release(&self, key: &AttemptKey) {
        if let Ok(mut state) = self.lock() {
            state.in_flight.remove(key);
        }
    }

    fn clear(&self) -> Result<(), StoreUnavailable> {
        let mut state = self.lock()?;
        state.processed.clear();
        state.in_flight.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(capacity: usize) -> Arc<dyn ConnectionStateStore> {
        Arc::new(MemoryStateStore::new(capacity))
    }

    #[test]
    fn second_claim_for_same_code_is_refused() {
        let store = store(8);
        let code = AuthorizationCode::new("abc123");

        let first = claim(&store, ProviderKind::GitHub, &code).unwrap();
        assert!(first.is_some());
        assert!(claim(&store, ProviderKind::GitHub, &code).unwrap().is_none());

        first.unwrap().complete().unwrap();
        assert!(claim(&store, ProviderKind::GitHub, &code).unwrap().is_none());
        assert!(
            store
                .has_processed(&AttemptKey::new(ProviderKind::GitHub, &code))
                .unwrap()
        );
    }

    #[test]
    fn dropped_claim_releases_code() {
        let store = store(8);
        let code = AuthorizationCode::new("abc123");

        drop(claim(&store, ProviderKind::GitHub, &code).unwrap());

        let key = AttemptKey::new(ProviderKind::GitHub, &code);
        assert!(!store.has_processed(&key).unwrap());
        assert!(claim(&store, ProviderKind::GitHub, &code).unwrap().is_some());
    }

    #[test]
    fn codes_are_scoped_per_provider() {
        let store = store(8);
        let code = AuthorizationCode::new("shared");

        let github = claim(&store, ProviderKind::GitHub, &code).unwrap();
        let gitlab = claim(&store, ProviderKind::GitLab, &code).unwrap();

        assert!(github.is_some());
        assert!(gitlab.is_some());
    }

    #[test]
    fn oldest_codes_are_evicted_at_capacity() {
        let guard = MemoryStateStore::new(2);
        let keys: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|c| AttemptKey::new(ProviderKind::Bitbucket, &AuthorizationCode::new(*c)))
            .collect();

        for key in &keys {
            guard.mark_processed(key).unwrap();
        }

        assert!(!guard.has_processed(&keys[0]).unwrap());
        assert!(guard.has_processed(&keys[1]).unwrap());
        assert!(guard.has_processed(&keys[2]).unwrap());
        assert!(guard.processed_at(&keys[2]).is_some());
    }

    #[test]
    fn key_does_not_contain_raw_code() {
        let key = AttemptKey::new(ProviderKind::AzureDevOps, &AuthorizationCode::new("abc123"));
        assert!(key.as_str().starts_with("azure_devops:"));
        assert!(!key.as_str().contains("abc123"));
    }

    #[test]
    fn clear_forgets_processed_codes() {
        let store = store(4);
        let code = AuthorizationCode::new("abc123");
        claim(&store, ProviderKind::GitHub, &code)
            .unwrap()
            .unwrap()
            .complete()
            .unwrap();

        store.clear().unwrap();

        assert!(claim(&store, ProviderKind::GitHub, &code).unwrap().is_some());
    }
}
