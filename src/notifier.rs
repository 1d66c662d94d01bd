//! # Connection Result Notifier
//!
//! Single owner of user-visible connection outcomes. After a successful run it
//! replaces the cached repository list with the backend's view, then presents
//! the outcome through a [`Presenter`]. Each recent run is presented at most once.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use lru::LruCache;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::BackendClient;
use crate::error::ConnectError;
use crate::identity::IdentityProvider;
use crate::models::{ConnectedRepository, ConnectionResult, Notice, ProviderKind};

/// Surface that shows outcomes to the user
pub trait Presenter: Send + Sync {
    fn present(&self, notice: &Notice);

    /// Brackets a connection run; `active` is `true` while the run is in flight.
    fn loading(&self, _provider: ProviderKind, _active: bool) {}
}

/// Presenter that writes outcomes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPresenter;

impl Presenter for TracingPresenter {
    fn present(&self, notice: &Notice) {
        match notice {
            Notice::Success {
                message,
                repository_count,
            } => info!(repository_count, "{}", message),
            Notice::Failure { message } => warn!("{}", message),
        }
    }

    fn loading(&self, provider: ProviderKind, active: bool) {
        info!(provider = provider.as_str(), active, "Connection in progress");
    }
}

#[derive(Debug, Default)]
struct CacheState {
    repositories: Vec<ConnectedRepository>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Client-side copy of the user's connected repositories
#[derive(Debug, Default)]
pub struct RepositoryCache {
    state: RwLock<CacheState>,
}

impl RepositoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole list. Entries are never merged.
    pub async fn replace(&self, repositories: Vec<ConnectedRepository>) {
        let mut state = self.state.write().await;
        state.repositories = repositories;
        state.refreshed_at = Some(Utc::now());
    }

    pub async fn snapshot(&self) -> Vec<ConnectedRepository> {
        self.state.read().await.repositories.clone()
    }

    pub async fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.refreshed_at
    }

    pub async fn clear(&self) {
        *self.state.write().await = CacheState::default();
    }
}

/// Recent run ids remembered for at-most-once presentation
const PRESENTED_RUNS: usize = 64;

pub struct ConnectionNotifier {
    presenter: Arc<dyn Presenter>,
    cache: Arc<RepositoryCache>,
    backend: BackendClient,
    identity: Arc<dyn IdentityProvider>,
    presented: Mutex<LruCache<Uuid, ()>>,
}

impl ConnectionNotifier {
    pub fn new(
        presenter: Arc<dyn Presenter>,
        cache: Arc<RepositoryCache>,
        backend: BackendClient,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            presenter,
            cache,
            backend,
            identity,
            presented: Mutex::new(LruCache::new(
                NonZeroUsize::new(PRESENTED_RUNS).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    pub fn cache(&self) -> &Arc<RepositoryCache> {
        &self.cache
    }

    /// Forget cached repositories and presented runs.
    pub async fn clear(&self) {
        self.cache.clear().await;
        if let Ok(mut presented) = self.presented.lock() {
            presented.clear();
        }
    }

    /// Toggle the loading indicator for a run.
    pub fn loading(&self, provider: ProviderKind, active: bool) {
        self.presenter.loading(provider, active);
    }

    /// Report the outcome of run `run_id` and return the notice shown.
    ///
    /// A second call for the same run returns the notice without presenting it again.
    pub async fn notify(
        &self,
        run_id: Uuid,
        outcome: &Result<ConnectionResult, ConnectError>,
    ) -> Notice {
        let notice = match outcome {
            Ok(result) => {
                if let Err(err) = self.refresh_repositories().await {
                    warn!(%run_id, error = %err, "Repository list refresh failed after connection");
                }
                Notice::Success {
                    message: result.summary(),
                    repository_count: result.repository_count,
                }
            }
            Err(err) => Notice::Failure {
                message: err.user_message(),
            },
        };

        if self.first_presentation(run_id) {
            self.presenter.present(&notice);
        }
        notice
    }

    /// Present a failure that is not tied to a sequencer run, e.g. a denied authorization.
    pub fn notify_failure(&self, error: &ConnectError) -> Notice {
        let notice = Notice::Failure {
            message: error.user_message(),
        };
        self.presenter.present(&notice);
        notice
    }

    /// Reload the cached list from `GET /api/repository/user`.
    pub async fn refresh_repositories(&self) -> Result<Vec<ConnectedRepository>, ConnectError> {
        let id_token = self.identity.id_token().await?;
        let repositories = self.backend.list_user_repositories(&id_token).await?;
        self.cache.replace(repositories.clone()).await;
        Ok(repositories)
    }

    fn first_presentation(&self, run_id: Uuid) -> bool {
        match self.presented.lock() {
            Ok(mut presented) => presented.put(run_id, ()).is_none(),
            // Poisoned lock: present anyway.
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{StaticIdentity, User};

    #[derive(Default)]
    struct Recording {
        notices: Mutex<Vec<Notice>>,
    }

    impl Presenter for Recording {
        fn present(&self, notice: &Notice) {
            self.notices.lock().unwrap().push(notice.clone());
        }
    }

    fn notifier(presenter: Arc<Recording>) -> ConnectionNotifier {
        ConnectionNotifier::new(
            presenter,
            Arc::new(RepositoryCache::new()),
            BackendClient::new(reqwest::Client::new(), "http://127.0.0.1:9"),
            Arc::new(StaticIdentity::signed_in(User::new("u-1"), "id")),
        )
    }

    #[tokio::test]
    async fn failure_is_presented_once_per_run() {
        let presenter = Arc::new(Recording::default());
        let notifier = notifier(presenter.clone());
        let run_id = Uuid::new_v4();
        let outcome = Err(ConnectError::AuthRequired);

        let first = notifier.notify(run_id, &outcome).await;
        let second = notifier.notify(run_id, &outcome).await;

        assert_eq!(first, second);
        assert!(!first.is_success());
        assert_eq!(presenter.notices.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn presented_runs_are_bounded() {
        let presenter = Arc::new(Recording::default());
        let notifier = notifier(presenter.clone());
        let outcome = Err(ConnectError::AuthRequired);

        let first_run = Uuid::new_v4();
        notifier.notify(first_run, &outcome).await;
        for _ in 0..PRESENTED_RUNS {
            notifier.notify(Uuid::new_v4(), &outcome).await;
        }

        assert_eq!(notifier.presented.lock().unwrap().len(), PRESENTED_RUNS);
        assert!(!notifier.presented.lock().unwrap().contains(&first_run));

        notifier.clear().await;
        assert!(notifier.presented.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cache_replace_is_wholesale() {
        let cache = RepositoryCache::new();
        assert!(cache.refreshed_at().await.is_none());

        let repo = |id: &str| ConnectedRepository {
            id: id.to_string(),
            url: format!("https://github.com/acme/{}", id),
            is_private: false,
            provider: None,
        };
        cache.replace(vec![repo("a"), repo("b")]).await;
        cache.replace(vec![repo("c")]).await;

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "c");
        assert!(cache.refreshed_at().await.is_some());

        cache.clear().await;
        assert!(cache.snapshot().await.is_empty());
    }
}
