//! # Connect Client
//!
//! Application root that owns every component of the connection flow. Build
//! it once with [`ConnectClient::init`], share it, and call
//! [`ConnectClient::dispose`] when the session ends.

use std::sync::Arc;

use reqwest::Client;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::BackendClient;
use crate::config::{AppConfig, ConfigError};
use crate::identity::IdentityProvider;
use crate::notifier::{ConnectionNotifier, Presenter, RepositoryCache};
use crate::providers::ProviderRegistry;
use crate::redirect::RedirectHandler;
use crate::replay_guard::{ConnectionStateStore, MemoryStateStore};
use crate::sequencer::ConnectionSequencer;
use crate::session::{MemorySessionStore, SessionStore};

#[derive(Debug, Error)]
pub enum ClientInitError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Shared HTTP client; every backend and provider request gets the configured timeout.
pub fn build_http_client(config: &AppConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(config.request_timeout())
        .user_agent(concat!("StackSeek-Connect/", env!("CARGO_PKG_VERSION")))
        .build()
}

#[derive(Clone)]
pub struct ConnectClient {
    config: Arc<AppConfig>,
    session: Arc<dyn SessionStore>,
    state_store: Arc<dyn ConnectionStateStore>,
    registry: Arc<ProviderRegistry>,
    notifier: Arc<ConnectionNotifier>,
    handler: Arc<RedirectHandler>,
    shutdown: CancellationToken,
}

impl ConnectClient {
    /// Wire the flow with in-memory session and replay-guard storage.
    pub fn init(
        config: AppConfig,
        identity: Arc<dyn IdentityProvider>,
        presenter: Arc<dyn Presenter>,
    ) -> Result<Self, ClientInitError> {
        config.validate()?;
        let http = build_http_client(&config)?;
        let registry = ProviderRegistry::from_config(&config, http.clone());
        Ok(Self::with_registry(config, identity, presenter, http, registry))
    }

    /// Like [`ConnectClient::init`] with a caller-supplied registry.
    pub fn with_registry(
        config: AppConfig,
        identity: Arc<dyn IdentityProvider>,
        presenter: Arc<dyn Presenter>,
        http: Client,
        registry: ProviderRegistry,
    ) -> Self {
        let backend = BackendClient::new(http, config.backend_base_url.clone());
        let registry = Arc::new(registry);
        let session: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let state_store: Arc<dyn ConnectionStateStore> =
            Arc::new(MemoryStateStore::new(config.replay_guard_capacity));

        let sequencer = Arc::new(ConnectionSequencer::new(
            Arc::clone(&identity),
            backend.clone(),
            Arc::clone(&registry),
            config.connect_concurrency,
        ));
        let notifier = Arc::new(ConnectionNotifier::new(
            presenter,
            Arc::new(RepositoryCache::new()),
            backend,
            identity,
        ));
        let handler = Arc::new(RedirectHandler::new(
            Arc::clone(&session),
            Arc::clone(&state_store),
            Arc::clone(&registry),
            sequencer,
            Arc::clone(&notifier),
            config.redirect_uri.clone(),
        ));

        let providers: Vec<&str> = registry.kinds().iter().map(|k| k.as_str()).collect();
        info!(?providers, "Connect client initialized");

        Self {
            config: Arc::new(config),
            session,
            state_store,
            registry,
            notifier,
            handler,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn handler(&self) -> &Arc<RedirectHandler> {
        &self.handler
    }

    /// Session storage shared with the redirect handler.
    pub fn session(&self) -> &Arc<dyn SessionStore> {
        &self.session
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<RepositoryCache> {
        self.notifier.cache()
    }

    pub fn notifier(&self) -> &Arc<ConnectionNotifier> {
        &self.notifier
    }

    /// Cancelled by [`ConnectClient::dispose`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// End the session: stop the callback server and forget session-scoped state.
    pub async fn dispose(&self) {
        self.shutdown.cancel();

        if let Err(err) = self.session.clear() {
            warn!(error = %err, "Failed to clear session storage");
        }
        if let Err(err) = self.state_store.clear() {
            warn!(error = %err, "Failed to clear replay guard");
        }
        self.notifier.clear().await;

        info!("Connect client disposed");
    }
}
