//! # Connection Sequencer
//!
//! Completes an OAuth callback as one ordered run:
//!
//! 1. exchange the authorization code for a provider token (through the backend)
//! 2. save the token against the signed-in user
//! 3. list the user's repositories from the provider API
//! 4. register every listed repository with the backend, concurrently
//!
//! Steps 1-3 abort the run on failure. Step 4 failures are logged and skipped.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::backend::BackendClient;
use crate::error::ConnectError;
use crate::identity::IdentityProvider;
use crate::models::{AuthorizationCode, ConnectionResult, ProviderKind, RemoteRepository};
use crate::providers::ProviderRegistry;
use crate::telemetry::{self, RunContext};

#[derive(Debug, Default)]
struct ConnectStats {
    connected: usize,
    failed: usize,
}

/// Runs the exchange and import steps for one authorization code
pub struct ConnectionSequencer {
    identity: Arc<dyn IdentityProvider>,
    backend: BackendClient,
    registry: Arc<ProviderRegistry>,
    concurrency: usize,
}

impl ConnectionSequencer {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        backend: BackendClient,
        registry: Arc<ProviderRegistry>,
        concurrency: usize,
    ) -> Self {
        Self {
            identity,
            backend,
            registry,
            concurrency: concurrency.max(1),
        }
    }

    /// Execute one run. `run_id` identifies the run in logs and in the result.
    pub async fn run(
        &self,
        run_id: Uuid,
        provider: ProviderKind,
        code: &AuthorizationCode,
    ) -> Result<ConnectionResult, ConnectError> {
        let span = info_span!("connection_run", %run_id, provider = provider.as_str());
        telemetry::with_run_context(
            RunContext { run_id },
            self.run_steps(run_id, provider, code).instrument(span),
        )
        .await
    }

    async fn run_steps(
        &self,
        run_id: Uuid,
        provider: ProviderKind,
        code: &AuthorizationCode,
    ) -> Result<ConnectionResult, ConnectError> {
        // Checked before any request so a signed-out session never reaches the network.
        if self.identity.current_user().is_none() {
            warn!("Connection attempted without a signed-in user");
            return Err(ConnectError::AuthRequired);
        }

        let repository_provider = self.registry.get(provider)?;

        let token = repository_provider.exchange_code(&self.backend, code).await?;
        debug!("Authorization code exchanged");

        let id_token = self.identity.id_token().await?;
        self.backend
            .save_provider_token(provider, &token, &id_token)
            .await?;

        let repositories = repository_provider.list_repositories(&token).await?;
        drop(token);
        info!(listed = repositories.len(), "Fetched provider repositories");

        let listed_count = repositories.len();
        let stats = self.connect_all(provider, &id_token, repositories).await;

        info!(
            connected = stats.connected,
            failed = stats.failed,
            "Repository import completed"
        );

        Ok(ConnectionResult {
            run_id,
            provider,
            repository_count: stats.connected,
            listed_count,
            failed_count: stats.failed,
            completed_at: Utc::now(),
        })
    }

    /// Register every repository, at most `concurrency` calls at a time, and
    /// wait for all of them to settle.
    async fn connect_all(
        &self,
        provider: ProviderKind,
        id_token: &str,
        repositories: Vec<RemoteRepository>,
    ) -> ConnectStats {
        let mut stats = ConnectStats::default();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(repositories.len());

        for repository in repositories {
            let semaphore = Arc::clone(&semaphore);
            let backend = self.backend.clone();
            let id_token = id_token.to_string();
            let span = tracing::Span::current();

            let handle = tokio::spawn(
                async move {
                    let _permit = semaphore.acquire_owned().await.map_err(|_| {
                        ConnectError::RepositoryConnect {
                            repo_url: repository.url.clone(),
                            status: None,
                            message: "connection run was shut down".to_string(),
                        }
                    })?;
                    backend.connect_repository(&id_token, &repository).await
                }
                .instrument(span),
            );
            handles.push(handle);
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {
                    stats.connected += 1;
                    counter!("repository_connect_success_total", "provider" => provider.as_str())
                        .increment(1);
                }
                Ok(Err(err)) => {
                    stats.failed += 1;
                    counter!("repository_connect_failure_total", "provider" => provider.as_str())
                        .increment(1);
                    warn!(error = %err, "Skipping repository that failed to connect");
                }
                Err(err) => {
                    stats.failed += 1;
                    counter!("repository_connect_failure_total", "provider" => provider.as_str())
                        .increment(1);
                    error!(error = ?err, "Repository connect task panicked or was cancelled");
                }
            }
        }

        stats
    }
}
