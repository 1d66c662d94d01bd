//! Repository provider trait definition
//!
//! Defines the capability set every source-control host implements so the
//! sequencer never branches on a provider name.

use async_trait::async_trait;
use url::Url;

use crate::backend::BackendClient;
use crate::error::ConnectError;
use crate::models::{AuthorizationCode, ProviderKind, ProviderToken, RemoteRepository};

/// Maximum repositories imported per connection run
pub const PAGE_SIZE: usize = 100;

#[async_trait]
pub trait RepositoryProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Authorization URL the user is sent to before the callback.
    fn authorize_url(&self, redirect_uri: &str, state: &str) -> Result<Url, ConnectError>;

    /// Exchange an authorization code for a provider token.
    ///
    /// The client secret lives in the backend, so the exchange goes through it.
    async fn exchange_code(
        &self,
        backend: &BackendClient,
        code: &AuthorizationCode,
    ) -> Result<ProviderToken, ConnectError> {
        backend.exchange_code(self.kind(), code).await
    }

    /// First page (up to [`PAGE_SIZE`]) of repositories visible to `token`.
    async fn list_repositories(
        &self,
        token: &ProviderToken,
    ) -> Result<Vec<RemoteRepository>, ConnectError>;
}
