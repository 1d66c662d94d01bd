//! GitHub provider implementation
//!
//! OAuth web application flow plus repository listing through the REST v3 API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::ProviderConfig;
use crate::error::ConnectError;
use crate::models::{ProviderKind, ProviderToken, RemoteRepository};
use crate::providers::{PAGE_SIZE, RepositoryProvider, api_url, authorize_endpoint, fetch_json};

const ACCEPT_HEADER: &str = "application/vnd.github.v3+json";
const USER_AGENT: &str = "StackSeek-Connect/0.1";
const SCOPES: &str = "repo read:user";

#[derive(Debug, Deserialize)]
struct GitHubRepository {
    html_url: String,
    #[serde(default)]
    private: bool,
}

/// GitHub provider
#[derive(Clone)]
pub struct GitHubProvider {
    http: Client,
    config: ProviderConfig,
}

impl GitHubProvider {
    pub fn new(http: Client, config: ProviderConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl RepositoryProvider for GitHubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    fn authorize_url(&self, redirect_uri: &str, state: &str) -> Result<Url, ConnectError> {
        let (mut url, client_id) =
            authorize_endpoint(self.kind(), &self.config, "/login/oauth/authorize")?;
        url.query_pairs_mut()
            .append_pair("client_id", &client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", SCOPES)
            .append_pair("state", state);
        Ok(url)
    }

    async fn list_repositories(
        &self,
        token: &ProviderToken,
    ) -> Result<Vec<RemoteRepository>, ConnectError> {
        let request = self
            .http
            .get(api_url(&self.config, "/user/repos"))
            .query(&[
                ("per_page", PAGE_SIZE.to_string()),
                ("page", "1".to_string()),
                ("sort", "updated".to_string()),
            ])
            .bearer_auth(token.expose())
            .header("Accept", ACCEPT_HEADER)
            .header("User-Agent", USER_AGENT);

        let repositories: Vec<GitHubRepository> = fetch_json(self.kind(), request).await?;
        debug!(count = repositories.len(), "Listed GitHub repositories");

        Ok(repositories
            .into_iter()
            .take(PAGE_SIZE)
            .map(|repo| RemoteRepository::new(repo.html_url, repo.private))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(client_id: Option<&str>) -> GitHubProvider {
        GitHubProvider::new(
            Client::new(),
            ProviderConfig::new(
                client_id.map(str::to_string),
                "https://github.com",
                "https://api.github.com",
            ),
        )
    }

    #[test]
    fn authorize_url_carries_client_state_and_scope() {
        let url = provider(Some("gh-client"))
            .authorize_url("http://127.0.0.1:8765/oauth/callback", "state-1")
            .unwrap();

        assert_eq!(url.host_str(), Some("github.com"));
        assert_eq!(url.path(), "/login/oauth/authorize");
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "gh-client");
        assert_eq!(pairs["state"], "state-1");
        assert_eq!(pairs["scope"], "repo read:user");
        assert_eq!(pairs["redirect_uri"], "http://127.0.0.1:8765/oauth/callback");
    }

    #[test]
    fn authorize_url_requires_client_id() {
        let err = provider(None).authorize_url("http://x/cb", "s").unwrap_err();
        assert!(matches!(err, ConnectError::Configuration(_)));
    }
}
