//! GitLab provider implementation

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::config::ProviderConfig;
use crate::error::ConnectError;
use crate::models::{ProviderKind, ProviderToken, RemoteRepository};
use crate::providers::{PAGE_SIZE, RepositoryProvider, api_url, authorize_endpoint, fetch_json};

const SCOPES: &str = "read_api read_repository";

#[derive(Debug, Deserialize)]
struct GitLabProject {
    web_url: String,
    /// `public`, `internal` or `private`
    #[serde(default)]
    visibility: Option<String>,
}

impl From<GitLabProject> for RemoteRepository {
    fn from(project: GitLabProject) -> Self {
        let is_private = project.visibility.as_deref() != Some("public");
        RemoteRepository::new(project.web_url, is_private)
    }
}

/// GitLab provider (gitlab.com or a self-managed instance)
#[derive(Clone)]
pub struct GitLabProvider {
    http: Client,
    config: ProviderConfig,
}

impl GitLabProvider {
    pub fn new(http: Client, config: ProviderConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl RepositoryProvider for GitLabProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitLab
    }

    fn authorize_url(&self, redirect_uri: &str, state: &str) -> Result<Url, ConnectError> {
        let (mut url, client_id) = authorize_endpoint(self.kind(), &self.config, "/oauth/authorize")?;
        url.query_pairs_mut()
            .append_pair("client_id", &client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
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
            .get(api_url(&self.config, "/api/v4/projects"))
            .query(&[
                ("membership", "true".to_string()),
                ("per_page", PAGE_SIZE.to_string()),
                ("order_by", "last_activity_at".to_string()),
            ])
            .bearer_auth(token.expose());

        let projects: Vec<GitLabProject> = fetch_json(self.kind(), request).await?;

        Ok(projects
            .into_iter()
            .take(PAGE_SIZE)
            .map(RemoteRepository::from)
            .collect())
    }
}
