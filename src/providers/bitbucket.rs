//! Bitbucket Cloud provider implementation

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::config::ProviderConfig;
use crate::error::ConnectError;
use crate::models::{ProviderKind, ProviderToken, RemoteRepository};
use crate::providers::{PAGE_SIZE, RepositoryProvider, api_url, authorize_endpoint, fetch_json};

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    values: Vec<BitbucketRepository>,
}

#[derive(Debug, Deserialize)]
struct BitbucketRepository {
    links: Links,
    #[serde(default)]
    is_private: bool,
}

#[derive(Debug, Deserialize)]
struct Links {
    html: Href,
}

#[derive(Debug, Deserialize)]
struct Href {
    href: String,
}

/// Bitbucket Cloud provider
#[derive(Clone)]
pub struct BitbucketProvider {
    http: Client,
    config: ProviderConfig,
}

impl BitbucketProvider {
    pub fn new(http: Client, config: ProviderConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl RepositoryProvider for BitbucketProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Bitbucket
    }

    fn authorize_url(&self, redirect_uri: &str, state: &str) -> Result<Url, ConnectError> {
        let (mut url, client_id) =
            authorize_endpoint(self.kind(), &self.config, "/site/oauth2/authorize")?;
        url.query_pairs_mut()
            .append_pair("client_id", &client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("state", state);
        Ok(url)
    }

    async fn list_repositories(
        &self,
        token: &ProviderToken,
    ) -> Result<Vec<RemoteRepository>, ConnectError> {
        let request = self
            .http
            .get(api_url(&self.config, "/2.0/repositories"))
            .query(&[
                ("role", "member".to_string()),
                ("pagelen", PAGE_SIZE.to_string()),
            ])
            .bearer_auth(token.expose());

        let page: Page = fetch_json(self.kind(), request).await?;

        Ok(page
            .values
            .into_iter()
            .take(PAGE_SIZE)
            .map(|repo| RemoteRepository::new(repo.links.html.href, repo.is_private))
            .collect())
    }
}
