//! Azure DevOps provider implementation
//!
//! Repositories are scoped to an organization. When none is configured, the
//! first organization the user belongs to is discovered through the VSSPS
//! profile and accounts APIs (served from the OAuth base).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::ProviderConfig;
use crate::error::ConnectError;
use crate::models::{ProviderKind, ProviderToken, RemoteRepository};
use crate::providers::{PAGE_SIZE, RepositoryProvider, api_url, authorize_endpoint, fetch_json};

const API_VERSION: &str = "7.1";
const SCOPES: &str = "vso.code";

#[derive(Debug, Deserialize)]
struct Profile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ValueList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Account {
    account_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GitRepository {
    web_url: String,
    #[serde(default)]
    project: Option<Project>,
}

#[derive(Debug, Deserialize)]
struct Project {
    #[serde(default)]
    visibility: Option<String>,
}

/// Azure DevOps provider
#[derive(Clone)]
pub struct AzureDevOpsProvider {
    http: Client,
    config: ProviderConfig,
    organization: Option<String>,
}

impl AzureDevOpsProvider {
    pub fn new(http: Client, config: ProviderConfig, organization: Option<String>) -> Self {
        Self {
            http,
            config,
            organization,
        }
    }

    fn vssps_url(&self, path: &str) -> String {
        format!("{}{}", self.config.oauth_base.trim_end_matches('/'), path)
    }

    async fn resolve_organization(&self, token: &ProviderToken) -> Result<String, ConnectError> {
        if let Some(organization) = &self.organization {
            return Ok(organization.clone());
        }

        let profile: Profile = fetch_json(
            self.kind(),
            self.http
                .get(self.vssps_url("/_apis/profile/profiles/me"))
                .query(&[("api-version", API_VERSION)])
                .bearer_auth(token.expose()),
        )
        .await?;

        let accounts: ValueList<Account> = fetch_json(
            self.kind(),
            self.http
                .get(self.vssps_url("/_apis/accounts"))
                .query(&[("memberId", profile.id.as_str()), ("api-version", API_VERSION)])
                .bearer_auth(token.expose()),
        )
        .await?;

        let organization = accounts
            .value
            .into_iter()
            .next()
            .map(|account| account.account_name)
            .ok_or_else(|| ConnectError::ProviderApi {
                provider: self.kind(),
                status: None,
                message: "no Azure DevOps organizations found for this account".to_string(),
            })?;

        debug!(organization = %organization, "Discovered Azure DevOps organization");
        Ok(organization)
    }
}

#[async_trait]
impl RepositoryProvider for AzureDevOpsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AzureDevOps
    }

    fn authorize_url(&self, redirect_uri: &str, state: &str) -> Result<Url, ConnectError> {
        let (mut url, client_id) = authorize_endpoint(self.kind(), &self.config, "/oauth2/authorize")?;
        url.query_pairs_mut()
            .append_pair("client_id", &client_id)
            .append_pair("response_type", "Assertion")
            .append_pair("state", state)
            .append_pair("scope", SCOPES)
            .append_pair("redirect_uri", redirect_uri);
        Ok(url)
    }

    async fn list_repositories(
        &self,
        token: &ProviderToken,
    ) -> Result<Vec<RemoteRepository>, ConnectError> {
        let organization = self.resolve_organization(token).await?;

        let repositories: ValueList<GitRepository> = fetch_json(
            self.kind(),
            self.http
                .get(api_url(
                    &self.config,
                    &format!("/{}/_apis/git/repositories", organization),
                ))
                .query(&[("api-version", API_VERSION)])
                .bearer_auth(token.expose()),
        )
        .await?;

        Ok(repositories
            .value
            .into_iter()
            .take(PAGE_SIZE)
            .map(|repo| {
                let is_private = repo
                    .project
                    .and_then(|project| project.visibility)
                    .is_none_or(|visibility| !visibility.eq_ignore_ascii_case("public"));
                RemoteRepository::new(repo.web_url, is_private)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_url_uses_assertion_flow() {
        let provider = AzureDevOpsProvider::new(
            Client::new(),
            ProviderConfig::new(
                Some("azure-app".to_string()),
                "https://app.vssps.visualstudio.com",
                "https://dev.azure.com",
            ),
            None,
        );

        let url = provider.authorize_url("https://app/cb", "st").unwrap();
        assert_eq!(url.path(), "/oauth2/authorize");
        assert!(url.query_pairs().any(|(k, v)| k == "response_type" && v == "Assertion"));
        assert!(url.query_pairs().any(|(k, v)| k == "scope" && v == "vso.code"));
    }
}
