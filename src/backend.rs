//! # StackSeek Backend Client
//!
//! Typed wrapper over the repository endpoints of the StackSeek REST API.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{ConnectError, describe_failed_response, describe_transport_error};
use crate::models::{AuthorizationCode, ConnectedRepository, ProviderKind, ProviderToken, RemoteRepository};

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RepositoryListResponse {
    Bare(Vec<ConnectedRepository>),
    Wrapped { repositories: Vec<ConnectedRepository> },
}

impl From<RepositoryListResponse> for Vec<ConnectedRepository> {
    fn from(response: RepositoryListResponse) -> Self {
        match response {
            RepositoryListResponse::Bare(repositories)
            | RepositoryListResponse::Wrapped { repositories } => repositories,
        }
    }
}

/// Client for the backend repository endpoints
#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    /// `http` carries the per-request timeout.
    pub fn new<S: Into<String>>(http: Client, base_url: S) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `POST /api/repository/oauth/{provider}`: trade the authorization code for a provider token.
    pub async fn exchange_code(
        &self,
        provider: ProviderKind,
        code: &AuthorizationCode,
    ) -> Result<ProviderToken, ConnectError> {
        let exchange_error = |status, message| ConnectError::Exchange {
            provider,
            status,
            message,
        };

        let response = self
            .http
            .post(self.endpoint(&format!("/api/repository/oauth/{}", provider.as_str())))
            .json(&json!({ "code": code.as_str() }))
            .send()
            .await
            .map_err(|e| exchange_error(None, describe_transport_error(&e)))?;

        if !response.status().is_success() {
            let (status, message) = describe_failed_response(response).await;
            return Err(exchange_error(Some(status), message));
        }

        let status = response.status().as_u16();
        let body: ExchangeResponse = response.json().await.map_err(|_| {
            exchange_error(
                Some(status),
                "the token response could not be read".to_string(),
            )
        })?;

        match body.access_token {
            Some(token) if !token.is_empty() => Ok(ProviderToken::new(token)),
            _ => Err(exchange_error(
                Some(status),
                "the response did not include an access token".to_string(),
            )),
        }
    }

    /// `POST /api/repository/{provider}-token`: store the provider token for the signed-in user.
    pub async fn save_provider_token(
        &self,
        provider: ProviderKind,
        token: &ProviderToken,
        id_token: &str,
    ) -> Result<(), ConnectError> {
        let save_error = |status, message: String| ConnectError::Exchange {
            provider,
            status,
            message: format!("the access token could not be saved ({})", message),
        };

        let response = self
            .http
            .post(self.endpoint(&format!("/api/repository/{}-token", provider.as_str())))
            .bearer_auth(id_token)
            .json(&json!({ "accessToken": token.expose() }))
            .send()
            .await
            .map_err(|e| save_error(None, describe_transport_error(&e)))?;

        if !response.status().is_success() {
            let (status, message) = describe_failed_response(response).await;
            return Err(save_error(Some(status), message));
        }

        debug!(provider = provider.as_str(), "Provider token saved");
        Ok(())
    }

    /// `POST /api/repository/connect`: register one repository.
    pub async fn connect_repository(
        &self,
        id_token: &str,
        repository: &RemoteRepository,
    ) -> Result<(), ConnectError> {
        let connect_error = |status, message| ConnectError::RepositoryConnect {
            repo_url: repository.url.clone(),
            status,
            message,
        };

        let response = self
            .http
            .post(self.endpoint("/api/repository/connect"))
            .bearer_auth(id_token)
            .json(&json!({
                "repoUrl": repository.url,
                "isPrivate": repository.is_private,
            }))
            .send()
            .await
            .map_err(|e| connect_error(None, describe_transport_error(&e)))?;

        if !response.status().is_success() {
            let (status, message) = describe_failed_response(response).await;
            return Err(connect_error(Some(status), message));
        }

        Ok(())
    }

    /// `GET /api/repository/user`: repositories connected for the signed-in user.
    pub async fn list_user_repositories(
        &self,
        id_token: &str,
    ) -> Result<Vec<ConnectedRepository>, ConnectError> {
        let response = self
            .http
            .get(self.endpoint("/api/repository/user"))
            .bearer_auth(id_token)
            .send()
            .await
            .map_err(|e| ConnectError::Backend {
                status: None,
                message: describe_transport_error(&e),
            })?;

        if !response.status().is_success() {
            let (status, message) = describe_failed_response(response).await;
            return Err(ConnectError::Backend {
                status: Some(status),
                message,
            });
        }

        let status = response.status().as_u16();
        let body: RepositoryListResponse =
            response.json().await.map_err(|_| ConnectError::Backend {
                status: Some(status),
                message: "the repository list could not be read".to_string(),
            })?;

        Ok(body.into())
    }
}
