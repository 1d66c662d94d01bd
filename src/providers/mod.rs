//! Providers module
//!
//! This module provides:
//! - The `RepositoryProvider` trait implemented by every source-control host
//! - The provider registry used for lookup by [`ProviderKind`]
//! - One implementation per supported provider

pub mod azure_devops;
pub mod bitbucket;
pub mod github;
pub mod gitlab;
pub mod registry;
pub mod trait_;

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::ProviderConfig;
use crate::error::{ConnectError, describe_failed_response, describe_transport_error};
use crate::models::ProviderKind;

pub use azure_devops::AzureDevOpsProvider;
pub use bitbucket::BitbucketProvider;
pub use github::GitHubProvider;
pub use gitlab::GitLabProvider;
pub use registry::ProviderRegistry;
pub use trait_::{PAGE_SIZE, RepositoryProvider};

/// Send a listing request and decode the JSON body, mapping every failure to
/// [`ConnectError::ProviderApi`].
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    provider: ProviderKind,
    request: RequestBuilder,
) -> Result<T, ConnectError> {
    let response = request
        .send()
        .await
        .map_err(|e| ConnectError::ProviderApi {
            provider,
            status: None,
            message: describe_transport_error(&e),
        })?;

    if !response.status().is_success() {
        let (status, message) = describe_failed_response(response).await;
        return Err(ConnectError::ProviderApi {
            provider,
            status: Some(status),
            message,
        });
    }

    let status = response.status().as_u16();
    response
        .json::<T>()
        .await
        .map_err(|e| {
            tracing::debug!(provider = provider.as_str(), error = %e, "Provider listing body could not be decoded");
            ConnectError::ProviderApi {
                provider,
                status: Some(status),
                message: "unexpected response format".to_string(),
            }
        })
}

/// Build an authorize URL from the provider's OAuth base and `path`.
pub(crate) fn authorize_endpoint(
    provider: ProviderKind,
    config: &ProviderConfig,
    path: &str,
) -> Result<(Url, String), ConnectError> {
    let client_id = config.client_id.clone().ok_or_else(|| {
        ConnectError::Configuration(format!(
            "{} OAuth client id is not configured",
            provider.display_name()
        ))
    })?;

    let url = Url::parse(&format!(
        "{}{}",
        config.oauth_base.trim_end_matches('/'),
        path
    ))
    .map_err(|e| {
        ConnectError::Configuration(format!(
            "invalid {} OAuth base URL: {}",
            provider.display_name(),
            e
        ))
    })?;

    Ok((url, client_id))
}

pub(crate) fn api_url(config: &ProviderConfig, path: &str) -> String {
    format!("{}{}", config.api_base.trim_end_matches('/'), path)
}
