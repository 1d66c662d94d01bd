//! Provider registry
//!
//! Explicitly constructed lookup table from [`ProviderKind`] to its
//! [`RepositoryProvider`] implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::Client;

use crate::config::AppConfig;
use crate::error::ConnectError;
use crate::models::ProviderKind;
use crate::providers::{
    AzureDevOpsProvider, BitbucketProvider, GitHubProvider, GitLabProvider, RepositoryProvider,
};

/// Registry of repository providers
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderKind, Arc<dyn RepositoryProvider>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every supported provider, sharing `http`.
    pub fn from_config(config: &AppConfig, http: Client) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GitHubProvider::new(
            http.clone(),
            config.github.clone(),
        )));
        registry.register(Arc::new(GitLabProvider::new(
            http.clone(),
            config.gitlab.clone(),
        )));
        registry.register(Arc::new(BitbucketProvider::new(
            http.clone(),
            config.bitbucket.clone(),
        )));
        registry.register(Arc::new(AzureDevOpsProvider::new(
            http,
            config.azure_devops.clone(),
            config.azure_devops_organization.clone(),
        )));
        registry
    }

    /// Register a provider, replacing any previous one of the same kind
    pub fn register(&mut self, provider: Arc<dyn RepositoryProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn RepositoryProvider>, ConnectError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| ConnectError::UnknownProvider(kind.as_str().to_string()))
    }

    /// Registered provider kinds in stable order
    pub fn kinds(&self) -> Vec<ProviderKind> {
        self.providers.keys().copied().collect()
    }
}
