//! Provider identifiers
//!
//! External source-control hosts a user can link repositories from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Source-control host supported by the connection flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "gitlab")]
    GitLab,
    #[serde(rename = "bitbucket")]
    Bitbucket,
    #[serde(rename = "azure_devops")]
    AzureDevOps,
}

impl ProviderKind {
    /// Every supported provider, in registration order.
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::GitHub,
        ProviderKind::GitLab,
        ProviderKind::Bitbucket,
        ProviderKind::AzureDevOps,
    ];

    /// Slug used in backend paths and session storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::GitHub => "github",
            ProviderKind::GitLab => "gitlab",
            ProviderKind::Bitbucket => "bitbucket",
            ProviderKind::AzureDevOps => "azure_devops",
        }
    }

    /// Human-readable name shown to users.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::GitHub => "GitHub",
            ProviderKind::GitLab => "GitLab",
            ProviderKind::Bitbucket => "Bitbucket",
            ProviderKind::AzureDevOps => "Azure DevOps",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Returned when a string does not name a supported provider
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown repository provider '{0}'")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(ProviderKind::GitHub),
            "gitlab" => Ok(ProviderKind::GitLab),
            "bitbucket" => Ok(ProviderKind::Bitbucket),
            "azure_devops" | "azure-devops" | "azure" => Ok(ProviderKind::AzureDevOps),
            _ => Err(UnknownProvider(value.to_string())),
        }
    }
}
