//! Repository models

use serde::{Deserialize, Serialize};

/// Repository registered with the StackSeek backend for the current user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedRepository {
    pub id: String,
    #[serde(alias = "repoUrl")]
    pub url: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Provider listing entry normalized for the backend connect call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepository {
    pub url: String,
    pub is_private: bool,
}

impl RemoteRepository {
    pub fn new<S: Into<String>>(url: S, is_private: bool) -> Self {
        Self {
            url: url.into(),
            is_private,
        }
    }
}
