//! # Data Models
//!
//! Value types that flow through the repository connection flow.

use serde::{Deserialize, Serialize};

pub mod provider;
pub mod repository;
pub mod result;
pub mod token;

pub use provider::ProviderKind;
pub use repository::{ConnectedRepository, RemoteRepository};
pub use result::{ConnectionResult, Notice};
pub use token::{AuthorizationCode, ProviderToken};

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "stackseek-connect".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
