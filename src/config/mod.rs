//! Configuration loading for the repository connect client.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `STACKSEEK_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::models::ProviderKind;

const ENV_PREFIX: &str = "STACKSEEK_";

/// Application configuration derived from `STACKSEEK_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_backend_base_url")]
    pub backend_base_url: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_connect_concurrency")]
    pub connect_concurrency: usize,
    #[serde(default = "default_replay_guard_capacity")]
    pub replay_guard_capacity: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default = "default_github")]
    pub github: ProviderConfig,
    #[serde(default = "default_gitlab")]
    pub gitlab: ProviderConfig,
    #[serde(default = "default_bitbucket")]
    pub bitbucket: ProviderConfig,
    #[serde(default = "default_azure_devops")]
    pub azure_devops: ProviderConfig,
    /// Azure DevOps organization; discovered from the user's profile when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_devops_organization: Option<String>,
}

/// OAuth application and API endpoints for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Base URL hosting the authorize endpoint
    pub oauth_base: String,
    /// Base URL of the repository listing API
    pub api_base: String,
}

impl ProviderConfig {
    pub fn new<S: Into<String>>(client_id: Option<String>, oauth_base: S, api_base: S) -> Self {
        Self {
            client_id,
            oauth_base: oauth_base.into(),
            api_base: api_base.into(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            backend_base_url: default_backend_base_url(),
            redirect_uri: default_redirect_uri(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_concurrency: default_connect_concurrency(),
            replay_guard_capacity: default_replay_guard_capacity(),
            user_id: None,
            id_token: None,
            github: default_github(),
            gitlab: default_gitlab(),
            bitbucket: default_bitbucket(),
            azure_devops: default_azure_devops(),
            azure_devops_organization: None,
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Per-request timeout applied to every backend and provider call.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Endpoints configured for `provider`.
    pub fn provider(&self, provider: ProviderKind) -> &ProviderConfig {
        match provider {
            ProviderKind::GitHub => &self.github,
            ProviderKind::GitLab => &self.gitlab,
            ProviderKind::Bitbucket => &self.bitbucket,
            ProviderKind::AzureDevOps => &self.azure_devops,
        }
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.id_token.is_some() {
            config.id_token = Some("[REDACTED]".to_string());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if a setting is out of bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 || self.request_timeout_ms > 300_000 {
            return Err(ConfigError::InvalidRequestTimeout {
                value: self.request_timeout_ms,
            });
        }

        if self.connect_concurrency == 0 || self.connect_concurrency > 32 {
            return Err(ConfigError::InvalidConnectConcurrency {
                value: self.connect_concurrency,
            });
        }

        if self.replay_guard_capacity == 0 {
            return Err(ConfigError::InvalidReplayGuardCapacity {
                value: self.replay_guard_capacity,
            });
        }

        let backend = parse_url("BACKEND_BASE_URL", &self.backend_base_url)?;
        parse_url("REDIRECT_URI", &self.redirect_uri)?;

        for provider in ProviderKind::ALL {
            let endpoints = self.provider(provider);
            parse_url(&format!("{}_OAUTH_BASE", env_key(provider)), &endpoints.oauth_base)?;
            parse_url(&format!("{}_API_BASE", env_key(provider)), &endpoints.api_base)?;
        }

        // Identity tokens travel to the backend as bearer credentials.
        if !matches!(self.profile.as_str(), "local" | "test") && backend.scheme() != "https" {
            return Err(ConfigError::InsecureBackendUrl {
                value: self.backend_base_url.clone(),
            });
        }

        Ok(())
    }
}

fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        key: key.to_string(),
        value: value.to_string(),
        source,
    })
}

fn env_key(provider: ProviderKind) -> &'static str {
    match provider {
        ProviderKind::GitHub => "GITHUB",
        ProviderKind::GitLab => "GITLAB",
        ProviderKind::Bitbucket => "BITBUCKET",
        ProviderKind::AzureDevOps => "AZURE_DEVOPS",
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "127.0.0.1:8765".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_backend_base_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_redirect_uri() -> String {
    "http://127.0.0.1:8765/oauth/callback".to_string()
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_connect_concurrency() -> usize {
    8
}

fn default_replay_guard_capacity() -> usize {
    256
}

fn default_github() -> ProviderConfig {
    ProviderConfig::new(None, "https://github.com", "https://api.github.com")
}

fn default_gitlab() -> ProviderConfig {
    ProviderConfig::new(None, "https://gitlab.com", "https://gitlab.com")
}

fn default_bitbucket() -> ProviderConfig {
    ProviderConfig::new(None, "https://bitbucket.org", "https://api.bitbucket.org")
}

fn default_azure_devops() -> ProviderConfig {
    ProviderConfig::new(
        None,
        "https://app.vssps.visualstudio.com",
        "https://dev.azure.com",
    )
}

fn default_provider(provider: ProviderKind) -> ProviderConfig {
    match provider {
        ProviderKind::GitHub => default_github(),
        ProviderKind::GitLab => default_gitlab(),
        ProviderKind::Bitbucket => default_bitbucket(),
        ProviderKind::AzureDevOps => default_azure_devops(),
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid URL for STACKSEEK_{key} '{value}': {source}")]
    InvalidUrl {
        key: String,
        value: String,
        source: url::ParseError,
    },
    #[error("backend URL must use https outside local/test profiles, got '{value}'")]
    InsecureBackendUrl { value: String },
    #[error("request timeout must be between 1 and 300000 milliseconds, got {value}")]
    InvalidRequestTimeout { value: u64 },
    #[error("connect concurrency must be between 1 and 32, got {value}")]
    InvalidConnectConcurrency { value: usize },
    #[error("replay guard capacity must be positive, got {value}")]
    InvalidReplayGuardCapacity { value: usize },
}

/// Loads configuration using layered `.env` files and `STACKSEEK_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads `.env` layers then process variables, validating the result.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = take_non_empty(&mut layered, "PROFILE").unwrap_or(profile_hint);
        let api_bind_addr =
            take_non_empty(&mut layered, "API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level = take_non_empty(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format =
            take_non_empty(&mut layered, "LOG_FORMAT").unwrap_or_else(default_log_format);
        let backend_base_url = take_non_empty(&mut layered, "BACKEND_BASE_URL")
            .unwrap_or_else(default_backend_base_url);
        let redirect_uri =
            take_non_empty(&mut layered, "REDIRECT_URI").unwrap_or_else(default_redirect_uri);
        let request_timeout_ms = layered
            .remove("REQUEST_TIMEOUT_MS")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_else(default_request_timeout_ms);
        let connect_concurrency = layered
            .remove("CONNECT_CONCURRENCY")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_else(default_connect_concurrency);
        let replay_guard_capacity = layered
            .remove("REPLAY_GUARD_CAPACITY")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_else(default_replay_guard_capacity);
        let user_id = take_non_empty(&mut layered, "USER_ID");
        let id_token = take_non_empty(&mut layered, "ID_TOKEN");
        let azure_devops_organization = take_non_empty(&mut layered, "AZURE_DEVOPS_ORGANIZATION");

        let mut load_provider = |provider: ProviderKind| {
            let key = env_key(provider);
            let defaults = default_provider(provider);
            ProviderConfig {
                client_id: take_non_empty(&mut layered, &format!("{}_CLIENT_ID", key)),
                oauth_base: take_non_empty(&mut layered, &format!("{}_OAUTH_BASE", key))
                    .unwrap_or(defaults.oauth_base),
                api_base: take_non_empty(&mut layered, &format!("{}_API_BASE", key))
                    .unwrap_or(defaults.api_base),
            }
        };
        let github = load_provider(ProviderKind::GitHub);
        let gitlab = load_provider(ProviderKind::GitLab);
        let bitbucket = load_provider(ProviderKind::Bitbucket);
        let azure_devops = load_provider(ProviderKind::AzureDevOps);

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            backend_base_url,
            redirect_uri,
            request_timeout_ms,
            connect_concurrency,
            replay_guard_capacity,
            user_id,
            id_token,
            github,
            gitlab,
            bitbucket,
            azure_devops,
            azure_devops_organization,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{}PROFILE", ENV_PREFIX))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_non_empty(values: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    values
        .remove(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(
            config.provider(ProviderKind::Bitbucket).api_base,
            "https://api.bitbucket.org"
        );
    }

    #[test]
    fn rejects_out_of_range_values() {
        let config = AppConfig {
            request_timeout_ms: 0,
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRequestTimeout { value: 0 })
        ));

        let config = AppConfig {
            connect_concurrency: 64,
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConnectConcurrency { value: 64 })
        ));

        let config = AppConfig {
            replay_guard_capacity: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn production_requires_https_backend() {
        let config = AppConfig {
            profile: "production".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InsecureBackendUrl { .. })
        ));

        let config = AppConfig {
            profile: "production".to_string(),
            backend_base_url: "https://api.stackseek.io".to_string(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unparseable_provider_url() {
        let mut config = AppConfig::default();
        config.gitlab.api_base = "not a url".to_string();

        match config.validate() {
            Err(ConfigError::InvalidUrl { key, .. }) => assert_eq!(key, "GITLAB_API_BASE"),
            other => panic!("expected InvalidUrl, got {:?}", other),
        }
    }

    #[test]
    fn redacts_identity_token() {
        let config = AppConfig {
            id_token: Some("eyJhbGciOi".to_string()),
            ..AppConfig::default()
        };
        let json = config.redacted_json().unwrap();
        assert!(json.contains("[REDACTED]"));
        assert!(!json.contains("eyJhbGciOi"));
    }
}
