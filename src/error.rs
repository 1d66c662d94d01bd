//! # Error Handling
//!
//! Error kinds raised by the repository connection flow, plus the problem+json
//! envelope the callback server returns when a request cannot be served.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::ProviderKind;
use crate::telemetry;

/// Errors raised while connecting repositories
#[derive(Debug, Error)]
pub enum ConnectError {
    /// No signed-in user, or the identity token could not be obtained
    #[error("you must be signed in to connect repositories")]
    AuthRequired,

    /// The backend rejected the authorization code or the token save
    #[error("could not complete {provider} authorization: {message}")]
    Exchange {
        provider: ProviderKind,
        status: Option<u16>,
        message: String,
    },

    /// The provider repository listing failed or returned malformed data
    #[error("could not list {provider} repositories: {message}")]
    ProviderApi {
        provider: ProviderKind,
        status: Option<u16>,
        message: String,
    },

    /// A single repository could not be registered with the backend
    #[error("could not connect repository {repo_url}: {message}")]
    RepositoryConnect {
        repo_url: String,
        status: Option<u16>,
        message: String,
    },

    /// A read-only backend call failed
    #[error("StackSeek request failed: {message}")]
    Backend { status: Option<u16>, message: String },

    #[error("unknown repository provider '{0}'")]
    UnknownProvider(String),

    /// A code arrived without a provider hint in the session or the callback URL
    #[error("the provider for this authorization could not be determined")]
    MissingProvider,

    /// The provider redirected back with an `error` parameter
    #[error("authorization was denied: {0}")]
    Denied(String),

    #[error("authorization response did not match the pending request")]
    StateMismatch,

    #[error("a repository connection is already in progress")]
    Busy,

    #[error("{0}")]
    Configuration(String),
}

impl ConnectError {
    /// Stable machine-readable code (SCREAMING_SNAKE_CASE)
    pub fn code(&self) -> &'static str {
        match self {
            ConnectError::AuthRequired => "AUTH_REQUIRED",
            ConnectError::Exchange { .. } => "EXCHANGE_FAILED",
            ConnectError::ProviderApi { .. } => "PROVIDER_ERROR",
            ConnectError::RepositoryConnect { .. } => "REPOSITORY_CONNECT_FAILED",
            ConnectError::Backend { .. } => "BACKEND_ERROR",
            ConnectError::UnknownProvider(_) => "UNKNOWN_PROVIDER",
            ConnectError::MissingProvider => "MISSING_PROVIDER",
            ConnectError::Denied(_) => "AUTHORIZATION_DENIED",
            ConnectError::StateMismatch => "STATE_MISMATCH",
            ConnectError::Busy => "CONNECTION_IN_PROGRESS",
            ConnectError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// HTTP status used when the error is returned from the callback server
    pub fn status_code(&self) -> StatusCode {
        match self {
            ConnectError::AuthRequired => StatusCode::UNAUTHORIZED,
            ConnectError::Exchange { .. }
            | ConnectError::ProviderApi { .. }
            | ConnectError::RepositoryConnect { .. }
            | ConnectError::Backend { .. } => StatusCode::BAD_GATEWAY,
            ConnectError::UnknownProvider(_) => StatusCode::NOT_FOUND,
            ConnectError::Denied(_) => StatusCode::FORBIDDEN,
            ConnectError::MissingProvider | ConnectError::StateMismatch => StatusCode::BAD_REQUEST,
            ConnectError::Busy => StatusCode::CONFLICT,
            ConnectError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the end user: capitalized, no payloads or traces.
    pub fn user_message(&self) -> String {
        let message = self.to_string();
        let mut chars = message.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => message,
        }
    }
}

/// Describe a transport failure without leaking request details.
pub(crate) fn describe_transport_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "the request timed out".to_string()
    } else if error.is_connect() {
        "the server could not be reached".to_string()
    } else if error.is_decode() {
        "the response could not be read".to_string()
    } else {
        "a network error occurred".to_string()
    }
}

/// Read a non-success response into `(status, message)`.
///
/// Prefers the `message`, `error_description` or `error` field of a JSON body;
/// the raw body is only logged at debug level.
pub(crate) async fn describe_failed_response(response: reqwest::Response) -> (u16, String) {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    tracing::debug!(status, body = %body, "Upstream request failed");

    let detail = serde_json::from_str::<Value>(&body).ok().and_then(|value| {
        ["message", "error_description", "error"]
            .iter()
            .find_map(|field| value.get(*field).and_then(Value::as_str).map(str::to_string))
    });

    let message = match detail {
        Some(detail) if !detail.trim().is_empty() => detail,
        _ => format!("the server responded with status {}", status),
    };
    (status, message)
}

/// Problem+json body returned by the callback server
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    #[serde(skip_serializing)]
    pub status: StatusCode,
    pub code: Box<str>,
    pub message: Box<str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            trace_id: telemetry::current_run_id().map(|id| id.to_string().into_boxed_str()),
        }
    }
}

impl From<ConnectError> for ApiError {
    fn from(error: ConnectError) -> Self {
        if matches!(error, ConnectError::Configuration(_)) {
            tracing::error!(error = %error, "Connection flow misconfigured");
        }
        ApiError::new(
            error.status_code(),
            error.code().to_string(),
            error.user_message(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl IntoResponse for ConnectError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
