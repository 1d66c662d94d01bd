//! Identity provider client
//!
//! The connection flow only needs to know whether a user is signed in and to
//! obtain an identity token for backend calls.

use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::ConnectError;

/// Signed-in StackSeek user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl User {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            email: None,
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<User>;

    /// Identity token sent as `Authorization: Bearer` to the backend.
    async fn id_token(&self) -> Result<String, ConnectError>;
}

struct Session {
    user: User,
    id_token: String,
}

/// Identity backed by a token issued out of band (configuration or tests)
#[derive(Default)]
pub struct StaticIdentity {
    session: RwLock<Option<Session>>,
}

impl StaticIdentity {
    pub fn signed_in<S: Into<String>>(user: User, id_token: S) -> Self {
        Self {
            session: RwLock::new(Some(Session {
                user,
                id_token: id_token.into(),
            })),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Signed in when both `USER_ID` and `ID_TOKEN` are configured.
    pub fn from_config(config: &AppConfig) -> Self {
        match (&config.user_id, &config.id_token) {
            (Some(user_id), Some(token)) => Self::signed_in(User::new(user_id.clone()), token.clone()),
            _ => Self::signed_out(),
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut session) = self.session.write() {
            *session = None;
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<User> {
        self.session
            .read()
            .ok()
            .and_then(|session| session.as_ref().map(|s| s.user.clone()))
    }

    async fn id_token(&self) -> Result<String, ConnectError> {
        self.session
            .read()
            .ok()
            .and_then(|session| session.as_ref().map(|s| s.id_token.clone()))
            .ok_or(ConnectError::AuthRequired)
    }
}
