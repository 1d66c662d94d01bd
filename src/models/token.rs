//! Transient OAuth credentials
//!
//! Neither type is persisted. [`ProviderToken`] is wiped from memory on drop and
//! both types redact themselves in `Debug` output.

use std::fmt;

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Single-use authorization code delivered on the OAuth callback
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AuthorizationCode(String);

impl AuthorizationCode {
    pub fn new<S: Into<String>>(code: S) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex SHA-256 of the code, the only form kept by the replay guard.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Debug for AuthorizationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthorizationCode([REDACTED])")
    }
}

/// Access token for a single provider
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ProviderToken(String);

impl ProviderToken {
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProviderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProviderToken([REDACTED])")
    }
}
