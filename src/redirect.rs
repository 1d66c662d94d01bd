//! # OAuth Redirect Handler
//!
//! Starts a provider connection and processes the callback URL the provider
//! redirects back to. A callback carrying a `code` is routed to the
//! [`ConnectionSequencer`] at most once per distinct code; an `error` callback
//! goes straight to the notifier; anything else refreshes the cached
//! repository list.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::counter;
use rand::Rng;
use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::ConnectError;
use crate::models::{
    AuthorizationCode, ConnectedRepository, ConnectionResult, Notice, ProviderKind,
};
use crate::notifier::ConnectionNotifier;
use crate::providers::ProviderRegistry;
use crate::replay_guard::{self, ConnectionStateStore};
use crate::sequencer::ConnectionSequencer;
use crate::session::{OAUTH_STATE_ISSUED_KEY, OAUTH_STATE_KEY, PROVIDER_HINT_KEY, SessionStore};

/// Query parameters the provider (or this handler) adds to the callback URL
const CALLBACK_PARAMS: [&str; 5] = ["code", "error", "error_description", "state", "provider"];

/// OAuth parameters read from a callback URL
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub state: Option<String>,
    pub provider: Option<String>,
}

impl CallbackParams {
    /// Empty values are treated as absent.
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            if value.is_empty() {
                continue;
            }
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                "state" => &mut params.state,
                "provider" => &mut params.provider,
                _ => continue,
            };
            slot.get_or_insert_with(|| value.into_owned());
        }
        params
    }
}

/// `url` with the OAuth callback parameters removed; other parameters keep their order.
pub fn strip_callback_params(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !CALLBACK_PARAMS.contains(&key.as_ref()))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut clean = url.clone();
    if kept.is_empty() {
        clean.set_query(None);
    } else {
        clean.query_pairs_mut().clear().extend_pairs(kept);
    }
    clean
}

/// Result of handling one callback URL
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HandlerOutcome {
    Connected {
        notice: Notice,
        result: ConnectionResult,
        clean_url: String,
    },
    Failed {
        notice: Notice,
        code: String,
        clean_url: String,
    },
    /// The code was already processed or is being processed
    ReplayIgnored { clean_url: String },
    Refreshed {
        repositories: Vec<ConnectedRepository>,
        clean_url: String,
    },
    RefreshFailed { message: String, clean_url: String },
}

impl HandlerOutcome {
    /// URL that replaces the callback URL, without a reload.
    pub fn clean_url(&self) -> &str {
        match self {
            HandlerOutcome::Connected { clean_url, .. }
            | HandlerOutcome::Failed { clean_url, .. }
            | HandlerOutcome::ReplayIgnored { clean_url }
            | HandlerOutcome::Refreshed { clean_url, .. }
            | HandlerOutcome::RefreshFailed { clean_url, .. } => clean_url,
        }
    }
}

/// Marks a connection run as in flight for as long as it lives
struct BusyGuard(Arc<AtomicUsize>);

impl BusyGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct RedirectHandler {
    session: Arc<dyn SessionStore>,
    state_store: Arc<dyn ConnectionStateStore>,
    registry: Arc<ProviderRegistry>,
    sequencer: Arc<ConnectionSequencer>,
    notifier: Arc<ConnectionNotifier>,
    redirect_uri: String,
    in_flight: Arc<AtomicUsize>,
}

impl RedirectHandler {
    pub fn new(
        session: Arc<dyn SessionStore>,
        state_store: Arc<dyn ConnectionStateStore>,
        registry: Arc<ProviderRegistry>,
        sequencer: Arc<ConnectionSequencer>,
        notifier: Arc<ConnectionNotifier>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            session,
            state_store,
            registry,
            sequencer,
            notifier,
            redirect_uri: redirect_uri.into(),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Whether a connection run is currently executing.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Authorize URL for `provider`. The provider hint and a fresh CSRF state
    /// are kept in the session until the callback arrives.
    pub fn begin(&self, provider: ProviderKind) -> Result<Url, ConnectError> {
        if self.is_busy() {
            return Err(ConnectError::Busy);
        }

        let repository_provider = self.registry.get(provider)?;
        let state = generate_state();

        let stored = self
            .session
            .set(PROVIDER_HINT_KEY, provider.as_str().to_string())
            .and_then(|_| self.session.set(OAUTH_STATE_KEY, state.clone()))
            .and_then(|_| self.session.set(OAUTH_STATE_ISSUED_KEY, "true".to_string()));

        let redirect_uri = match stored {
            Ok(()) => self.redirect_uri.clone(),
            Err(err) => {
                // Without session storage the provider has to travel in the callback URL.
                warn!(error = %err, provider = provider.as_str(), "Session storage unavailable, carrying provider in redirect URI");
                self.forget_pending();
                self.remove_session_value(OAUTH_STATE_ISSUED_KEY);
                with_provider_param(&self.redirect_uri, provider)
            }
        };

        let url = repository_provider.authorize_url(&redirect_uri, &state)?;
        info!(provider = provider.as_str(), "Starting repository authorization");
        Ok(url)
    }

    /// Process a callback URL.
    pub async fn handle(&self, url: &Url) -> HandlerOutcome {
        counter!("oauth_callback_total").increment(1);

        let params = CallbackParams::from_url(url);
        let clean_url = strip_callback_params(url).to_string();

        if let Some(error) = params.error {
            self.forget_pending();
            warn!(error = %error, "Provider returned an authorization error");
            let err = ConnectError::Denied(params.error_description.unwrap_or(error));
            return self.fail(err, clean_url);
        }

        let Some(code) = params.code.map(AuthorizationCode::new) else {
            return self.refresh(clean_url).await;
        };

        let provider = match self.resolve_provider(params.provider.as_deref()) {
            Ok(provider) => provider,
            Err(err) => return self.fail(err, clean_url),
        };

        // Claimed before the first await so concurrent deliveries cannot both run, and
        // before the state check so a re-delivered callback is reported as a replay.
        let claim = match replay_guard::claim(&self.state_store, provider, &code) {
            Ok(Some(claim)) => Some(claim),
            Ok(None) => {
                debug!(provider = provider.as_str(), "Authorization code already handled");
                return HandlerOutcome::ReplayIgnored { clean_url };
            }
            Err(err) => {
                warn!(error = %err, "Replay guard unavailable, continuing without replay protection");
                None
            }
        };

        // A rejected callback drops its claim, which releases the code.
        if let Err(err) = self.verify_state(params.state.as_deref()) {
            warn!(provider = provider.as_str(), "Callback state does not match the pending authorization");
            return self.fail(err, clean_url);
        }

        // The provider hint stays so a re-delivered callback is still recognized as a replay.
        // The issued marker stays so later callbacks still need a fresh state.
        self.remove_session_value(OAUTH_STATE_KEY);
        let _busy = BusyGuard::enter(&self.in_flight);

        let run_id = Uuid::new_v4();
        self.notifier.loading(provider, true);
        let outcome = self.sequencer.run(run_id, provider, &code).await;
        let notice = self.notifier.notify(run_id, &outcome).await;
        self.notifier.loading(provider, false);

        if let Some(Err(err)) = claim.map(|claim| claim.complete()) {
            warn!(error = %err, "Could not record authorization code as processed");
        }

        match outcome {
            Ok(result) => HandlerOutcome::Connected {
                notice,
                result,
                clean_url,
            },
            Err(err) => HandlerOutcome::Failed {
                notice,
                code: err.code().to_string(),
                clean_url,
            },
        }
    }

    /// Drop the provider hint and CSRF state of a pending authorization.
    pub fn forget_pending(&self) {
        self.remove_session_value(PROVIDER_HINT_KEY);
        self.remove_session_value(OAUTH_STATE_KEY);
    }

    fn remove_session_value(&self, key: &str) {
        if let Err(err) = self.session.remove(key) {
            warn!(error = %err, key, "Could not clear session value");
        }
    }

    async fn refresh(&self, clean_url: String) -> HandlerOutcome {
        match self.notifier.refresh_repositories().await {
            Ok(repositories) => HandlerOutcome::Refreshed {
                repositories,
                clean_url,
            },
            Err(err) => {
                debug!(error = %err, "Repository refresh failed");
                HandlerOutcome::RefreshFailed {
                    message: err.user_message(),
                    clean_url,
                }
            }
        }
    }

    fn fail(&self, error: ConnectError, clean_url: String) -> HandlerOutcome {
        let notice = self.notifier.notify_failure(&error);
        HandlerOutcome::Failed {
            notice,
            code: error.code().to_string(),
            clean_url,
        }
    }

    /// Session hint first, then the `provider` query parameter.
    fn resolve_provider(&self, from_query: Option<&str>) -> Result<ProviderKind, ConnectError> {
        let hint = match self.session.get(PROVIDER_HINT_KEY) {
            Ok(hint) => hint,
            Err(err) => {
                warn!(error = %err, "Session storage unavailable, reading provider from callback");
                None
            }
        };

        let name = hint
            .as_deref()
            .or(from_query)
            .ok_or(ConnectError::MissingProvider)?;
        name.parse::<ProviderKind>()
            .map_err(|_| ConnectError::UnknownProvider(name.to_string()))
    }

    /// Enforced once [`RedirectHandler::begin`] has issued a state in this session.
    /// A consumed or forgotten state leaves nothing to match, so the callback is rejected.
    fn verify_state(&self, received: Option<&str>) -> Result<(), ConnectError> {
        let expected = match self.session.get(OAUTH_STATE_KEY) {
            Ok(Some(expected)) => expected,
            Ok(None) => {
                return match self.session.get(OAUTH_STATE_ISSUED_KEY) {
                    Ok(Some(_)) => Err(ConnectError::StateMismatch),
                    Ok(None) => Ok(()),
                    Err(err) => {
                        warn!(error = %err, "Session storage unavailable, skipping state check");
                        Ok(())
                    }
                };
            }
            Err(err) => {
                warn!(error = %err, "Session storage unavailable, skipping state check");
                return Ok(());
            }
        };

        let matches = received
            .map(|received| bool::from(received.as_bytes().ct_eq(expected.as_bytes())))
            .unwrap_or(false);

        if matches {
            Ok(())
        } else {
            Err(ConnectError::StateMismatch)
        }
    }
}

fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    base64_url::encode(&bytes)
}

fn with_provider_param(redirect_uri: &str, provider: ProviderKind) -> String {
    match Url::parse(redirect_uri) {
        Ok(mut url) => {
            url.query_pairs_mut()
                .append_pair("provider", provider.as_str());
            url.to_string()
        }
        Err(_) => redirect_uri.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_params_ignore_empty_values() {
        let url = Url::parse("http://127.0.0.1:8765/oauth/callback?code=&error=access_denied&state=s1")
            .unwrap();
        let params = CallbackParams::from_url(&url);

        assert!(params.code.is_none());
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.state.as_deref(), Some("s1"));
    }

    #[test]
    fn strip_keeps_unrelated_params() {
        let url = Url::parse("http://app.test/settings?tab=repos&code=abc123&state=xyz&provider=github")
            .unwrap();
        assert_eq!(
            strip_callback_params(&url).as_str(),
            "http://app.test/settings?tab=repos"
        );

        let only_oauth = Url::parse("http://app.test/settings?code=abc123").unwrap();
        assert_eq!(
            strip_callback_params(&only_oauth).as_str(),
            "http://app.test/settings"
        );
    }

    #[test]
    fn generated_state_is_url_safe_and_unique() {
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn provider_param_is_appended_to_redirect_uri() {
        assert_eq!(
            with_provider_param("http://127.0.0.1:8765/oauth/callback", ProviderKind::GitLab),
            "http://127.0.0.1:8765/oauth/callback?provider=gitlab"
        );
    }
}
