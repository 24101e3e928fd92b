//! OAuth 2.0 authorization-code flow with PKCE.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use super::callback::{CallbackListener, CallbackOutcome};
use super::credential::{load_credential, save_credential, Credential, TokenResponse};
use super::pkce::{generate_state, PkcePair};
use crate::config::{AuthConfig, Config, ConfigError};
use crate::constants::USER_AGENT;
use crate::error::{ArchiveError, Result};

/// Where the token manager is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authorizing,
    Authenticated(Credential),
    Expired(Credential),
}

/// An authorization that has been started but not yet completed.
///
/// The user must open [`PendingAuthorization::authorization_url`]; the
/// redirect lands on the listener bound by
/// [`TokenManager::begin_authorization`].
pub struct PendingAuthorization {
    authorization_url: Url,
    state: String,
    pkce: PkcePair,
    listener: CallbackListener,
}

impl PendingAuthorization {
    #[must_use]
    pub fn authorization_url(&self) -> &Url {
        &self.authorization_url
    }

    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Address the callback listener actually bound.
    #[must_use]
    pub fn callback_addr(&self) -> std::net::SocketAddr {
        self.listener.local_addr()
    }
}

/// Obtains, caches and reports on the OAuth credential.
pub struct TokenManager {
    config: AuthConfig,
    callback_timeout: Duration,
    http: reqwest::Client,
    state: AuthState,
}

impl TokenManager {
    /// # Errors
    ///
    /// Returns [`ArchiveError::Network`] if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ArchiveError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config: config.auth.clone(),
            callback_timeout: config.callback_timeout(),
            http,
            state: AuthState::Unauthenticated,
        })
    }

    #[must_use]
    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// The current credential, if it is present and unexpired.
    #[must_use]
    pub fn credential(&self) -> Option<&Credential> {
        match &self.state {
            AuthState::Authenticated(credential) if !credential.is_expired() => Some(credential),
            _ => None,
        }
    }

    /// Load the credential cache and classify what it holds.
    pub async fn load_cached(&mut self) -> &AuthState {
        self.state = match load_credential(&self.config.token_cache_path).await {
            None => {
                debug!(path = %self.config.token_cache_path.display(), "No cached credential");
                AuthState::Unauthenticated
            }
            Some(credential) if credential.is_expired() => {
                info!(expired_at = %credential.expires_at, "Cached credential has expired");
                AuthState::Expired(credential)
            }
            Some(credential) => {
                debug!(expires_at = %credential.expires_at, "Loaded cached credential");
                AuthState::Authenticated(credential)
            }
        };
        &self.state
    }

    /// Run the full interactive flow and cache the result.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Auth`] if the user denies access, the callback
    /// times out or fails the `state` check, or the code exchange fails.
    pub async fn authorize(&mut self) -> Result<Credential> {
        let pending = self.begin_authorization().await?;
        info!(
            url = %pending.authorization_url(),
            "Open this URL in a browser to authorize access"
        );
        self.complete_authorization(pending).await
    }

    /// Forget any cached credential and authorize again.
    ///
    /// # Errors
    ///
    /// Same as [`TokenManager::authorize`].
    pub async fn reauthorize(&mut self) -> Result<Credential> {
        info!("Re-authorizing");
        self.clear_cache().await?;
        self.authorize().await
    }

    /// Bind the callback listener and build the authorization URL.
    ///
    /// # Errors
    ///
    /// Returns a config error if the client id or URLs are unusable, or
    /// [`ArchiveError::Auth`] if the listener cannot bind.
    pub async fn begin_authorization(&mut self) -> Result<PendingAuthorization> {
        if self.config.client_id.is_empty() {
            return Err(ConfigError::MissingEnvVar("LINKEDIN_CLIENT_ID".to_string()).into());
        }
        let redirect_uri = parse_url("auth.redirect_uri", &self.config.redirect_uri)?;

        let pkce = PkcePair::generate();
        let state = generate_state();
        let authorization_url = self.authorization_url(&state, &pkce)?;
        let listener = CallbackListener::bind(&redirect_uri).await?;

        self.state = AuthState::Authorizing;
        Ok(PendingAuthorization {
            authorization_url,
            state,
            pkce,
            listener,
        })
    }

    /// Wait for the redirect, exchange the code and persist the credential.
    ///
    /// # Errors
    ///
    /// See [`TokenManager::authorize`].
    pub async fn complete_authorization(
        &mut self,
        pending: PendingAuthorization,
    ) -> Result<Credential> {
        let result = self.finish(pending).await;
        match &result {
            Ok(credential) => {
                info!(expires_at = %credential.expires_at, "Authorization complete");
                self.state = AuthState::Authenticated(credential.clone());
            }
            Err(e) => {
                warn!(error = %e, "Authorization failed");
                self.state = AuthState::Unauthenticated;
            }
        }
        result
    }

    async fn finish(&self, pending: PendingAuthorization) -> Result<Credential> {
        let PendingAuthorization {
            state,
            pkce,
            listener,
            ..
        } = pending;

        let code = match listener.wait(self.callback_timeout).await? {
            CallbackOutcome::Denied { error, description } => {
                return Err(ArchiveError::Auth(match description {
                    Some(d) => format!("authorization denied: {error}: {d}"),
                    None => format!("authorization denied: {error}"),
                }));
            }
            CallbackOutcome::Code {
                state: returned, ..
            } if returned.as_deref() != Some(state.as_str()) => {
                return Err(ArchiveError::Auth(
                    "callback state does not match the authorization request".to_string(),
                ));
            }
            CallbackOutcome::Code { code, .. } => code,
        };

        let credential = self.exchange_code(&code, &pkce.verifier).await?;
        save_credential(&self.config.token_cache_path, &credential).await?;
        Ok(credential)
    }

    /// Exchange an authorization code for a credential.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Auth`] on any failure, network errors included.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<Credential> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code_verifier", verifier),
        ];

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| ArchiveError::Auth(format!("token exchange failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArchiveError::Auth(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                truncate(&body, 200)
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ArchiveError::Auth(format!("malformed token response: {e}")))?;
        Credential::from_token_response(token, Utc::now())
    }

    /// Delete the credential cache.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Filesystem`] if the file exists but cannot be
    /// removed.
    pub async fn clear_cache(&mut self) -> Result<()> {
        let path = &self.config.token_cache_path;
        match tokio::fs::remove_file(path).await {
            Ok(()) => info!(path = %path.display(), "Cleared cached credential"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ArchiveError::filesystem(path, e)),
        }
        self.state = AuthState::Unauthenticated;
        Ok(())
    }

    fn authorization_url(&self, state: &str, pkce: &PkcePair) -> Result<Url> {
        let mut url = parse_url("auth.authorization_url", &self.config.authorization_url)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("state", state)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", pkce.method());
        Ok(url)
    }
}

fn parse_url(name: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| {
        ArchiveError::from(ConfigError::InvalidValue {
            name: name.to_string(),
            message: e.to_string(),
        })
    })
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
