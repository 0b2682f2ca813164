use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::config::AuthSettings;
use crate::error::AuthError;
use crate::oauth::browser::{BrowserOpener, SystemBrowser};
use crate::oauth::callback::{render_page, CallbackListener, PageRenderer};
use crate::oauth::endpoints::ProviderEndpoints;
use crate::oauth::pkce::PkceChallenge;
use crate::oauth::random::{self, OsSecretSource, SecretSource};
use crate::oauth::registry::{ClientCredentials, ClientRegistry};
use crate::oauth::status::StatusReport;
use crate::oauth::store::CredentialStore;
use crate::oauth::token::{TokenLifecycle, TokenSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Registering,
    AwaitingUserConsent,
    ExchangingCode,
    Authenticated,
    Refreshing,
}

/// Drives login, refresh, status and logout for a single site.
///
/// All collaborators are injected: the credential store, the browser
/// launcher and the randomness source. Nothing is process-global, so
/// independent orchestrators never observe each other's state.
pub struct AuthOrchestrator {
    site: String,
    scopes: Vec<String>,
    callback_timeout: Duration,
    registry: ClientRegistry,
    store: Arc<dyn CredentialStore>,
    browser: Box<dyn BrowserOpener>,
    secrets: Box<dyn SecretSource>,
    renderer: PageRenderer,
    state: Mutex<AuthState>,
    /// SHA-256 of the refresh token whose last refresh was rejected.
    failed_refresh: Mutex<Option<String>>,
}

impl AuthOrchestrator {
    pub fn new(settings: &AuthSettings, store: Arc<dyn CredentialStore>) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .build()
            .map_err(std::io::Error::other)?;
        let registry = ClientRegistry::new(
            &settings.site,
            &settings.client_name,
            ProviderEndpoints::for_site(&settings.site),
            http,
        );
        Ok(Self {
            site: settings.site.clone(),
            scopes: settings.scopes.clone(),
            callback_timeout: settings.callback_timeout,
            registry,
            store,
            browser: Box::new(SystemBrowser),
            secrets: Box::new(OsSecretSource),
            renderer: render_page,
            state: Mutex::new(AuthState::Unauthenticated),
            failed_refresh: Mutex::new(None),
        })
    }

    pub fn with_browser(mut self, browser: Box<dyn BrowserOpener>) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_secret_source(mut self, secrets: Box<dyn SecretSource>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_page_renderer(mut self, renderer: PageRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.registry = self.registry.with_endpoints(endpoints);
        self
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn state(&self) -> AuthState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(AuthState::Unauthenticated)
    }

    fn transition(&self, next: AuthState) {
        if let Ok(mut state) = self.state.lock() {
            let prev = *state;
            tracing::debug!(site = %self.site, from = ?prev, state = ?next, "auth state");
            *state = next;
        }
    }

    fn auth_required(&self, reason: impl Into<String>) -> AuthError {
        AuthError::AuthRequired {
            site: self.site.clone(),
            reason: reason.into(),
        }
    }

    /// Run the interactive authorization-code flow and store the tokens.
    ///
    /// The callback listener is stopped on every exit path.
    pub async fn login(&self) -> Result<TokenSet, AuthError> {
        let mut listener = CallbackListener::bind_with_renderer(self.renderer).await?;
        listener.start();
        let outcome = self.login_with(&mut listener).await;
        listener.stop().await;
        if outcome.is_err() {
            self.transition(AuthState::Unauthenticated);
        }
        outcome
    }

    async fn login_with(&self, listener: &mut CallbackListener) -> Result<TokenSet, AuthError> {
        let redirect_uri = listener.redirect_uri();
        let creds = self.client_credentials(&redirect_uri).await?;

        let pkce = PkceChallenge::create(self.secrets.as_ref());
        let state = random::generate_state(self.secrets.as_ref());
        let auth_url = self.registry.endpoints().authorization_url(
            &creds.client_id,
            &redirect_uri,
            &state,
            &pkce,
            &self.scopes,
        );

        self.transition(AuthState::AwaitingUserConsent);
        eprintln!("Opening browser for authentication...");
        eprintln!("If the browser doesn't open, visit:\n\n  {auth_url}\n");
        if let Err(e) = self.browser.open(&auth_url) {
            tracing::warn!("Could not open browser automatically: {e}");
        }

        let callback = listener.wait_for_callback(self.callback_timeout).await?;
        if callback.is_error() {
            return Err(AuthError::ProviderError {
                error: callback.error,
                description: Some(callback.error_description).filter(|d| !d.is_empty()),
            });
        }
        if !states_match(&callback.state, &state) {
            tracing::warn!(site = %self.site, "callback state did not match; aborting login");
            return Err(AuthError::CsrfMismatch);
        }
        if callback.code.is_empty() {
            return Err(AuthError::ProviderError {
                error: "invalid_callback".to_string(),
                description: Some("redirect carried neither a code nor an error".to_string()),
            });
        }

        self.transition(AuthState::ExchangingCode);
        let tokens = self
            .registry
            .exchange_code(&callback.code, &redirect_uri, &pkce.verifier, &creds)
            .await?;
        self.store.save_tokens(&self.site, &tokens)?;
        self.clear_failed_refresh();
        self.transition(AuthState::Authenticated);
        tracing::info!(site = %self.site, client_id = %creds.client_id, "login complete");
        Ok(tokens)
    }

    /// Stored client for this site, registering one on first use.
    async fn client_credentials(&self, redirect_uri: &str) -> Result<ClientCredentials, AuthError> {
        if let Some(creds) = self.store.load_client_credentials(&self.site)? {
            tracing::debug!(site = %self.site, client_id = %creds.client_id, "reusing registered client");
            return Ok(creds);
        }
        self.transition(AuthState::Registering);
        let creds = self.registry.register(redirect_uri, &self.scopes).await?;
        self.store.save_client_credentials(&self.site, &creds)?;
        Ok(creds)
    }

    /// The stored token plus whether its refresh has already been rejected.
    pub fn lifecycle(&self) -> Result<TokenLifecycle, AuthError> {
        let mut lifecycle = TokenLifecycle::new(self.store.load_tokens(&self.site)?);
        let failed = self
            .failed_refresh
            .lock()
            .ok()
            .and_then(|guard| guard.clone());
        if let (Some(failed), Some(token)) = (failed, lifecycle.token.as_ref()) {
            if token.refresh_token.as_deref().map(fingerprint) == Some(failed) {
                lifecycle.mark_refresh_failed();
            }
        }
        Ok(lifecycle)
    }

    pub fn status(&self) -> Result<StatusReport, AuthError> {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> Result<StatusReport, AuthError> {
        let lifecycle = self.lifecycle()?;
        Ok(StatusReport::from_lifecycle(
            &self.site,
            &lifecycle,
            now,
            self.store.location(),
        ))
    }

    /// Exchange the stored refresh token for a new token set.
    ///
    /// A rejected refresh leaves the stored tokens untouched.
    pub async fn refresh(&self) -> Result<TokenSet, AuthError> {
        let tokens = self
            .store
            .load_tokens(&self.site)?
            .ok_or_else(|| self.auth_required("no tokens stored, must login first"))?;
        let refresh_token = tokens
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| self.auth_required("no refresh token stored"))?;
        let creds = self
            .store
            .load_client_credentials(&self.site)?
            .ok_or_else(|| self.auth_required("no client registration stored, must login first"))?;

        self.transition(AuthState::Refreshing);
        match self.registry.refresh_token(refresh_token, &creds).await {
            Ok(new_tokens) => {
                self.store.save_tokens(&self.site, &new_tokens)?;
                self.clear_failed_refresh();
                self.transition(AuthState::Authenticated);
                tracing::info!(site = %self.site, "token refreshed");
                Ok(new_tokens)
            }
            Err(e) => {
                if let Ok(mut failed) = self.failed_refresh.lock() {
                    *failed = Some(fingerprint(refresh_token));
                }
                self.transition(AuthState::Unauthenticated);
                tracing::debug!(site = %self.site, code = e.code(), "token refresh failed");
                Err(e)
            }
        }
    }

    /// Forget the tokens and the client registration. Succeeds when nothing is stored.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.store.delete_tokens(&self.site)?;
        self.store.delete_client_credentials(&self.site)?;
        self.clear_failed_refresh();
        self.transition(AuthState::Unauthenticated);
        tracing::info!(site = %self.site, "logged out");
        Ok(())
    }

    /// A token safe to use right now, refreshing first when it is close to expiry.
    pub async fn valid_token(&self) -> Result<TokenSet, AuthError> {
        let lifecycle = self.lifecycle()?;
        let Some(token) = lifecycle.token else {
            return Err(self.auth_required("no tokens stored"));
        };
        if !token.is_expiring_soon(Utc::now()) {
            return Ok(token);
        }
        if lifecycle.refresh_failed {
            return Err(self.auth_required("token expired and its refresh was already rejected"));
        }
        match self.refresh().await {
            Ok(tokens) => Ok(tokens),
            Err(e @ (AuthError::AuthRequired { .. } | AuthError::Storage(_))) => Err(e),
            Err(e) => Err(self.auth_required(format!("token expired and refresh failed ({})", e.code()))),
        }
    }

    /// `Authorization` header value for the current token.
    pub async fn authorization_header(&self) -> Result<String, AuthError> {
        let token = self.valid_token().await?;
        Ok(format!("{} {}", token.token_type, token.access_token))
    }

    fn clear_failed_refresh(&self) {
        if let Ok(mut failed) = self.failed_refresh.lock() {
            *failed = None;
        }
    }
}

/// Compare CSRF states without short-circuiting on the first differing byte.
fn states_match(received: &str, expected: &str) -> bool {
    let (a, b) = (received.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn fingerprint(refresh_token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(refresh_token.as_bytes()))
}
