use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};

use crate::api::retry::RetryHandler;
use crate::config::{ApiConfig, Credentials, TokenState, TokenStore};
use crate::date_util::now_millis;
use crate::error::{Error, Result};

/// Obtains an authorization code from the seller on first run.
pub trait AuthorizationPrompt: Send + Sync {
    /// Show `authorization_url` to the user and return the pasted code.
    fn request_code(&self, authorization_url: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

/// Owns the live token pair and refreshes it single-flight.
///
/// Readers take the `RwLock` only; the refresh mutex is held while a new
/// token is requested, so concurrent callers that find the token expired
/// wait for one refresh instead of issuing their own.
#[derive(Debug)]
pub struct TokenManager {
    credentials: Credentials,
    token_url: String,
    retry: RetryHandler,
    store: TokenStore,
    state: RwLock<TokenState>,
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(
        credentials: Credentials,
        state: TokenState,
        store: TokenStore,
        retry: RetryHandler,
        api: &ApiConfig,
    ) -> Self {
        Self {
            credentials,
            token_url: api.token_url(),
            retry,
            store,
            state: RwLock::new(state),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Load the stored token, or run the authorization-code flow when none
    /// has been saved yet.
    pub async fn load_or_authorize(
        credentials: Credentials,
        store: TokenStore,
        retry: RetryHandler,
        api: &ApiConfig,
        prompt: &dyn AuthorizationPrompt,
    ) -> Result<Self> {
        if let Some(state) = store.load()? {
            log::debug!("Loaded tokens from {}", store.path().display());
            return Ok(Self::new(credentials, state, store, retry, api));
        }
        Self::authorize(credentials, store, retry, api, prompt).await
    }

    /// Run the authorization-code flow unconditionally, replacing any stored token.
    pub async fn authorize(
        credentials: Credentials,
        store: TokenStore,
        retry: RetryHandler,
        api: &ApiConfig,
        prompt: &dyn AuthorizationPrompt,
    ) -> Result<Self> {
        let url = authorization_url(&credentials, api)?;
        let code = prompt.request_code(&url)?;
        let code = code.trim();
        if code.is_empty() {
            return Err(Error::Auth("no authorization code provided".into()));
        }

        let params = vec![
            ("grant_type", "authorization_code".to_string()),
            ("client_id", credentials.client_id.clone()),
            ("client_secret", credentials.client_secret.clone()),
            ("code", code.to_string()),
            ("redirect_uri", credentials.redirect_uri.clone()),
        ];
        let state = request_tokens(&retry, &api.token_url(), &params, None).await?;
        store.save(&state)?;
        log::info!("Authorization complete, tokens saved to {}", store.path().display());
        Ok(Self::new(credentials, state, store, retry, api))
    }

    /// Snapshot of the current token state.
    pub async fn current(&self) -> TokenState {
        self.state.read().await.clone()
    }

    /// Return a non-expired access token, refreshing first if needed.
    pub async fn ensure_valid(&self) -> Result<String> {
        {
            let state = self.state.read().await;
            if !state.is_expired() {
                return Ok(state.access_token.clone());
            }
        }

        let _guard = self.refresh_lock.lock().await;
        {
            // Another task may have refreshed while we waited
            let state = self.state.read().await;
            if !state.is_expired() {
                return Ok(state.access_token.clone());
            }
        }
        log::info!("Access token expired, refreshing");
        self.refresh_locked().await
    }

    /// Refresh after the server rejected `rejected`, unless a newer token
    /// has already replaced it.
    pub async fn refresh_rejected(&self, rejected: &str) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;
        {
            let state = self.state.read().await;
            if state.access_token != rejected {
                return Ok(state.access_token.clone());
            }
        }
        self.refresh_locked().await
    }

    /// Caller must hold `refresh_lock`.
    async fn refresh_locked(&self) -> Result<String> {
        let current_refresh = self.state.read().await.refresh_token.clone();
        let params = vec![
            ("grant_type", "refresh_token".to_string()),
            ("client_id", self.credentials.client_id.clone()),
            ("client_secret", self.credentials.client_secret.clone()),
            ("refresh_token", current_refresh.clone()),
        ];
        // Boxed: request_tokens goes back through RetryHandler, which awaits
        // ensure_valid on authorized sends.
        let new_state = Box::pin(request_tokens(
            &self.retry,
            &self.token_url,
            &params,
            Some(&current_refresh),
        ))
        .await?;

        let token = new_state.access_token.clone();
        *self.state.write().await = new_state.clone();

        if let Err(e) = self.store.save(&new_state) {
            log::warn!(
                "Token refreshed but could not be saved to {}: {e}",
                self.store.path().display()
            );
        }
        log::info!("Access token refreshed");
        Ok(token)
    }
}

/// URL of the page where the seller grants access to the application.
pub fn authorization_url(credentials: &Credentials, api: &ApiConfig) -> Result<String> {
    let base = format!("{}/authorization", api.auth_base.trim_end_matches('/'));
    let url = url::Url::parse_with_params(
        &base,
        &[
            ("response_type", "code"),
            ("client_id", credentials.client_id.as_str()),
            ("redirect_uri", credentials.redirect_uri.as_str()),
        ],
    )
    .map_err(|e| Error::Config(format!("invalid auth base {}: {e}", api.auth_base)))?;
    Ok(url.to_string())
}

/// POST the token endpoint and stamp the result with the issue time.
/// `fallback_refresh` is kept when the response omits a new refresh token.
async fn request_tokens(
    retry: &RetryHandler,
    token_url: &str,
    params: &[(&str, String)],
    fallback_refresh: Option<&str>,
) -> Result<TokenState> {
    let response = retry
        .send(|http| {
            http.post(token_url)
                .header(reqwest::header::ACCEPT, "application/json")
                .form(params)
        })
        .await
        .map_err(|e| Error::Auth(format!("token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Auth(format!("token endpoint returned {status}: {body}")));
    }

    let parsed: TokenResponse = response
        .json()
        .await
        .map_err(|e| Error::Auth(format!("malformed token response: {e}")))?;

    let refresh_token = match (parsed.refresh_token, fallback_refresh) {
        (Some(r), _) => r,
        (None, Some(old)) => old.to_string(),
        (None, None) => {
            return Err(Error::Auth("token response has no refresh_token".into()));
        }
    };

    Ok(TokenState {
        access_token: parsed.access_token,
        refresh_token,
        issued_at: now_millis(),
        expires_in: parsed.expires_in,
    })
}
