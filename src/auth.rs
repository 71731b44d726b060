//! OAuth2 authorization-code authentication for the Brivo platform.
//!
//! Brivo issues an access/refresh token pair through the
//! `authorization_code` grant, then keeps it alive through the
//! `refresh_token` grant. Both grants POST a form to `/oauth/token` with
//! HTTP Basic credentials (`client_id:client_secret`) and the `api-key`
//! header.
//!
//! `TokenStore` holds the current [`TokenState`] and refreshes it on
//! demand. The store never persists anything: callers read the state with
//! [`TokenStore::current`] after each unit of work and hand it back at
//! construction time.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{BrivoError, Result, classify_error_body};

/// Header carrying the Brivo application API key on every request.
pub const API_KEY_HEADER: &str = "api-key";

/// Seconds subtracted from `expires_in` so a token is refreshed slightly
/// before the server would reject it.
pub const EXPIRY_BUFFER_SECS: i64 = 5;

const TOKEN_PATH: &str = "oauth/token";
const AUTHORIZE_PATH: &str = "oauth/authorize";

/// The four values identifying this application to Brivo.
///
/// Immutable for the lifetime of a client. `Debug` redacts the secrets.
#[derive(Clone)]
pub struct Credentials {
    /// Brivo developer API key, sent as the `api-key` header.
    pub api_key: String,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Redirect URI registered for the authorization-code flow.
    pub redirect_uri: String,
}

impl Credentials {
    pub fn new(api_key: &str, client_id: &str, client_secret: &str, redirect_uri: &str) -> Self {
        Credentials {
            api_key: api_key.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Access/refresh token pair plus the instant after which it must be refreshed.
///
/// This is a plain value: it serializes to JSON (with an RFC 3339
/// `expires_after`) so the caller can persist it between processes.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenState {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_after: DateTime<Utc>,
}

impl TokenState {
    /// Builds the state for a token response received at `now`.
    ///
    /// `expires_after = now + expires_in - EXPIRY_BUFFER_SECS`.
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        TokenState {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_after: now + Duration::seconds(response.expires_in - EXPIRY_BUFFER_SECS),
        }
    }

    /// `true` once `now` is past `expires_after`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_after < now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_after", &self.expires_after)
            .finish()
    }
}

/// Body of a successful `/oauth/token` response. Extra fields such as
/// `token_type` and `scope` are ignored.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Form body for the `authorization_code` grant.
#[derive(Serialize)]
struct AuthorizationCodeGrant<'a> {
    grant_type: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

/// Form body for the `refresh_token` grant.
#[derive(Serialize)]
struct RefreshTokenGrant<'a> {
    grant_type: &'a str,
    refresh_token: &'a str,
}

/// URL an operator opens in a browser to start the authorization-code flow.
pub fn oauth_link(auth_url: &str, client_id: &str) -> String {
    format!("{auth_url}{AUTHORIZE_PATH}?response_type=code&client_id={client_id}")
}

/// Holds and refreshes the OAuth token pair for one set of credentials.
///
/// Invariants:
/// - `state` is `None` until a code exchange succeeds or the caller
///   restores a persisted state.
/// - A failed exchange or refresh leaves `state` exactly as it was.
pub struct TokenStore {
    credentials: Credentials,
    token_url: String,
    state: Option<TokenState>,
}

impl TokenStore {
    /// `auth_url` is the OAuth server root with a trailing slash
    /// (e.g. `https://auth.brivo.com/`).
    pub fn new(credentials: Credentials, auth_url: &str, state: Option<TokenState>) -> Self {
        TokenStore {
            credentials,
            token_url: format!("{auth_url}{TOKEN_PATH}"),
            state,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The current token state, if any.
    pub fn current(&self) -> Option<&TokenState> {
        self.state.as_ref()
    }

    /// Replaces the stored state, e.g. with one restored from disk.
    pub fn replace(&mut self, state: Option<TokenState>) {
        self.state = state;
    }

    /// Exchanges an authorization code for a new token pair.
    pub async fn exchange_code(&mut self, http: &Client, code: &str) -> Result<TokenState> {
        debug!("exchanging authorization code for token");
        let grant = AuthorizationCodeGrant {
            grant_type: "authorization_code",
            code,
            redirect_uri: &self.credentials.redirect_uri,
            client_id: &self.credentials.client_id,
            client_secret: &self.credentials.client_secret,
        };
        let response = self.request_token(http, &grant).await?;
        Ok(self.store(response))
    }

    /// Trades the stored refresh token for a new token pair.
    pub async fn refresh(&mut self, http: &Client) -> Result<TokenState> {
        debug!("refreshing token");
        let refresh_token = match &self.state {
            Some(state) => state.refresh_token.clone(),
            None => {
                return Err(BrivoError::Usage(
                    "no refresh token available; complete the OAuth code exchange first"
                        .to_string(),
                ));
            }
        };
        let grant = RefreshTokenGrant {
            grant_type: "refresh_token",
            refresh_token: &refresh_token,
        };
        let response = self.request_token(http, &grant).await?;
        Ok(self.store(response))
    }

    /// Returns a usable access token, refreshing first if the stored one
    /// has expired.
    pub async fn ensure_fresh(&mut self, http: &Client) -> Result<String> {
        match &self.state {
            None => Err(BrivoError::Usage(
                "not authorized; complete the OAuth code exchange first".to_string(),
            )),
            Some(state) if state.is_expired() => {
                let state = self.refresh(http).await?;
                Ok(state.access_token)
            }
            Some(state) => Ok(state.access_token.clone()),
        }
    }

    fn store(&mut self, response: TokenResponse) -> TokenState {
        let state = TokenState::from_response(response, Utc::now());
        self.state = Some(state.clone());
        state
    }

    /// Posts a grant to the token endpoint.
    ///
    /// The body is read as text before checking the status so the OAuth
    /// server's `error`/`error_description` pair survives into the error.
    async fn request_token<F: Serialize>(&self, http: &Client, grant: &F) -> Result<TokenResponse> {
        let response = http
            .post(&self.token_url)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .header(API_KEY_HEADER, &self.credentials.api_key)
            .form(grant)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let err = classify_error_body(status.as_u16(), &body);
            warn!(error = %err, "token request rejected");
            return Err(err);
        }

        Ok(serde_json::from_str(&body)?)
    }
}
