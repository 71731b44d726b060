//! Authenticated HTTP executor for the Brivo REST API.
//!
//! `ApiClient` owns the pooled `reqwest::Client` (the transport) and the
//! [`TokenStore`] behind a `Mutex`, and exposes a single [`ApiClient::call`]
//! entry point plus thin verb helpers.
//!
//! Response handling is uniform for every call:
//! - status >= 400 is classified into one `BrivoError::Api` shape;
//! - 204 yields an empty JSON object rather than `null`;
//! - any other body must be JSON, and a top-level `data` wrapper is
//!   stripped (see [`Envelope`]).
//!
//! Nothing here retries. The transport is created lazily and dropped by
//! [`ApiClient::close`], which callers invoke at the end of each unit of
//! work; the next call builds a fresh one.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use reqwest::{Client, Method, StatusCode, header};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::auth::{API_KEY_HEADER, Credentials, TokenState, TokenStore};
use crate::error::{BrivoError, Result, classify_error_body};

/// Brivo OAuth server root.
pub const DEFAULT_AUTH_URL: &str = "https://auth.brivo.com/";

/// Brivo REST API root.
pub const DEFAULT_API_URL: &str = "https://api.brivo.com/";

/// Per-call timeout covering the full round-trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP + TLS handshake timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Root URLs the client talks to. Both must end with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub auth_url: String,
    pub api_url: String,
}

impl Endpoints {
    /// Points both the OAuth and REST roots at one base URL, used by tests
    /// to route everything through a single mock server.
    pub fn with_base_url(base_url: &str) -> Self {
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        Endpoints {
            auth_url: base.clone(),
            api_url: base,
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

/// A decoded success body. Brivo sometimes wraps results as
/// `{"data": ...}` and sometimes returns them bare.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Wrapped(Value),
    Bare(Value),
}

impl Envelope {
    pub fn from_body(body: Value) -> Self {
        match body {
            Value::Object(mut map) => match map.remove("data") {
                Some(data) => Envelope::Wrapped(data),
                None => Envelope::Bare(Value::Object(map)),
            },
            other => Envelope::Bare(other),
        }
    }

    /// The payload with any `data` wrapper removed.
    pub fn into_inner(self) -> Value {
        match self {
            Envelope::Wrapped(value) | Envelope::Bare(value) => value,
        }
    }
}

/// Request payload for [`ApiClient::call`].
///
/// `body` is serialized as JSON; `data` is sent verbatim. They are
/// mutually exclusive and supplying both is a usage error.
#[derive(Debug, Default, Clone, Copy)]
pub struct Payload<'a> {
    pub body: Option<&'a Value>,
    pub data: Option<&'a str>,
}

impl<'a> Payload<'a> {
    pub fn none() -> Self {
        Payload::default()
    }

    pub fn json(body: &'a Value) -> Self {
        Payload {
            body: Some(body),
            data: None,
        }
    }

    pub fn raw(data: &'a str) -> Self {
        Payload {
            body: None,
            data: Some(data),
        }
    }

    fn into_bytes(self) -> Result<Option<String>> {
        match (self.body, self.data) {
            (Some(_), Some(_)) => Err(BrivoError::Usage(
                "body and data cannot be used together".to_string(),
            )),
            (Some(body), None) => Ok(Some(body.to_string())),
            (None, Some(data)) => Ok(Some(data.to_string())),
            (None, None) => Ok(None),
        }
    }
}

fn build_transport() -> Result<Client> {
    Ok(Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()?)
}

/// Authenticated HTTP client for the Brivo REST API.
///
/// - `transport` uses a std `Mutex` because it is only held to clone or
///   swap the handle, never across an await.
/// - `auth` uses a tokio `Mutex` and is held across a refresh, so
///   concurrent callers that all find an expired token trigger one refresh.
pub struct ApiClient {
    endpoints: Endpoints,
    transport: Mutex<Option<Client>>,
    auth: tokio::sync::Mutex<TokenStore>,
}

impl ApiClient {
    pub fn new(credentials: Credentials, token: Option<TokenState>) -> Self {
        Self::with_endpoints(credentials, token, Endpoints::default())
    }

    pub fn with_endpoints(
        credentials: Credentials,
        token: Option<TokenState>,
        endpoints: Endpoints,
    ) -> Self {
        let store = TokenStore::new(credentials, &endpoints.auth_url, token);
        ApiClient {
            endpoints,
            transport: Mutex::new(None),
            auth: tokio::sync::Mutex::new(store),
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Returns the shared transport, building one if none is open.
    pub fn transport(&self) -> Result<Client> {
        let mut slot = self.transport.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        debug!("creating new HTTP transport");
        let client = build_transport()?;
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Releases the transport. Requests already in flight keep their own
    /// handle and finish normally.
    pub fn close(&self) {
        let released = self
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            debug!("released HTTP transport");
        }
    }

    pub fn is_open(&self) -> bool {
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub async fn token_state(&self) -> Option<TokenState> {
        self.auth.lock().await.current().cloned()
    }

    pub async fn set_token_state(&self, state: Option<TokenState>) {
        self.auth.lock().await.replace(state);
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenState> {
        let http = self.transport()?;
        self.auth.lock().await.exchange_code(&http, code).await
    }

    pub async fn refresh_token(&self) -> Result<TokenState> {
        let http = self.transport()?;
        self.auth.lock().await.refresh(&http).await
    }

    async fn api_key(&self) -> String {
        self.auth.lock().await.credentials().api_key.clone()
    }

    /// Resolves `path` against the API root. Absolute URLs pass through.
    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.endpoints.api_url, path.trim_start_matches('/'))
        }
    }

    /// Core request method. Every verb helper delegates here.
    ///
    /// Order of operations: payload validation, token freshness, request,
    /// error classification, 204 handling, JSON decoding, `data` unwrapping.
    pub async fn call(&self, method: Method, path: &str, payload: Payload<'_>) -> Result<Value> {
        self.execute(method, path, &[], payload).await
    }

    /// Same as [`ApiClient::call`], with `query` pairs percent-encoded onto
    /// the URL. Filter values that come from user input go through here so
    /// `#`, `&` or `;` stay part of the value.
    pub async fn call_with_query(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        payload: Payload<'_>,
    ) -> Result<Value> {
        self.execute(method, path, query, payload).await
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        payload: Payload<'_>,
    ) -> Result<Value> {
        let content = payload.into_bytes()?;

        let http = self.transport()?;
        let token = self.auth.lock().await.ensure_fresh(&http).await?;
        let api_key = self.api_key().await;

        let url = self.url_for(path);
        debug!(%method, %url, ?query, payload = content.as_deref().unwrap_or(""), "calling Brivo API");

        let mut request = http
            .request(method.clone(), &url)
            .query(query)
            .bearer_auth(token)
            .header(API_KEY_HEADER, api_key)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(content) = content {
            request = request.body(content);
        }

        let started = Instant::now();
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(
            %method,
            %url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "timing"
        );

        if status.as_u16() >= 400 {
            let err = classify_error_body(status.as_u16(), &text);
            error!(%method, %url, error = %err, "Brivo API call failed");
            return Err(err);
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Object(Map::new()));
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|_| {
            error!(status = status.as_u16(), body = %text, "response is not JSON");
            BrivoError::Api {
                status: status.as_u16(),
                message: "Invalid JSON response".to_string(),
            }
        })?;
        debug!(status = status.as_u16(), response = %parsed, "response");

        Ok(Envelope::from_body(parsed).into_inner())
    }

    /// Sends a GET and decodes the unwrapped payload as `T`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = self.call(Method::GET, path, Payload::none()).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Sends a GET with encoded query pairs and decodes the unwrapped
    /// payload as `T`.
    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let value = self
            .call_with_query(Method::GET, path, query, Payload::none())
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Sends a POST with a JSON body and decodes the unwrapped payload as `T`.
    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let value = self.call(Method::POST, path, Payload::json(body)).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Sends a PUT, with or without a JSON body. The response is returned
    /// undecoded because Brivo's PUT responses are not used by callers.
    pub async fn put(&self, path: &str, body: Option<&Value>) -> Result<Value> {
        let payload = match body {
            Some(body) => Payload::json(body),
            None => Payload::none(),
        };
        self.call(Method::PUT, path, payload).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.call(Method::DELETE, path, Payload::none()).await
    }
}
