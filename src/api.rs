//! Public facade over the Brivo client.
//!
//! `BrivoApi` owns one set of credentials, one token state, the shared
//! transport and the discovery cache, and exposes the operations a bulk
//! provisioning run needs. Every method fails observably: nothing is
//! swallowed or converted into a default.
//!
//! A unit of work (one uploaded file, one CLI invocation) should run inside
//! a [`Session`], which releases the transport when dropped:
//!
//! ```ignore
//! let api = BrivoApi::new(credentials, Some(saved_token));
//! {
//!     let session = api.session();
//!     session.create_user(&request).await?;
//! }
//! save(api.token_state().await);
//! ```

use std::ops::Deref;

use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{self, Credentials, TokenState};
use crate::batch::BatchConfig;
use crate::client::{ApiClient, Endpoints};
use crate::directory::{CreateUserRequest, Directory, SuspendRequest};
use crate::discovery::DiscoveryCache;
use crate::error::{BrivoError, Result};
use crate::users::{self, RemoteId, RemoteUser};

pub struct BrivoApi {
    client_id: String,
    client: ApiClient,
    cache: DiscoveryCache,
    batch: BatchConfig,
}

impl BrivoApi {
    /// Creates a client against the production Brivo endpoints.
    ///
    /// `token` is the state persisted by the caller after a previous run,
    /// or `None` before the first OAuth code exchange.
    pub fn new(credentials: Credentials, token: Option<TokenState>) -> Self {
        Self::with_endpoints(credentials, token, Endpoints::default())
    }

    /// Creates a client against custom endpoints (used by tests).
    pub fn with_endpoints(
        credentials: Credentials,
        token: Option<TokenState>,
        endpoints: Endpoints,
    ) -> Self {
        BrivoApi {
            client_id: credentials.client_id.clone(),
            client: ApiClient::with_endpoints(credentials, token, endpoints),
            cache: DiscoveryCache::new(),
            batch: BatchConfig::default(),
        }
    }

    /// Overrides the batch size and inter-batch pause.
    pub fn with_batch_config(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn cache(&self) -> &DiscoveryCache {
        &self.cache
    }

    fn directory(&self) -> Directory<'_> {
        Directory::new(&self.client, &self.cache, &self.batch)
    }

    // ── Session and token state ─────────────────────────────────────────

    /// Starts a unit of work. The transport is released when the returned
    /// guard is dropped.
    pub fn session(&self) -> Session<'_> {
        Session { api: self }
    }

    /// Releases the transport; the next call opens a new one.
    pub fn close(&self) {
        self.client.close();
    }

    pub async fn token_state(&self) -> Option<TokenState> {
        self.client.token_state().await
    }

    pub async fn set_token_state(&self, state: Option<TokenState>) {
        self.client.set_token_state(state).await;
    }

    // ── OAuth ───────────────────────────────────────────────────────────

    /// URL to open in a browser to start the authorization-code flow.
    pub fn start_oauth_link(&self) -> String {
        auth::oauth_link(&self.client.endpoints().auth_url, &self.client_id)
    }

    pub async fn exchange_code_for_token(&self, code: &str) -> Result<TokenState> {
        self.client.exchange_code(code).await
    }

    pub async fn refresh_token(&self) -> Result<TokenState> {
        self.client.refresh_token().await
    }

    /// Authenticated probe of `/v1/api/administrators`, refreshing the
    /// token first if needed. Returns the unwrapped response body.
    pub async fn healthcheck(&self) -> Result<Value> {
        self.client.get("v1/api/administrators").await
    }

    // ── Users ───────────────────────────────────────────────────────────

    pub async fn find_user_by_member_id(&self, member_id: &str) -> Result<RemoteUser> {
        self.directory().find_user_by_member_id(member_id).await
    }

    /// Create-or-update keyed by member id. See [`Directory::create_user`].
    pub async fn create_user(&self, request: &CreateUserRequest) -> Result<RemoteId> {
        self.directory().create_user(request).await
    }

    pub async fn toggle_member_suspend(&self, request: &SuspendRequest) -> Result<Value> {
        self.directory().toggle_member_suspend(request).await
    }

    /// Deletes a user. `confirm` must be `true`; anything else is refused
    /// before any request is sent.
    pub async fn delete_user(&self, user_id: &RemoteId, confirm: bool) -> Result<Value> {
        if !confirm {
            return Err(BrivoError::Usage(
                "deleting a user requires explicit confirmation".to_string(),
            ));
        }
        warn!(%user_id, "deleting user");
        users::delete_remote_user(&self.client, user_id).await
    }

    /// Replacing an existing member's identity or card in place.
    ///
    /// Always fails: how the suspended flag and card effective dates should
    /// carry over is undecided, and reassigning a card to a new person is
    /// better expressed as delete + create for the audit log.
    pub async fn update_user(
        &self,
        old_member_id: &str,
        _replacement: &CreateUserRequest,
    ) -> Result<RemoteId> {
        debug!(old_member_id, "refusing in-place user update");
        Err(BrivoError::NotSupported(
            "updating an existing user in place is not implemented; delete and re-create the member instead"
                .to_string(),
        ))
    }

    // ── Credentials and groups ──────────────────────────────────────────

    pub async fn list_all_user_credentials(&self, user_id: &RemoteId) -> Result<Vec<RemoteId>> {
        self.directory().list_all_user_credentials(user_id).await
    }

    pub async fn remove_all_credentials_from_user(&self, user_id: &RemoteId) -> Result<usize> {
        self.directory().remove_all_credentials_from_user(user_id).await
    }

    pub async fn remove_all_groups_from_user(&self, user_id: &RemoteId) -> Result<usize> {
        self.directory().remove_all_groups_from_user(user_id).await
    }
}

/// Scope guard for one unit of work. Dereferences to [`BrivoApi`] and
/// releases the transport on drop.
pub struct Session<'a> {
    api: &'a BrivoApi,
}

impl Deref for Session<'_> {
    type Target = BrivoApi;

    fn deref(&self) -> &BrivoApi {
        self.api
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.api.close();
    }
}
