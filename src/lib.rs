//! Async Rust client for bulk provisioning of Brivo access-control accounts.
//!
//! Provides OAuth2 token management, an authenticated HTTP executor with
//! normalized error handling, rate-limit-friendly batching, memoized
//! discovery of reference data, and a create-or-update orchestration that
//! turns one "member" into the several Brivo calls it requires.
//!
//! # Modules
//!
//! - [`api`]: `BrivoApi` facade and the `Session` scope guard.
//! - [`auth`]: OAuth2 authorization-code / refresh-token handling.
//! - [`batch`]: fixed-size concurrent batches with an inter-batch pause.
//! - [`client`]: authenticated request executor.
//! - [`credentials`]: access-card lookup and assignment endpoints.
//! - [`custom_fields`]: member-id custom field discovery and writes.
//! - [`directory`]: create-or-update, suspend and cleanup orchestration.
//! - [`discovery`]: per-client cache for reference-data lookups.
//! - [`error`]: `BrivoError` and the error-body classifier.
//! - [`groups`]: group lookup and membership endpoints.
//! - [`users`]: user endpoints and the `RemoteId` type.
//!
//! # Quick Start
//!
//! ```ignore
//! use brivo_bulk::api::BrivoApi;
//! use brivo_bulk::auth::Credentials;
//! use brivo_bulk::directory::CreateUserRequest;
//!
//! let credentials = Credentials::new(api_key, client_id, client_secret, redirect_uri);
//! let api = BrivoApi::new(credentials, saved_token_state);
//! let session = api.session();
//! let request = CreateUserRequest::new("Ada", "Lovelace", "M-1001")
//!     .with_groups(["Staff"])
//!     .with_card("123", "45678");
//! let user_id = session.create_user(&request).await?;
//! ```

pub mod api;
pub mod auth;
pub mod batch;
pub mod client;
pub mod credentials;
pub mod custom_fields;
pub mod directory;
pub mod discovery;
pub mod error;
pub mod groups;
pub mod users;
