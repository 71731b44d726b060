//! Typed error hierarchy for the brivo-bulk crate.
//!
//! `BrivoError` is the single failure type returned by every library
//! operation. Variants map to the boundaries a caller cares about:
//! - `Usage`: the caller broke a precondition (never retried).
//! - `Api`: the Brivo API answered with an error-shaped response or a
//!   body that was not JSON. The message is normalized by
//!   [`classify_error_body`] so callers only ever see one shape.
//! - `UserNotFound` / `DuplicateMember`: a member-id lookup matched zero
//!   or several remote users. These are distinct on purpose: zero selects
//!   the create branch of the upsert, several means a human must step in.
//! - `Conflict`: the remote record disagrees with the caller's view of a
//!   person's name, so the operation refuses to touch it.
//! - `NotFound` / `Ambiguous`: reference data (groups, credentials, the
//!   member-id custom field) could not be resolved to exactly one record.
//! - `NotSupported`: an operation that is deliberately not implemented.
//! - `Network` / `Parse`: transport failures and typed decoding failures.

use serde_json::Value;

/// Unified error type for all brivo-bulk library operations.
#[derive(Debug, thiserror::Error)]
pub enum BrivoError {
    /// The caller violated a precondition: conflicting payload arguments,
    /// a missing confirmation flag, a card number without a facility code,
    /// or an authenticated call made before any token was obtained.
    #[error("usage error: {0}")]
    Usage(String),

    /// The Brivo API returned a status >= 400, or a success status with a
    /// body that could not be parsed as JSON.
    #[error("Error from Brivo API [{status}]: {message}")]
    Api {
        /// HTTP status code of the failed response.
        status: u16,
        /// Normalized error text (see [`classify_error_body`]).
        message: String,
    },

    /// No remote user carries the given member id.
    #[error("No user with member ID {member_id} found")]
    UserNotFound {
        /// The member id that was looked up.
        member_id: String,
    },

    /// More than one remote user carries the given member id.
    #[error(
        "Multiple users ({count}) with member ID {member_id} found in Brivo. Proceed manually with caution"
    )]
    DuplicateMember {
        /// The member id that was looked up.
        member_id: String,
        /// How many remote users matched.
        count: usize,
    },

    /// The remote record does not match the caller-supplied identity.
    #[error("{0}")]
    Conflict(String),

    /// A reference lookup (group, credential, custom field) found nothing.
    #[error("{0}")]
    NotFound(String),

    /// A reference lookup expected exactly one record and found several.
    #[error("{0}")]
    Ambiguous(String),

    /// The requested operation is intentionally unimplemented.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A typed response could not be decoded from the JSON the API returned.
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Transport-level failure (DNS, TCP, TLS, timeout). No status available.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl BrivoError {
    /// Returns `true` for the "no such member id" condition.
    pub fn is_user_not_found(&self) -> bool {
        matches!(self, BrivoError::UserNotFound { .. })
    }

    /// HTTP status carried by an `Api` error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            BrivoError::Api { status, .. } => Some(*status),
            BrivoError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, BrivoError>;

/// Turns the body of an error-shaped response into a single `Api` error.
///
/// Brivo reports errors inconsistently. The lookup order is:
/// 1. a `message` field, suffixed with ` - <error_description>` if present;
/// 2. an `error` field, suffixed the same way;
/// 3. otherwise the raw body text.
pub fn classify_error_body(status: u16, body: &str) -> BrivoError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|parsed| describe(&parsed))
        .unwrap_or_else(|| body.to_string());

    BrivoError::Api { status, message }
}

fn describe(parsed: &Value) -> Option<String> {
    let object = parsed.as_object()?;
    let headline = ["message", "error"]
        .iter()
        .find_map(|key| object.get(*key))
        .map(text_of)?;

    Some(match object.get("error_description") {
        Some(description) => format!("{headline} - {}", text_of(description)),
        None => headline,
    })
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
