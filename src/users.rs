//! User endpoints of the Brivo API.
//!
//! | Function | API Path |
//! |----------|----------|
//! | [`find_users_by_custom_field`] | GET `/v1/api/users?filter=cf_{fieldId}__eq:{value}` |
//! | [`create_remote_user`] | POST `/v1/api/users` |
//! | [`set_suspended`] | PUT `/v1/api/users/{id}/suspended` |
//! | [`delete_remote_user`] | DELETE `/v1/api/users/{id}` |
//!
//! Brivo has no first-class "member id": it lives in a custom field, so
//! users are looked up by filtering on that field (see
//! [`crate::custom_fields`]).

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::client::ApiClient;
use crate::error::{BrivoError, Result};

/// Identifier of a Brivo record.
///
/// Brivo emits ids as JSON numbers, but some endpoints (and older
/// accounts) return strings. The original representation is kept so an id
/// is echoed back to the API exactly as it was received.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteId::Number(n) => write!(f, "{n}"),
            RemoteId::Text(s) => f.write_str(s),
        }
    }
}

/// Numeric text parses as `Number`, anything else as `Text`.
impl FromStr for RemoteId {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.parse::<i64>() {
            Ok(n) => RemoteId::Number(n),
            Err(_) => RemoteId::Text(s.to_string()),
        })
    }
}

impl From<i64> for RemoteId {
    fn from(value: i64) -> Self {
        RemoteId::Number(value)
    }
}

impl From<&str> for RemoteId {
    fn from(value: &str) -> Self {
        RemoteId::Text(value.to_string())
    }
}

/// A user record as returned by the Brivo API.
///
/// Only the fields this crate reads are modeled. Name fields default to
/// empty because the create endpoint may answer with just the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteUser {
    pub id: RemoteId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl RemoteUser {
    /// Exact, case-sensitive comparison of both name parts.
    pub fn has_name(&self, first_name: &str, last_name: &str) -> bool {
        self.first_name == first_name && self.last_name == last_name
    }
}

/// Lists users whose custom field `field_id` equals `value`.
pub async fn find_users_by_custom_field(
    client: &ApiClient,
    field_id: &RemoteId,
    value: &str,
) -> Result<Vec<RemoteUser>> {
    let filter = format!("cf_{field_id}__eq:{value}");
    client
        .get_with_query("v1/api/users", &[("filter", filter.as_str())])
        .await
}

/// Narrows a member-id lookup to exactly one user.
///
/// Zero matches and several matches are different errors: the first
/// selects the create branch of an upsert, the second needs a human.
pub fn select_single_user(mut users: Vec<RemoteUser>, member_id: &str) -> Result<RemoteUser> {
    match users.len() {
        0 => Err(BrivoError::UserNotFound {
            member_id: member_id.to_string(),
        }),
        1 => Ok(users.remove(0)),
        count => Err(BrivoError::DuplicateMember {
            member_id: member_id.to_string(),
            count,
        }),
    }
}

/// Creates a bare user record. Member id, groups and credentials are set
/// by separate calls.
pub async fn create_remote_user(
    client: &ApiClient,
    first_name: &str,
    last_name: &str,
) -> Result<RemoteUser> {
    let body = json!({ "firstName": first_name, "lastName": last_name });
    client.post("v1/api/users", &body).await
}

pub async fn set_suspended(client: &ApiClient, user_id: &RemoteId, suspended: bool) -> Result<Value> {
    let body = json!({ "suspended": suspended });
    client
        .put(&format!("v1/api/users/{user_id}/suspended"), Some(&body))
        .await
}

pub async fn delete_remote_user(client: &ApiClient, user_id: &RemoteId) -> Result<Value> {
    client.delete(&format!("v1/api/users/{user_id}")).await
}
