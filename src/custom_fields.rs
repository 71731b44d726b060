//! Custom-field endpoints and member-id field discovery.
//!
//! Member ids are stored in an account-defined custom field. Accounts name
//! it differently, so discovery accepts any of [`MEMBER_ID_FIELD_NAMES`]
//! (compared case-insensitively) and returns the field's id, which is then
//! needed both to look users up and to write their member id.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::client::ApiClient;
use crate::error::{BrivoError, Result};
use crate::users::RemoteId;

/// Accepted names for the member-id custom field, lowercase.
pub const MEMBER_ID_FIELD_NAMES: [&str; 6] = [
    "member id",
    "memberid",
    "member_id",
    "member_number",
    "member number",
    "membernumber",
];

/// A custom field definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomField {
    pub id: RemoteId,
    pub field_name: String,
}

pub fn is_member_id_field(field_name: &str) -> bool {
    let lowered = field_name.to_lowercase();
    MEMBER_ID_FIELD_NAMES.contains(&lowered.as_str())
}

/// Picks the member-id field out of a field list. The first match wins.
pub fn select_member_id_field(fields: &[CustomField]) -> Result<RemoteId> {
    fields
        .iter()
        .find(|field| is_member_id_field(&field.field_name))
        .map(|field| field.id.clone())
        .ok_or_else(|| {
            BrivoError::NotFound(format!(
                "Member ID custom field not found. Check if custom field named {} exists",
                MEMBER_ID_FIELD_NAMES.join(",")
            ))
        })
}

// TODO: follow pagination once accounts exceed 100 custom fields.
pub async fn list_custom_fields(client: &ApiClient) -> Result<Vec<CustomField>> {
    client.get("v1/api/custom-fields?pageSize=100").await
}

/// Fetches the field list and returns the member-id field's id.
pub async fn find_member_id_field(client: &ApiClient) -> Result<RemoteId> {
    let fields = list_custom_fields(client).await?;
    select_member_id_field(&fields)
}

/// Writes `value` into custom field `field_id` of user `user_id`.
pub async fn set_custom_field_value(
    client: &ApiClient,
    user_id: &RemoteId,
    field_id: &RemoteId,
    value: &str,
) -> Result<Value> {
    let body = json!({ "value": value });
    client
        .put(
            &format!("v1/api/users/{user_id}/custom-fields/{field_id}"),
            Some(&body),
        )
        .await
}
