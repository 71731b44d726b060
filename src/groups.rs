//! Group endpoints of the Brivo API.
//!
//! Groups carry access rights; users are added to and removed from them
//! by id through a single POST on the user's group collection.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::client::ApiClient;
use crate::error::{BrivoError, Result};
use crate::users::RemoteId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: RemoteId,
    pub name: String,
}

// TODO: filter server-side by name instead of listing the first 100 groups.
pub async fn list_groups(client: &ApiClient) -> Result<Vec<Group>> {
    client.get("v1/api/groups?pageSize=100").await
}

/// Case-insensitive name match over a group listing.
pub fn select_group_id(groups: &[Group], name: &str) -> Result<RemoteId> {
    let wanted = name.to_lowercase();
    groups
        .iter()
        .find(|group| group.name.to_lowercase() == wanted)
        .map(|group| group.id.clone())
        .ok_or_else(|| BrivoError::NotFound(format!("Group {name} not found")))
}

pub async fn find_group_id_by_name(client: &ApiClient, name: &str) -> Result<RemoteId> {
    let groups = list_groups(client).await?;
    select_group_id(&groups, name)
}

pub async fn list_user_groups(client: &ApiClient, user_id: &RemoteId) -> Result<Vec<Group>> {
    client.get(&format!("v1/api/users/{user_id}/groups")).await
}

pub async fn add_user_to_groups(
    client: &ApiClient,
    user_id: &RemoteId,
    group_ids: &[RemoteId],
) -> Result<Value> {
    let body = json!({ "addGroups": group_ids });
    client
        .post(&format!("v1/api/users/{user_id}/groups"), &body)
        .await
}

pub async fn remove_user_from_groups(
    client: &ApiClient,
    user_id: &RemoteId,
    group_ids: &[RemoteId],
) -> Result<Value> {
    let body = json!({ "removeGroups": group_ids });
    client
        .post(&format!("v1/api/users/{user_id}/groups"), &body)
        .await
}
