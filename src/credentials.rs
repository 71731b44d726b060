//! Credential (access card) endpoints of the Brivo API.
//!
//! The number printed on a card is its *reference id*; together with the
//! facility code it identifies one credential. Assignment works on the
//! credential's internal id, so a card is always resolved first with
//! [`find_credential`].
//!
//! | Function | API Path |
//! |----------|----------|
//! | [`find_credentials`] | GET `/v1/api/credentials?filter=reference_id__eq:{ref};facility_code__eq:{fac}` |
//! | [`list_user_credentials`] | GET `/v1/api/users/{id}/credentials` |
//! | [`assign_credential`] | PUT `/v1/api/users/{id}/credentials/{credentialId}` |
//! | [`unassign_credential`] | DELETE `/v1/api/users/{id}/credentials/{credentialId}` |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::ApiClient;
use crate::error::{BrivoError, Result};
use crate::users::RemoteId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: RemoteId,
    #[serde(default)]
    pub reference_id: Option<RemoteId>,
    #[serde(default)]
    pub facility_code: Option<RemoteId>,
}

pub async fn find_credentials(
    client: &ApiClient,
    facility_code: &str,
    reference_id: &str,
) -> Result<Vec<Credential>> {
    let filter = format!("reference_id__eq:{reference_id};facility_code__eq:{facility_code}");
    client
        .get_with_query("v1/api/credentials", &[("filter", filter.as_str())])
        .await
}

/// Resolves a `(facility_code, reference_id)` pair to exactly one credential.
pub async fn find_credential(
    client: &ApiClient,
    facility_code: &str,
    reference_id: &str,
) -> Result<Credential> {
    let matches = find_credentials(client, facility_code, reference_id).await?;
    select_single_credential(matches, facility_code, reference_id)
}

fn select_single_credential(
    mut matches: Vec<Credential>,
    facility_code: &str,
    reference_id: &str,
) -> Result<Credential> {
    match matches.len() {
        0 => Err(BrivoError::NotFound(format!(
            "No credentials with reference ID {reference_id} found in facility {facility_code}"
        ))),
        1 => Ok(matches.remove(0)),
        _ => Err(BrivoError::Ambiguous(format!(
            "Multiple credentials with reference ID {reference_id} found in facility {facility_code}"
        ))),
    }
}

pub async fn list_user_credentials(
    client: &ApiClient,
    user_id: &RemoteId,
) -> Result<Vec<Credential>> {
    client
        .get(&format!("v1/api/users/{user_id}/credentials"))
        .await
}

/// Assigns a credential to a user. Brivo sets the effective-from date to
/// the first assignment itself.
pub async fn assign_credential(
    client: &ApiClient,
    user_id: &RemoteId,
    credential_id: &RemoteId,
) -> Result<Value> {
    client
        .put(
            &format!("v1/api/users/{user_id}/credentials/{credential_id}"),
            None,
        )
        .await
}

pub async fn unassign_credential(
    client: &ApiClient,
    user_id: &RemoteId,
    credential_id: &RemoteId,
) -> Result<Value> {
    client
        .delete(&format!("v1/api/users/{user_id}/credentials/{credential_id}"))
        .await
}
