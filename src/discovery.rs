//! Memoized lookups of slow-changing reference data.
//!
//! A bulk run resolves the same few groups and the member-id custom field
//! once per input row. `DiscoveryCache` remembers every successful
//! resolution for the lifetime of the owning client:
//!
//! - the member-id custom field id (one entry);
//! - group id by group name (keyed by the name exactly as passed);
//! - credential id by `(facility_code, reference_id)`.
//!
//! Failed lookups are never stored, so a group created mid-run is found on
//! the next attempt. There is no eviction: the key space is bounded by the
//! input being processed.
//!
//! The maps sit behind std `Mutex`es that are only held to read or insert,
//! never across the remote call. Two concurrent misses on the same key may
//! therefore both reach the API; both resolve to the same value.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::client::ApiClient;
use crate::credentials;
use crate::custom_fields;
use crate::error::Result;
use crate::groups;
use crate::users::RemoteId;

/// Cache key for credential lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialKey {
    pub facility_code: String,
    pub reference_id: String,
}

impl CredentialKey {
    pub fn new(facility_code: &str, reference_id: &str) -> Self {
        CredentialKey {
            facility_code: facility_code.to_string(),
            reference_id: reference_id.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct DiscoveryCache {
    member_id_field: Mutex<Option<RemoteId>>,
    groups: Mutex<HashMap<String, RemoteId>>,
    credentials: Mutex<HashMap<CredentialKey, RemoteId>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DiscoveryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the custom field that stores member ids.
    pub async fn member_id_field(&self, client: &ApiClient) -> Result<RemoteId> {
        if let Some(id) = self.cached_member_id_field() {
            return Ok(id);
        }
        let id = custom_fields::find_member_id_field(client).await?;
        debug!(field_id = %id, "discovered member id custom field");
        *locked(&self.member_id_field) = Some(id.clone());
        Ok(id)
    }

    /// Id of the group called `name` (case-insensitive match remotely).
    pub async fn group_id(&self, client: &ApiClient, name: &str) -> Result<RemoteId> {
        if let Some(id) = self.cached_group_id(name) {
            return Ok(id);
        }
        let id = groups::find_group_id_by_name(client, name).await?;
        locked(&self.groups).insert(name.to_string(), id.clone());
        Ok(id)
    }

    /// Internal id of the credential printed as `reference_id` in `facility_code`.
    pub async fn credential_id(
        &self,
        client: &ApiClient,
        facility_code: &str,
        reference_id: &str,
    ) -> Result<RemoteId> {
        let key = CredentialKey::new(facility_code, reference_id);
        if let Some(id) = locked(&self.credentials).get(&key).cloned() {
            return Ok(id);
        }
        let credential = credentials::find_credential(client, facility_code, reference_id).await?;
        locked(&self.credentials).insert(key, credential.id.clone());
        Ok(credential.id)
    }

    pub fn cached_member_id_field(&self) -> Option<RemoteId> {
        locked(&self.member_id_field).clone()
    }

    pub fn cached_group_id(&self, name: &str) -> Option<RemoteId> {
        locked(&self.groups).get(name).cloned()
    }

    pub fn cached_credential_id(&self, facility_code: &str, reference_id: &str) -> Option<RemoteId> {
        locked(&self.credentials)
            .get(&CredentialKey::new(facility_code, reference_id))
            .cloned()
    }

    /// Total number of cached resolutions across the three lookups.
    pub fn len(&self) -> usize {
        usize::from(locked(&self.member_id_field).is_some())
            + locked(&self.groups).len()
            + locked(&self.credentials).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets everything, forcing the next lookups back to the API.
    pub fn clear(&self) {
        *locked(&self.member_id_field) = None;
        locked(&self.groups).clear();
        locked(&self.credentials).clear();
    }
}
