//! Multi-call user orchestration for Brivo.
//!
//! Creating one logical "member" in Brivo takes up to four dependent calls:
//! 1. create the user record (or find the existing one by member id);
//! 2. write the member id into the member-id custom field;
//! 3. assign the user to groups, resolved from names;
//! 4. assign the access card, resolved from `(facility, card number)`.
//!
//! Steps 2-4 are independent and run concurrently. When the member already
//! exists and the names match, the record is reset in place (groups and
//! credentials removed) instead of deleted and recreated, because a delete
//! followed by a create reads badly in Brivo's audit log.
//!
//! No step is compensated when a later one fails: a member id may be
//! written even though group assignment failed. Callers treat the whole
//! operation as failed and may re-run it, which converges.
//!
//! Concurrent branches are joined with `tokio::join!` rather than
//! `try_join!`, so a failing branch never cancels a sibling already in
//! flight; the joined result reports the first error.

use serde_json::Value;
use tracing::{debug, error, info, instrument};

use crate::batch::{BatchConfig, run_batched};
use crate::client::ApiClient;
use crate::credentials;
use crate::custom_fields;
use crate::discovery::DiscoveryCache;
use crate::error::{BrivoError, Result};
use crate::groups;
use crate::users::{self, RemoteId, RemoteUser};

/// Input for the create-or-update operation.
///
/// `card_number` and `facility_code` must be both present or both absent.
/// Empty strings count as absent, since bulk input rows often carry blank
/// cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub member_id: String,
    pub group_names: Vec<String>,
    pub card_number: Option<String>,
    pub facility_code: Option<String>,
}

impl CreateUserRequest {
    pub fn new(first_name: &str, last_name: &str, member_id: &str) -> Self {
        CreateUserRequest {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            member_id: member_id.to_string(),
            ..Default::default()
        }
    }

    pub fn with_groups<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_card(mut self, facility_code: &str, card_number: &str) -> Self {
        self.facility_code = Some(facility_code.to_string());
        self.card_number = Some(card_number.to_string());
        self
    }

    /// Validated `(facility_code, card_number)` pair, or `None` for no card.
    pub fn card(&self) -> Result<Option<(&str, &str)>> {
        fn present(value: &Option<String>) -> Option<&str> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
        }
        match (present(&self.facility_code), present(&self.card_number)) {
            (Some(facility), Some(card)) => Ok(Some((facility, card))),
            (None, None) => Ok(None),
            _ => Err(BrivoError::Usage(
                "Both facility code and card number must be provided or none of them".to_string(),
            )),
        }
    }
}

/// Input for suspend/resume. Supplied names act as a guard against a
/// mistyped or recycled member id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuspendRequest {
    pub member_id: String,
    pub suspend: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl SuspendRequest {
    pub fn new(member_id: &str, suspend: bool) -> Self {
        SuspendRequest {
            member_id: member_id.to_string(),
            suspend,
            ..Default::default()
        }
    }

    pub fn expecting_name(mut self, first_name: &str, last_name: &str) -> Self {
        self.first_name = Some(first_name.to_string());
        self.last_name = Some(last_name.to_string());
        self
    }

    /// `true` when no name is supplied, or when the full supplied
    /// `(first, last)` pair equals the remote one. A missing half of the
    /// pair counts as empty and therefore mismatches a named user.
    fn matches(&self, user: &RemoteUser) -> bool {
        let first = self.first_name.as_deref().unwrap_or_default();
        let last = self.last_name.as_deref().unwrap_or_default();
        if first.is_empty() && last.is_empty() {
            return true;
        }
        user.has_name(first, last)
    }
}

/// Orchestrates user operations over a client, its discovery cache and its
/// batch policy. Cheap to construct; borrow one per operation.
pub struct Directory<'a> {
    client: &'a ApiClient,
    cache: &'a DiscoveryCache,
    batch: &'a BatchConfig,
}

impl<'a> Directory<'a> {
    pub fn new(client: &'a ApiClient, cache: &'a DiscoveryCache, batch: &'a BatchConfig) -> Self {
        Directory {
            client,
            cache,
            batch,
        }
    }

    /// The single user whose member-id custom field equals `member_id`.
    pub async fn find_user_by_member_id(&self, member_id: &str) -> Result<RemoteUser> {
        let field_id = self.cache.member_id_field(self.client).await?;
        let matches = users::find_users_by_custom_field(self.client, &field_id, member_id).await?;
        users::select_single_user(matches, member_id)
    }

    /// Creates the member, or resets and reuses the existing record when
    /// the names match, then applies member id, groups and card.
    ///
    /// Returns the Brivo user id.
    ///
    /// # Errors
    ///
    /// - `BrivoError::Usage`: exactly one of card number / facility code given.
    /// - `BrivoError::Conflict`: the member id belongs to someone with a
    ///   different name; nothing is modified.
    /// - `BrivoError::DuplicateMember`: the member id is on several users.
    /// - anything a remote call returns, unchanged.
    #[instrument(skip_all, fields(member_id = %request.member_id))]
    pub async fn create_user(&self, request: &CreateUserRequest) -> Result<RemoteId> {
        let card = request.card()?;

        let user = match self.find_user_by_member_id(&request.member_id).await {
            Ok(existing) => {
                if !existing.has_name(&request.first_name, &request.last_name) {
                    let msg = format!(
                        "User with member ID {} already exists in Brivo, but with different name. Refusing to update automatically",
                        request.member_id
                    );
                    error!("{msg}");
                    return Err(BrivoError::Conflict(msg));
                }
                info!("first and last name match, resetting existing member");
                let (groups, credentials) = tokio::join!(
                    self.remove_all_groups_from_user(&existing.id),
                    self.remove_all_credentials_from_user(&existing.id),
                );
                groups?;
                credentials?;
                existing
            }
            Err(err) if err.is_user_not_found() => {
                debug!("creating new user");
                users::create_remote_user(self.client, &request.first_name, &request.last_name)
                    .await?
            }
            Err(err) => return Err(err),
        };

        let card_step = async {
            match card {
                Some((facility, card_number)) => {
                    self.assign_card(&user.id, facility, card_number).await
                }
                None => Ok(()),
            }
        };
        let (member_id, groups, card) = tokio::join!(
            self.set_member_id(&user.id, &request.member_id),
            self.assign_groups(&user.id, &request.group_names),
            card_step,
        );
        member_id?;
        groups?;
        card?;

        info!(user_id = %user.id, "user processed");
        Ok(user.id)
    }

    /// Sets or clears the suspended flag of the member.
    ///
    /// # Errors
    ///
    /// - `BrivoError::UserNotFound`: no user has this member id.
    /// - `BrivoError::Conflict`: a supplied name differs from the remote
    ///   record; no update is sent.
    #[instrument(skip_all, fields(member_id = %request.member_id, suspend = request.suspend))]
    pub async fn toggle_member_suspend(&self, request: &SuspendRequest) -> Result<Value> {
        let user = self.find_user_by_member_id(&request.member_id).await?;
        if !request.matches(&user) {
            let msg = format!(
                "Member ID {} does not match the first and last name. Refusing to suspend",
                request.member_id
            );
            error!("{msg}");
            return Err(BrivoError::Conflict(msg));
        }
        users::set_suspended(self.client, &user.id, request.suspend).await
    }

    /// Writes the member id into the discovered member-id custom field.
    pub async fn set_member_id(&self, user_id: &RemoteId, member_id: &str) -> Result<()> {
        let field_id = self.cache.member_id_field(self.client).await?;
        custom_fields::set_custom_field_value(self.client, user_id, &field_id, member_id).await?;
        Ok(())
    }

    /// Resolves group names to ids, batch by batch, through the cache.
    /// The output keeps the order of `names`.
    pub async fn resolve_group_ids(&self, names: &[String]) -> Result<Vec<RemoteId>> {
        let lookups = names
            .iter()
            .map(|name| self.cache.group_id(self.client, name));
        run_batched(lookups, self.batch).await
    }

    /// Adds the user to every named group in one call. No call is made for
    /// an empty list.
    pub async fn assign_groups(&self, user_id: &RemoteId, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let group_ids = self.resolve_group_ids(names).await?;
        groups::add_user_to_groups(self.client, user_id, &group_ids).await?;
        Ok(())
    }

    /// Resolves the card's internal credential id and assigns it.
    pub async fn assign_card(
        &self,
        user_id: &RemoteId,
        facility_code: &str,
        card_number: &str,
    ) -> Result<()> {
        info!(%user_id, facility_code, card_number, "assigning card");
        let credential_id = self
            .cache
            .credential_id(self.client, facility_code, card_number)
            .await?;
        credentials::assign_credential(self.client, user_id, &credential_id).await?;
        Ok(())
    }

    pub async fn list_all_user_credentials(&self, user_id: &RemoteId) -> Result<Vec<RemoteId>> {
        let assigned = credentials::list_user_credentials(self.client, user_id).await?;
        Ok(assigned.into_iter().map(|credential| credential.id).collect())
    }

    /// Unassigns every credential of the user: one listing call, then one
    /// DELETE per credential in batches. Returns how many were removed.
    pub async fn remove_all_credentials_from_user(&self, user_id: &RemoteId) -> Result<usize> {
        info!(%user_id, "removing all credentials");
        let credential_ids = self.list_all_user_credentials(user_id).await?;
        let deletions = credential_ids
            .iter()
            .map(|credential_id| credentials::unassign_credential(self.client, user_id, credential_id));
        let removed = run_batched(deletions, self.batch).await?;
        Ok(removed.len())
    }

    /// Removes the user from every group in one call. No removal call is
    /// made when the user has no groups. Returns how many were removed.
    pub async fn remove_all_groups_from_user(&self, user_id: &RemoteId) -> Result<usize> {
        info!(%user_id, "removing all groups");
        let memberships = groups::list_user_groups(self.client, user_id).await?;
        if memberships.is_empty() {
            return Ok(0);
        }
        let group_ids: Vec<RemoteId> = memberships.into_iter().map(|group| group.id).collect();
        groups::remove_user_from_groups(self.client, user_id, &group_ids).await?;
        Ok(group_ids.len())
    }
}
