use async_trait::async_trait;
use iamsync_core::{
    GroupProperties, Members, ProposedChange, TenantConfig, UserProperties, UserStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ProviderError;

/// Live state of a group in one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupState {
    pub resource_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub members: Members,
}

/// Live state of a user in one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    pub username: String,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default)]
    pub profile: BTreeMap<String, serde_json::Value>,
}

/// Provider calls for identity-provider groups.
///
/// Implementations own request-level retry and timeouts and must be
/// idempotent under retry. `update_*` and `delete_group` return the changes
/// they enacted; an empty list means nothing needed doing.
#[async_trait]
pub trait GroupAdapter: Send + Sync {
    async fn fetch_group(
        &self,
        resource_id: &str,
        tenant: &TenantConfig,
    ) -> Result<Option<GroupState>, ProviderError>;

    /// Create the group with its name and description. Membership is
    /// reconciled afterwards by `update_group_members`.
    async fn create_group(
        &self,
        desired: &GroupProperties,
        tenant: &TenantConfig,
    ) -> Result<GroupState, ProviderError>;

    async fn update_group_name(
        &self,
        current: &GroupState,
        name: &str,
        tenant: &TenantConfig,
    ) -> Result<Vec<ProposedChange>, ProviderError>;

    async fn update_group_description(
        &self,
        current: &GroupState,
        description: &str,
        tenant: &TenantConfig,
    ) -> Result<Vec<ProposedChange>, ProviderError>;

    async fn update_group_members(
        &self,
        current: &GroupState,
        members: &Members,
        tenant: &TenantConfig,
    ) -> Result<Vec<ProposedChange>, ProviderError>;

    async fn delete_group(
        &self,
        current: &GroupState,
        tenant: &TenantConfig,
    ) -> Result<Vec<ProposedChange>, ProviderError>;
}

/// Provider calls for identity-provider users.
#[async_trait]
pub trait UserAdapter: Send + Sync {
    async fn fetch_user(
        &self,
        username: &str,
        tenant: &TenantConfig,
    ) -> Result<Option<UserState>, ProviderError>;

    async fn create_user(
        &self,
        desired: &UserProperties,
        tenant: &TenantConfig,
    ) -> Result<UserState, ProviderError>;

    async fn update_user_status(
        &self,
        current: &UserState,
        status: UserStatus,
        tenant: &TenantConfig,
    ) -> Result<Vec<ProposedChange>, ProviderError>;

    /// Set the given profile attributes; attributes not named are kept.
    async fn update_user_profile(
        &self,
        current: &UserState,
        profile: &BTreeMap<String, serde_json::Value>,
        tenant: &TenantConfig,
    ) -> Result<Vec<ProposedChange>, ProviderError>;

    async fn delete_user(
        &self,
        current: &UserState,
        tenant: &TenantConfig,
    ) -> Result<Vec<ProposedChange>, ProviderError>;
}

/// Dispatch table: one adapter per resource kind.
#[derive(Clone)]
pub struct Providers {
    groups: Arc<dyn GroupAdapter>,
    users: Arc<dyn UserAdapter>,
}

impl Providers {
    pub fn new(groups: Arc<dyn GroupAdapter>, users: Arc<dyn UserAdapter>) -> Self {
        Self { groups, users }
    }

    pub fn groups(&self) -> &dyn GroupAdapter {
        self.groups.as_ref()
    }

    pub fn users(&self) -> &dyn UserAdapter {
        self.users.as_ref()
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers").finish_non_exhaustive()
    }
}
