//! In-memory provider.
//!
//! Holds live state per tenant, records every call it receives, and can be
//! told to fail a whole tenant or a single operation. Used by the test suites
//! and for local dry runs seeded from a YAML snapshot.

use async_trait::async_trait;
use iamsync_core::diff::{self, FIELD_DESCRIPTION, FIELD_NAME, FIELD_STATUS};
use iamsync_core::{
    GroupProperties, Members, ProposedChange, TemplateType, TenantConfig, UserProperties,
    UserStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::adapter::{GroupAdapter, GroupState, UserAdapter, UserState};
use crate::error::ProviderError;

/// Operation kinds recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderOperation {
    FetchGroup,
    CreateGroup,
    UpdateGroupName,
    UpdateGroupDescription,
    UpdateGroupMembers,
    DeleteGroup,
    FetchUser,
    CreateUser,
    UpdateUserStatus,
    UpdateUserProfile,
    DeleteUser,
}

impl ProviderOperation {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::FetchGroup | Self::FetchUser)
    }
}

/// One recorded adapter call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderCall {
    pub tenant: String,
    pub operation: ProviderOperation,
    pub resource_id: String,
    /// Call arguments worth asserting on (e.g. members added).
    pub detail: Option<Value>,
}

/// Live state of one tenant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantSnapshot {
    #[serde(default)]
    pub groups: Vec<GroupState>,
    #[serde(default)]
    pub users: Vec<UserState>,
}

/// Live state of every tenant, as persisted in a state file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSnapshot {
    #[serde(default)]
    pub tenants: BTreeMap<String, TenantSnapshot>,
}

impl ProviderSnapshot {
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[derive(Debug, Default)]
struct TenantState {
    groups: BTreeMap<String, GroupState>,
    users: BTreeMap<String, UserState>,
}

#[derive(Debug, Clone)]
struct FailureRule {
    tenant: String,
    operation: Option<ProviderOperation>,
}

#[derive(Debug, Default)]
pub struct InMemoryProvider {
    state: Mutex<BTreeMap<String, TenantState>>,
    calls: Mutex<Vec<ProviderCall>>,
    failures: Mutex<Vec<FailureRule>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: ProviderSnapshot) -> Self {
        let state = snapshot
            .tenants
            .into_iter()
            .map(|(tenant, s)| {
                let groups = s
                    .groups
                    .into_iter()
                    .map(|g| (g.resource_id.clone(), g))
                    .collect();
                let users = s
                    .users
                    .into_iter()
                    .map(|u| (u.username.clone(), u))
                    .collect();
                (tenant, TenantState { groups, users })
            })
            .collect();

        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    /// Current live state of every tenant.
    pub fn snapshot(&self) -> Result<ProviderSnapshot, ProviderError> {
        let state = lock(&self.state)?;
        let tenants = state
            .iter()
            .map(|(tenant, s)| {
                (
                    tenant.clone(),
                    TenantSnapshot {
                        groups: s.groups.values().cloned().collect(),
                        users: s.users.values().cloned().collect(),
                    },
                )
            })
            .collect();
        Ok(ProviderSnapshot { tenants })
    }

    pub fn seed_group(&self, tenant: &str, group: GroupState) -> Result<(), ProviderError> {
        let mut state = lock(&self.state)?;
        state
            .entry(tenant.to_string())
            .or_default()
            .groups
            .insert(group.resource_id.clone(), group);
        Ok(())
    }

    pub fn seed_user(&self, tenant: &str, user: UserState) -> Result<(), ProviderError> {
        let mut state = lock(&self.state)?;
        state
            .entry(tenant.to_string())
            .or_default()
            .users
            .insert(user.username.clone(), user);
        Ok(())
    }

    pub fn group(&self, tenant: &str, resource_id: &str) -> Option<GroupState> {
        let state = lock(&self.state).ok()?;
        state.get(tenant)?.groups.get(resource_id).cloned()
    }

    pub fn user(&self, tenant: &str, username: &str) -> Option<UserState> {
        let state = lock(&self.state).ok()?;
        state.get(tenant)?.users.get(username).cloned()
    }

    /// Fail every call against `tenant`.
    pub fn fail_tenant(&self, tenant: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(FailureRule {
                tenant: tenant.to_string(),
                operation: None,
            });
        }
    }

    /// Fail one operation against `tenant`.
    pub fn fail_operation(&self, tenant: &str, operation: ProviderOperation) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(FailureRule {
                tenant: tenant.to_string(),
                operation: Some(operation),
            });
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.clear();
        }
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn mutating_calls(&self) -> Vec<ProviderCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation.is_mutating())
            .collect()
    }

    pub fn calls_for(&self, operation: ProviderOperation) -> Vec<ProviderCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation == operation)
            .collect()
    }

    pub fn reset_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    /// Record the call, then fail it if a matching rule is installed.
    fn begin(
        &self,
        tenant: &TenantConfig,
        operation: ProviderOperation,
        resource_id: &str,
        detail: Option<Value>,
    ) -> Result<(), ProviderError> {
        lock(&self.calls)?.push(ProviderCall {
            tenant: tenant.name.clone(),
            operation,
            resource_id: resource_id.to_string(),
            detail,
        });

        let failing = lock(&self.failures)?
            .iter()
            .any(|r| r.tenant == tenant.name && r.operation.is_none_or(|op| op == operation));
        if failing {
            tracing::debug!(tenant = %tenant.name, ?operation, "Injected provider failure");
            return Err(ProviderError::Unavailable {
                tenant: tenant.name.clone(),
                reason: format!("injected failure for {:?}", operation),
            });
        }
        Ok(())
    }

    fn with_group<T>(
        &self,
        tenant: &TenantConfig,
        resource_id: &str,
        f: impl FnOnce(&mut GroupState) -> T,
    ) -> Result<T, ProviderError> {
        let mut state = lock(&self.state)?;
        let group = state
            .get_mut(&tenant.name)
            .and_then(|s| s.groups.get_mut(resource_id))
            .ok_or_else(|| ProviderError::Rejected {
                tenant: tenant.name.clone(),
                operation: "update group".to_string(),
                reason: format!("group {} does not exist", resource_id),
            })?;
        Ok(f(group))
    }

    fn with_user<T>(
        &self,
        tenant: &TenantConfig,
        username: &str,
        f: impl FnOnce(&mut UserState) -> T,
    ) -> Result<T, ProviderError> {
        let mut state = lock(&self.state)?;
        let user = state
            .get_mut(&tenant.name)
            .and_then(|s| s.users.get_mut(username))
            .ok_or_else(|| ProviderError::Rejected {
                tenant: tenant.name.clone(),
                operation: "update user".to_string(),
                reason: format!("user {} does not exist", username),
            })?;
        Ok(f(user))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, ProviderError> {
    mutex
        .lock()
        .map_err(|e| ProviderError::Internal(anyhow::anyhow!("in-memory provider lock poisoned: {}", e)))
}

const GROUP: TemplateType = TemplateType::Group;
const USER: TemplateType = TemplateType::User;

#[async_trait]
impl GroupAdapter for InMemoryProvider {
    async fn fetch_group(
        &self,
        resource_id: &str,
        tenant: &TenantConfig,
    ) -> Result<Option<GroupState>, ProviderError> {
        self.begin(tenant, ProviderOperation::FetchGroup, resource_id, None)?;
        let state = lock(&self.state)?;
        Ok(state
            .get(&tenant.name)
            .and_then(|s| s.groups.get(resource_id))
            .cloned())
    }

    async fn create_group(
        &self,
        desired: &GroupProperties,
        tenant: &TenantConfig,
    ) -> Result<GroupState, ProviderError> {
        let resource_id = desired.resource_id();
        self.begin(tenant, ProviderOperation::CreateGroup, &resource_id, None)?;

        let mut state = lock(&self.state)?;
        let groups = &mut state.entry(tenant.name.clone()).or_default().groups;
        let group = groups.entry(resource_id.clone()).or_insert_with(|| GroupState {
            resource_id,
            name: desired.name.clone(),
            description: desired.description.clone(),
            members: Members::new(),
        });
        Ok(group.clone())
    }

    async fn update_group_name(
        &self,
        current: &GroupState,
        name: &str,
        tenant: &TenantConfig,
    ) -> Result<Vec<ProposedChange>, ProviderError> {
        self.begin(
            tenant,
            ProviderOperation::UpdateGroupName,
            &current.resource_id,
            Some(json!(name)),
        )?;
        let Some(change) = diff::diff_value(
            &current.resource_id,
            GROUP.resource_type(),
            FIELD_NAME,
            json!(current.name),
            json!(name),
        ) else {
            return Ok(vec![]);
        };
        self.with_group(tenant, &current.resource_id, |g| g.name = name.to_string())?;
        Ok(vec![change])
    }

    async fn update_group_description(
        &self,
        current: &GroupState,
        description: &str,
        tenant: &TenantConfig,
    ) -> Result<Vec<ProposedChange>, ProviderError> {
        self.begin(
            tenant,
            ProviderOperation::UpdateGroupDescription,
            &current.resource_id,
            Some(json!(description)),
        )?;
        let Some(change) = diff::diff_value(
            &current.resource_id,
            GROUP.resource_type(),
            FIELD_DESCRIPTION,
            json!(current.description),
            json!(description),
        ) else {
            return Ok(vec![]);
        };
        self.with_group(tenant, &current.resource_id, |g| {
            g.description = description.to_string()
        })?;
        Ok(vec![change])
    }

    async fn update_group_members(
        &self,
        current: &GroupState,
        members: &Members,
        tenant: &TenantConfig,
    ) -> Result<Vec<ProposedChange>, ProviderError> {
        let delta = diff::member_delta(&current.members, members);
        self.begin(
            tenant,
            ProviderOperation::UpdateGroupMembers,
            &current.resource_id,
            Some(json!({
                "added": delta.added_usernames(),
                "removed": delta.removed,
            })),
        )?;
        let Some(change) = diff::diff_members(
            &current.resource_id,
            GROUP.resource_type(),
            &current.members,
            members,
        ) else {
            return Ok(vec![]);
        };
        self.with_group(tenant, &current.resource_id, |g| {
            for username in &delta.removed {
                g.members.remove(username);
            }
            for member in delta.added {
                g.members.insert(member);
            }
        })?;
        Ok(vec![change])
    }

    async fn delete_group(
        &self,
        current: &GroupState,
        tenant: &TenantConfig,
    ) -> Result<Vec<ProposedChange>, ProviderError> {
        self.begin(tenant, ProviderOperation::DeleteGroup, &current.resource_id, None)?;
        let mut state = lock(&self.state)?;
        let removed = state
            .get_mut(&tenant.name)
            .and_then(|s| s.groups.remove(&current.resource_id));
        Ok(removed
            .map(|g| vec![ProposedChange::delete(g.resource_id, GROUP.resource_type())])
            .unwrap_or_default())
    }
}

#[async_trait]
impl UserAdapter for InMemoryProvider {
    async fn fetch_user(
        &self,
        username: &str,
        tenant: &TenantConfig,
    ) -> Result<Option<UserState>, ProviderError> {
        self.begin(tenant, ProviderOperation::FetchUser, username, None)?;
        let state = lock(&self.state)?;
        Ok(state
            .get(&tenant.name)
            .and_then(|s| s.users.get(username))
            .cloned())
    }

    async fn create_user(
        &self,
        desired: &UserProperties,
        tenant: &TenantConfig,
    ) -> Result<UserState, ProviderError> {
        self.begin(tenant, ProviderOperation::CreateUser, &desired.username, None)?;

        let mut state = lock(&self.state)?;
        let users = &mut state.entry(tenant.name.clone()).or_default().users;
        let user = users
            .entry(desired.username.clone())
            .or_insert_with(|| UserState {
                username: desired.username.clone(),
                status: desired.status,
                profile: desired.profile.clone(),
            });
        Ok(user.clone())
    }

    async fn update_user_status(
        &self,
        current: &UserState,
        status: UserStatus,
        tenant: &TenantConfig,
    ) -> Result<Vec<ProposedChange>, ProviderError> {
        self.begin(
            tenant,
            ProviderOperation::UpdateUserStatus,
            &current.username,
            Some(json!(status.as_str())),
        )?;
        let Some(change) = diff::diff_value(
            &current.username,
            USER.resource_type(),
            FIELD_STATUS,
            json!(current.status.as_str()),
            json!(status.as_str()),
        ) else {
            return Ok(vec![]);
        };
        self.with_user(tenant, &current.username, |u| u.status = status)?;
        Ok(vec![change])
    }

    async fn update_user_profile(
        &self,
        current: &UserState,
        profile: &BTreeMap<String, Value>,
        tenant: &TenantConfig,
    ) -> Result<Vec<ProposedChange>, ProviderError> {
        self.begin(
            tenant,
            ProviderOperation::UpdateUserProfile,
            &current.username,
            Some(json!(profile)),
        )?;
        let Some(change) =
            diff::diff_profile(&current.username, USER.resource_type(), &current.profile, profile)
        else {
            return Ok(vec![]);
        };
        self.with_user(tenant, &current.username, |u| {
            for (k, v) in profile {
                u.profile.insert(k.clone(), v.clone());
            }
        })?;
        Ok(vec![change])
    }

    async fn delete_user(
        &self,
        current: &UserState,
        tenant: &TenantConfig,
    ) -> Result<Vec<ProposedChange>, ProviderError> {
        self.begin(tenant, ProviderOperation::DeleteUser, &current.username, None)?;
        let mut state = lock(&self.state)?;
        let removed = state
            .get_mut(&tenant.name)
            .and_then(|s| s.users.remove(&current.username));
        Ok(removed
            .map(|u| vec![ProposedChange::delete(u.username, USER.resource_type())])
            .unwrap_or_default())
    }
}
