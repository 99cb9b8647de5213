use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use iamsync_core::diff::{self, FIELD_DESCRIPTION, FIELD_MEMBERS, FIELD_NAME};
use iamsync_core::{
    ExecutionContext, GroupProperties, ProposedChange, TemplateType, TenantConfig, prune_expired,
};
use iamsync_provider::{GroupAdapter, GroupState, ProviderError};
use serde_json::{Value, json};

use super::{FieldTask, ResourceReconciler};

/// Reconciles a group template: name, description and membership.
pub struct GroupReconciler<'r> {
    properties: &'r GroupProperties,
    resource_id: String,
    adapter: &'r dyn GroupAdapter,
    now: DateTime<Utc>,
}

impl<'r> GroupReconciler<'r> {
    pub fn new(
        properties: &'r GroupProperties,
        adapter: &'r dyn GroupAdapter,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            resource_id: properties.resource_id(),
            properties,
            adapter,
            now,
        }
    }
}

#[async_trait]
impl ResourceReconciler for GroupReconciler<'_> {
    type State = GroupState;

    fn resource_id(&self) -> &str {
        &self.resource_id
    }

    fn resource_type(&self) -> &'static str {
        TemplateType::Group.resource_type()
    }

    fn desired_value(&self) -> Value {
        json!({
            "name": self.properties.name,
            "description": self.properties.description,
            "members": self.properties.members.usernames(),
        })
    }

    async fn fetch(&self, tenant: &TenantConfig) -> Result<Option<GroupState>, ProviderError> {
        self.adapter.fetch_group(&self.resource_id, tenant).await
    }

    async fn create(&self, tenant: &TenantConfig) -> Result<GroupState, ProviderError> {
        self.adapter.create_group(self.properties, tenant).await
    }

    fn field_tasks<'a>(
        &'a self,
        current: &'a GroupState,
        tenant: &'a TenantConfig,
        ctx: ExecutionContext,
    ) -> Vec<FieldTask<'a>> {
        // Expired members drop out of the desired set before diffing.
        let desired_members = prune_expired(&self.properties.members, self.now);
        let resource_id = self.resource_id.as_str();
        let resource_type = self.resource_type();

        let name = async move {
            let Some(change) = diff::diff_value(
                resource_id,
                resource_type,
                FIELD_NAME,
                json!(current.name),
                json!(self.properties.name),
            ) else {
                return Ok(vec![]);
            };
            if ctx.execute {
                self.adapter
                    .update_group_name(current, &self.properties.name, tenant)
                    .await
            } else {
                Ok(vec![change])
            }
        };

        let description = async move {
            let Some(change) = diff::diff_value(
                resource_id,
                resource_type,
                FIELD_DESCRIPTION,
                json!(current.description),
                json!(self.properties.description),
            ) else {
                return Ok(vec![]);
            };
            if ctx.execute {
                self.adapter
                    .update_group_description(current, &self.properties.description, tenant)
                    .await
            } else {
                Ok(vec![change])
            }
        };

        let members = async move {
            let Some(change) =
                diff::diff_members(resource_id, resource_type, &current.members, &desired_members)
            else {
                return Ok(vec![]);
            };
            if ctx.execute {
                self.adapter
                    .update_group_members(current, &desired_members, tenant)
                    .await
            } else {
                Ok(vec![change])
            }
        };

        vec![
            FieldTask::new(FIELD_NAME, name.boxed()),
            FieldTask::new(FIELD_DESCRIPTION, description.boxed()),
            FieldTask::new(FIELD_MEMBERS, members.boxed()),
        ]
    }

    async fn delete(
        &self,
        current: &GroupState,
        tenant: &TenantConfig,
    ) -> Result<Vec<ProposedChange>, ProviderError> {
        self.adapter.delete_group(current, tenant).await
    }
}
