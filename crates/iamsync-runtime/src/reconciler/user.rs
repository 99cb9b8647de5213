use async_trait::async_trait;
use futures::FutureExt;
use iamsync_core::diff::{self, FIELD_PROFILE, FIELD_STATUS};
use iamsync_core::{ExecutionContext, ProposedChange, TemplateType, TenantConfig, UserProperties};
use iamsync_provider::{ProviderError, UserAdapter, UserState};
use serde_json::{Value, json};

use super::{FieldTask, ResourceReconciler};

/// Reconciles a user template: account status and managed profile attributes.
pub struct UserReconciler<'r> {
    properties: &'r UserProperties,
    adapter: &'r dyn UserAdapter,
}

impl<'r> UserReconciler<'r> {
    pub fn new(properties: &'r UserProperties, adapter: &'r dyn UserAdapter) -> Self {
        Self {
            properties,
            adapter,
        }
    }
}

#[async_trait]
impl ResourceReconciler for UserReconciler<'_> {
    type State = UserState;

    fn resource_id(&self) -> &str {
        &self.properties.username
    }

    fn resource_type(&self) -> &'static str {
        TemplateType::User.resource_type()
    }

    fn desired_value(&self) -> Value {
        json!({
            "username": self.properties.username,
            "status": self.properties.status.as_str(),
            "profile": self.properties.profile,
        })
    }

    async fn fetch(&self, tenant: &TenantConfig) -> Result<Option<UserState>, ProviderError> {
        self.adapter
            .fetch_user(&self.properties.username, tenant)
            .await
    }

    async fn create(&self, tenant: &TenantConfig) -> Result<UserState, ProviderError> {
        self.adapter.create_user(self.properties, tenant).await
    }

    fn field_tasks<'a>(
        &'a self,
        current: &'a UserState,
        tenant: &'a TenantConfig,
        ctx: ExecutionContext,
    ) -> Vec<FieldTask<'a>> {
        let resource_id = self.resource_id();
        let resource_type = self.resource_type();

        let status = async move {
            let Some(change) = diff::diff_value(
                resource_id,
                resource_type,
                FIELD_STATUS,
                json!(current.status.as_str()),
                json!(self.properties.status.as_str()),
            ) else {
                return Ok(vec![]);
            };
            if ctx.execute {
                self.adapter
                    .update_user_status(current, self.properties.status, tenant)
                    .await
            } else {
                Ok(vec![change])
            }
        };

        let profile = async move {
            let Some(change) = diff::diff_profile(
                resource_id,
                resource_type,
                &current.profile,
                &self.properties.profile,
            ) else {
                return Ok(vec![]);
            };
            if ctx.execute {
                self.adapter
                    .update_user_profile(current, &self.properties.profile, tenant)
                    .await
            } else {
                Ok(vec![change])
            }
        };

        vec![
            FieldTask::new(FIELD_STATUS, status.boxed()),
            FieldTask::new(FIELD_PROFILE, profile.boxed()),
        ]
    }

    async fn delete(
        &self,
        current: &UserState,
        tenant: &TenantConfig,
    ) -> Result<Vec<ProposedChange>, ProviderError> {
        self.adapter.delete_user(current, tenant).await
    }
}
