//! Per-tenant reconciler.
//!
//! One run walks `FETCHING -> (ABSENT | PRESENT) -> RECONCILING_FIELDS ->
//! DELETION_CHECK -> DONE` for a single resource in a single tenant. The
//! state machine is shared by every resource kind; kinds plug in through
//! [`ResourceReconciler`].
//!
//! Every provider failure is caught here and recorded as an exception on the
//! returned [`TenantChangeDetails`], together with whatever changes were
//! already computed. A run always reaches `DONE`.

pub mod group;
pub mod user;

use async_trait::async_trait;
use futures::future::{BoxFuture, join_all};
use iamsync_core::{
    ExecutionContext, ExecutionMode, ProposedChange, TenantChangeDetails, TenantConfig,
};
use iamsync_provider::ProviderError;
use serde::Serialize;

pub use group::GroupReconciler;
pub use user::UserReconciler;

/// Future reconciling one mutable field.
pub type FieldFuture<'a> = BoxFuture<'a, Result<Vec<ProposedChange>, ProviderError>>;

/// A field reconciler ready to run.
pub struct FieldTask<'a> {
    pub field: &'static str,
    pub future: FieldFuture<'a>,
}

impl<'a> FieldTask<'a> {
    pub fn new(field: &'static str, future: FieldFuture<'a>) -> Self {
        Self { field, future }
    }
}

/// Resource-kind specific half of the per-tenant reconciler.
///
/// Implementations bind desired state and a provider adapter. Field tasks
/// read only the shared `current` snapshot and their own desired value, so
/// they may run concurrently in any order.
#[async_trait]
pub trait ResourceReconciler: Send + Sync {
    type State: Serialize + Send + Sync;

    fn resource_id(&self) -> &str;

    fn resource_type(&self) -> &'static str;

    /// Desired state as recorded in the report.
    fn desired_value(&self) -> serde_json::Value;

    async fn fetch(&self, tenant: &TenantConfig) -> Result<Option<Self::State>, ProviderError>;

    async fn create(&self, tenant: &TenantConfig) -> Result<Self::State, ProviderError>;

    /// One task per mutable field. In detect mode a task must not call the
    /// adapter; it returns the change it would have made.
    fn field_tasks<'a>(
        &'a self,
        current: &'a Self::State,
        tenant: &'a TenantConfig,
        ctx: ExecutionContext,
    ) -> Vec<FieldTask<'a>>;

    async fn delete(
        &self,
        current: &Self::State,
        tenant: &TenantConfig,
    ) -> Result<Vec<ProposedChange>, ProviderError>;
}

/// Lifecycle inputs for one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceLifecycle {
    pub deleted: bool,
    pub force_delete: bool,
}

impl ResourceLifecycle {
    /// The provider resource is to be removed.
    pub fn hard_delete(&self) -> bool {
        self.deleted && self.force_delete
    }
}

/// Log context carried through a tenant run.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileScope<'a> {
    pub tenant: &'a str,
    pub resource_id: &'a str,
    pub resource_type: &'static str,
    pub mode: ExecutionMode,
}

impl<'a> ReconcileScope<'a> {
    pub fn new<R: ResourceReconciler>(
        resource: &'a R,
        tenant: &'a TenantConfig,
        ctx: ExecutionContext,
    ) -> Self {
        Self {
            tenant: &tenant.name,
            resource_id: resource.resource_id(),
            resource_type: resource.resource_type(),
            mode: ctx.mode(),
        }
    }
}

/// Reconcile one resource in one tenant.
pub async fn reconcile_tenant<R: ResourceReconciler>(
    resource: &R,
    tenant: &TenantConfig,
    ctx: ExecutionContext,
    lifecycle: ResourceLifecycle,
) -> TenantChangeDetails {
    let scope = ReconcileScope::new(resource, tenant, ctx);
    let mut details = TenantChangeDetails::new(
        &tenant.name,
        resource.resource_id(),
        resource.desired_value(),
    );

    let fetched = match resource.fetch(tenant).await {
        Ok(fetched) => fetched,
        Err(e) => {
            tracing::warn!(
                tenant = scope.tenant,
                resource_id = scope.resource_id,
                resource_type = scope.resource_type,
                error = %e,
                "Failed to fetch resource"
            );
            details.record_exception("fetch", &e);
            return details;
        }
    };

    let current = match fetched {
        Some(current) => current,
        None if lifecycle.deleted => {
            tracing::debug!(
                tenant = scope.tenant,
                resource_id = scope.resource_id,
                "Deleted resource is absent from tenant"
            );
            return details;
        }
        None => {
            details.push(ProposedChange::create(
                scope.resource_id,
                scope.resource_type,
            ));
            if !ctx.execute {
                // Field reconcilers need an existing resource.
                tracing::info!(
                    tenant = scope.tenant,
                    resource_id = scope.resource_id,
                    resource_type = scope.resource_type,
                    mode = %scope.mode,
                    "New resource found in code."
                );
                return details;
            }

            tracing::info!(
                tenant = scope.tenant,
                resource_id = scope.resource_id,
                resource_type = scope.resource_type,
                mode = %scope.mode,
                "New resource found in code. Creating resource..."
            );
            match resource.create(tenant).await {
                Ok(created) => created,
                Err(e) => {
                    tracing::warn!(
                        tenant = scope.tenant,
                        resource_id = scope.resource_id,
                        error = %e,
                        "Failed to create resource"
                    );
                    details.record_exception("create", &e);
                    return details;
                }
            }
        }
    };
    details.current_value = serde_json::to_value(&current).ok();

    let (fields, futures): (Vec<_>, Vec<_>) = resource
        .field_tasks(&current, tenant, ctx)
        .into_iter()
        .map(|t| (t.field, t.future))
        .unzip();
    let results = join_all(futures).await;

    for (field, result) in fields.into_iter().zip(results) {
        match result {
            Ok(changes) => details.extend(changes),
            Err(e) => {
                tracing::warn!(
                    tenant = scope.tenant,
                    resource_id = scope.resource_id,
                    field,
                    error = %e,
                    "Failed to reconcile field"
                );
                details.record_exception(format!("update:{}", field), &e);
            }
        }
    }

    if lifecycle.hard_delete() {
        if ctx.execute {
            match resource.delete(&current, tenant).await {
                Ok(changes) => details.extend(changes),
                Err(e) => {
                    tracing::warn!(
                        tenant = scope.tenant,
                        resource_id = scope.resource_id,
                        error = %e,
                        "Failed to delete resource"
                    );
                    details.record_exception("delete", &e);
                }
            }
        } else {
            details.push(ProposedChange::delete(
                scope.resource_id,
                scope.resource_type,
            ));
        }
    } else if lifecycle.deleted {
        tracing::debug!(
            tenant = scope.tenant,
            resource_id = scope.resource_id,
            "Resource is soft-deleted; set force_delete to remove it"
        );
    }

    if ctx.execute {
        tracing::debug!(
            tenant = scope.tenant,
            resource_id = scope.resource_id,
            resource_type = scope.resource_type,
            changes_made = details.has_changes(),
            exceptions = details.exceptions.len(),
            "Successfully finished execution for resource"
        );
    } else {
        tracing::debug!(
            tenant = scope.tenant,
            resource_id = scope.resource_id,
            resource_type = scope.resource_type,
            requires_changes = details.has_changes(),
            exceptions = details.exceptions.len(),
            "Successfully finished scanning for drift for resource"
        );
    }

    details
}
