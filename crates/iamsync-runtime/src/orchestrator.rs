//! Tenant fan-out: one template against every tenant it targets.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use iamsync_core::{
    ExecutionContext, Expiring, Template, TemplateChangeReport, TemplateProperties,
    TenantChangeDetails, TenantConfig,
};
use iamsync_provider::Providers;
use tracing::Instrument;

use crate::error::ReconcileError;
use crate::reconciler::{
    GroupReconciler, ResourceLifecycle, ResourceReconciler, UserReconciler, reconcile_tenant,
};

/// Reconcile `template` against its target tenants concurrently.
///
/// Tenants are independent: a provider failure in one is recorded on that
/// tenant's entry and never cancels the others. Structural problems with the
/// template fail the whole template before any provider call.
pub async fn reconcile_template(
    template: &Template,
    tenants: &[TenantConfig],
    providers: &Providers,
    ctx: ExecutionContext,
    now: DateTime<Utc>,
) -> Result<TemplateChangeReport, ReconcileError> {
    let targets = template
        .target_tenants(tenants)
        .map_err(|source| ReconcileError::Configuration {
            storage_location: template.storage_location.clone(),
            source,
        })?;

    let report = TemplateChangeReport::new(
        template.resource_id(),
        template.resource_type(),
        &template.storage_location,
    );

    let Some(ctx) = ctx.for_management_mode(template.management_mode) else {
        tracing::info!(
            resource_id = %report.resource_id,
            resource_type = %report.resource_type,
            "Skipping import-only resource"
        );
        return Ok(report);
    };
    let lifecycle = ResourceLifecycle {
        deleted: template.lifecycle(now).deleted,
        force_delete: template.force_delete,
    };

    let details = match &template.properties {
        TemplateProperties::Group(properties) => {
            let reconciler = GroupReconciler::new(properties, providers.groups(), now);
            fan_out(&reconciler, &targets, ctx, lifecycle).await
        }
        TemplateProperties::User(properties) => {
            let reconciler = UserReconciler::new(properties, providers.users());
            fan_out(&reconciler, &targets, ctx, lifecycle).await
        }
    };

    let report = report.with_tenants(details);

    if report.has_exceptions() {
        tracing::warn!(
            resource_id = %report.resource_id,
            resource_type = %report.resource_type,
            mode = %ctx.mode(),
            "Finished with exceptions for resource"
        );
    } else if !report.has_changes() {
        tracing::info!(
            resource_id = %report.resource_id,
            resource_type = %report.resource_type,
            "No changes detected for resource"
        );
    } else if ctx.execute {
        tracing::info!(
            resource_id = %report.resource_id,
            resource_type = %report.resource_type,
            tenants = report.tenant_changes.len(),
            "Successfully applied changes to resource"
        );
    } else {
        tracing::info!(
            resource_id = %report.resource_id,
            resource_type = %report.resource_type,
            tenants = report.tenant_changes.len(),
            "Successfully detected required changes for resource"
        );
    }

    Ok(report)
}

/// Run the per-tenant reconciler for every target and wait for all of them.
async fn fan_out<R: ResourceReconciler>(
    resource: &R,
    tenants: &[&TenantConfig],
    ctx: ExecutionContext,
    lifecycle: ResourceLifecycle,
) -> Vec<TenantChangeDetails> {
    join_all(tenants.iter().map(|&tenant| {
        let span = tracing::info_span!(
            "tenant",
            tenant = %tenant.name,
            resource_id = resource.resource_id(),
            mode = %ctx.mode()
        );
        async move {
            if ctx.execute {
                tracing::info!("Applying changes to resource.");
            } else {
                tracing::info!("Detecting changes for resource.");
            }
            reconcile_tenant(resource, tenant, ctx, lifecycle).await
        }
        .instrument(span)
    }))
    .await
}
