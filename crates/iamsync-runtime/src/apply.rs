//! Apply entry point consumed by outer tooling.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use iamsync_core::{
    ActionSummary, ExecutionContext, IamsyncConfig, ManagementMode, Template,
    TemplateChangeReport, TenantConfig, mark_lifecycle,
};
use iamsync_provider::Providers;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::ReconcileError;
use crate::orchestrator::reconcile_template;

/// Outcome for one template of a batch.
pub type TemplateResult = Result<TemplateChangeReport, ReconcileError>;

/// Reconciles batches of templates against the configured tenants.
#[derive(Debug, Clone)]
pub struct ApplyEngine {
    tenants: Vec<TenantConfig>,
    providers: Providers,
}

impl ApplyEngine {
    pub fn new(tenants: Vec<TenantConfig>, providers: Providers) -> Self {
        Self { tenants, providers }
    }

    pub fn from_config(config: &IamsyncConfig, providers: Providers) -> Self {
        Self::new(config.tenants.clone(), providers)
    }

    pub fn tenants(&self) -> &[TenantConfig] {
        &self.tenants
    }

    /// Reconcile every template, returning one result per template in input order.
    ///
    /// Lifecycle flags are evaluated first and written back into `templates`
    /// so the caller can persist them.
    pub async fn apply(&self, templates: &mut [Template], ctx: ExecutionContext) -> Vec<TemplateResult> {
        self.apply_at(templates, ctx, Utc::now()).await
    }

    /// [`apply`](Self::apply) with an explicit evaluation time.
    pub async fn apply_at(
        &self,
        templates: &mut [Template],
        ctx: ExecutionContext,
        now: DateTime<Utc>,
    ) -> Vec<TemplateResult> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("apply", %run_id, mode = %ctx.mode());

        for template in templates.iter_mut() {
            let state = mark_lifecycle(template, now);
            if state.deleted {
                tracing::debug!(
                    resource_id = %template.resource_id(),
                    force_delete = template.force_delete,
                    "Template is marked deleted"
                );
            }
        }
        let templates: &[Template] = templates;

        let results = join_all(
            templates
                .iter()
                .map(|t| reconcile_template(t, &self.tenants, &self.providers, ctx, now)),
        )
        .instrument(span.clone())
        .await;

        span.in_scope(|| {
            for (template, result) in templates.iter().zip(&results) {
                if let Err(ReconcileError::Configuration { source, .. }) = result {
                    tracing::error!(
                        storage_location = %template.storage_location,
                        error = %source,
                        "Invalid template configuration"
                    );
                }
            }

            let summary = ActionSummary::from_reports(results.iter().filter_map(|r| r.as_ref().ok()));
            tracing::info!(
                templates = templates.len(),
                templates_changed = summary.num_templates,
                tenants = summary.num_tenants,
                creates = summary.num_create_actions,
                updates = summary.num_update_actions,
                deletes = summary.num_delete_actions,
                exceptions = summary.num_exceptions,
                "Finished reconciliation run"
            );
        });

        results
    }
}

/// Whether outer tooling may delete the persisted record after this run.
///
/// Only an apply run that hard-deleted the resource from every tenant
/// without errors qualifies.
pub fn record_removable(
    template: &Template,
    report: &TemplateChangeReport,
    ctx: ExecutionContext,
) -> bool {
    ctx.execute
        && template.management_mode != ManagementMode::ImportOnly
        && template.deleted
        && template.force_delete
        && !report.has_exceptions()
}
