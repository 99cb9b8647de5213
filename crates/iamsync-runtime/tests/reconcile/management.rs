//! Management mode and configuration errors.

use super::common::*;
use iamsync_core::{
    ActionSummary, ExecutionContext, ManagementMode, TemplateError,
};
use iamsync_provider::ProviderOperation;
use iamsync_runtime::{ReconcileError, record_removable};

// =============================================================================
// IMPORT_ONLY
// =============================================================================

#[tokio::test]
async fn test_import_only_drift_is_not_reported() {
    for ctx in [ExecutionContext::detect(), ExecutionContext::enact()] {
        let h = Harness::new(&["dev"]);
        h.seed_group("dev", group_state("dev-eng", &["alice"]));
        let mut template = group_template("dev", &["alice", "bob"]);
        template.management_mode = ManagementMode::ImportOnly;

        let report = h.run(&mut template, ctx).await;

        assert!(report.is_empty(), "import-only report should be empty ({})", ctx.mode());
        assert!(h.provider.calls().is_empty());
        assert!(!h.provider.group("dev", "dev-eng").unwrap().members.contains("bob"));
    }
}

#[tokio::test]
async fn test_import_only_absent_resource_converges() {
    let h = Harness::new(&["dev"]);
    let mut template = group_template("dev", &["alice"]);
    template.management_mode = ManagementMode::ImportOnly;

    let first = h.enact(&mut template).await;
    let second = h.enact(&mut template).await;

    assert!(first.is_empty());
    assert!(second.is_empty());
    assert!(h.provider.calls_for(ProviderOperation::CreateGroup).is_empty());
    let summary = ActionSummary::from_reports([&first, &second]);
    assert!(summary.is_empty());
}

#[tokio::test]
async fn test_import_only_never_deletes() {
    let h = Harness::new(&["dev"]);
    h.seed_group("dev", group_state("dev-eng", &["alice"]));
    let mut template = group_template("dev", &["alice"]);
    template.management_mode = ManagementMode::ImportOnly;
    template.deleted = true;
    template.force_delete = true;

    let report = h.enact(&mut template).await;

    assert!(report.is_empty());
    assert!(h.provider.group("dev", "dev-eng").is_some());
    assert!(!record_removable(&template, &report, ExecutionContext::enact()));
}

#[tokio::test]
async fn test_import_only_still_validates_targets() {
    let h = Harness::new(&["dev"]);
    let mut batch = [group_template("qa", &["alice"])];
    batch[0].management_mode = ManagementMode::ImportOnly;

    let results = h.run_batch(&mut batch, ExecutionContext::enact()).await;

    assert!(matches!(&results[0], Err(ReconcileError::Configuration { .. })));
}

#[tokio::test]
async fn test_enforced_mode_applies() {
    let h = Harness::new(&["dev"]);
    h.seed_group("dev", group_state("dev-eng", &["alice"]));
    let mut template = group_template("dev", &["alice", "bob"]);
    template.management_mode = ManagementMode::Enforced;

    h.enact(&mut template).await;

    assert_eq!(h.provider.calls_for(ProviderOperation::UpdateGroupMembers).len(), 1);
}

// =============================================================================
// CONFIGURATION ERRORS
// =============================================================================

#[tokio::test]
async fn test_configuration_error_fails_only_that_template() {
    let h = Harness::new(&["dev"]);
    let unbound = group_template("", &["alice"]);
    let good = group_template("dev", &["alice"]);

    let results = h.run_batch(&mut [unbound, good], ExecutionContext::enact()).await;

    assert_eq!(results.len(), 2);
    match &results[0] {
        Err(ReconcileError::Configuration { storage_location, source }) => {
            assert_eq!(storage_location, "resources//eng.yaml");
            assert!(matches!(source, TemplateError::MissingTenantBinding { .. }));
        }
        other => panic!("expected configuration error, got {:?}", other),
    }
    let report = results[1].as_ref().unwrap();
    assert_eq!(report.resource_id, "dev-eng");
    assert!(h.provider.calls().iter().all(|c| c.resource_id == "dev-eng"));
}

#[tokio::test]
async fn test_unknown_tenant_is_configuration_error() {
    let h = Harness::new(&["dev"]);
    let mut batch = [group_template("qa", &["alice"])];

    let results = h.run_batch(&mut batch, ExecutionContext::detect()).await;

    assert!(matches!(
        &results[0],
        Err(ReconcileError::Configuration {
            source: TemplateError::NoMatchingTenant { .. },
            ..
        })
    ));
    assert!(h.provider.calls().is_empty());
}

#[tokio::test]
async fn test_batch_results_keep_input_order() {
    let h = Harness::new(&["dev", "prod"]);
    h.seed_group("prod", group_state("prod-eng", &["alice"]));
    let mut batch = [
        group_template("dev", &["alice"]),
        group_template("prod", &["alice"]),
        group_template("prod", &["alice", "bob"]),
    ];

    let results = h.run_batch(&mut batch, ExecutionContext::detect()).await;

    let reports: Vec<_> = results.iter().map(|r| r.as_ref().unwrap()).collect();
    assert_eq!(reports[0].resource_id, "dev-eng");
    assert!(reports[1].is_empty());
    assert_eq!(fields(reports[2]), vec!["members"]);

    let summary = ActionSummary::from_reports(reports.iter().copied());
    assert_eq!(summary.num_templates, 2);
    assert_eq!(summary.num_create_actions, 1);
    assert_eq!(summary.num_update_actions, 1);
    assert!(!summary.is_empty());
}
