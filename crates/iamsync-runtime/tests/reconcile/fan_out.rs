//! Tenant targeting and per-tenant isolation.

use super::common::*;
use iamsync_core::ProposedChangeType;
use iamsync_provider::ProviderOperation;

#[tokio::test]
async fn test_failing_tenant_does_not_cancel_siblings() {
    let h = Harness::new(&["dev", "staging", "prod"]);
    h.seed_group("prod", group_state("dev-eng", &["alice"]));
    h.provider.fail_tenant("staging");
    let mut template = group_template("dev", &["alice", "bob"]);
    template.included_tenants = vec!["*".to_string()];

    let report = h.enact(&mut template).await;

    let tenants: Vec<_> = report.tenant_changes.iter().map(|t| t.tenant_id.as_str()).collect();
    assert_eq!(tenants, vec!["dev", "staging", "prod"]);

    let dev = &report.tenant_changes[0];
    assert_eq!(dev.proposed_changes[0].change_type, ProposedChangeType::Create);
    assert!(dev.exceptions.is_empty());

    let staging = &report.tenant_changes[1];
    assert!(staging.proposed_changes.is_empty());
    assert_eq!(staging.exceptions.len(), 1);
    assert_eq!(staging.exceptions[0].step, "fetch");

    let prod = &report.tenant_changes[2];
    assert_eq!(prod.proposed_changes.len(), 1);
    assert_eq!(prod.proposed_changes[0].field.as_deref(), Some("members"));
    assert!(h.provider.group("prod", "dev-eng").unwrap().members.contains("bob"));
}

#[tokio::test]
async fn test_failure_during_detect_is_reported() {
    let h = Harness::new(&["dev", "prod"]);
    h.provider.fail_tenant("dev");
    let mut template = group_template("dev", &["alice"]);
    template.included_tenants = vec!["dev".to_string(), "prod".to_string()];

    let report = h.detect(&mut template).await;

    assert!(report.has_exceptions());
    assert_eq!(report.tenant_changes.len(), 2);
    assert!(h.provider.mutating_calls().is_empty());
}

#[tokio::test]
async fn test_converged_tenants_are_omitted() {
    let h = Harness::new(&["dev", "prod"]);
    h.seed_group("dev", group_state("dev-eng", &["alice"]));
    let mut template = group_template("dev", &["alice"]);
    template.included_tenants = vec!["*".to_string()];

    let report = h.detect(&mut template).await;

    assert_eq!(report.tenant_changes.len(), 1);
    assert_eq!(report.tenant_changes[0].tenant_id, "prod");
}

#[tokio::test]
async fn test_excluded_tenants_are_skipped() {
    let h = Harness::new(&["dev", "staging", "prod"]);
    let mut template = group_template("dev", &["alice"]);
    template.included_tenants = vec!["*".to_string()];
    template.excluded_tenants = vec!["prod".to_string()];

    let report = h.detect(&mut template).await;

    let tenants: Vec<_> = report.tenant_changes.iter().map(|t| t.tenant_id.as_str()).collect();
    assert_eq!(tenants, vec!["dev", "staging"]);
    assert!(
        h.provider
            .calls_for(ProviderOperation::FetchGroup)
            .iter()
            .all(|c| c.tenant != "prod")
    );
}

#[tokio::test]
async fn test_default_targets_bound_tenant() {
    let h = Harness::new(&["dev", "prod"]);
    let mut template = group_template("prod", &["alice"]);

    let report = h.detect(&mut template).await;

    assert_eq!(report.tenant_changes.len(), 1);
    assert_eq!(report.tenant_changes[0].tenant_id, "prod");
    assert_eq!(h.provider.calls().len(), 1);
}
