//! Engine-wide guarantees that hold for every template.

use super::common::*;
use iamsync_core::{ExecutionContext, ProposedChangeType, TemplateChangeReport, TemplateProperties};
use iamsync_provider::ProviderOperation;

// =============================================================================
// IDEMPOTENCE
// =============================================================================

#[tokio::test]
async fn test_second_apply_is_empty() {
    let h = Harness::new(&["dev"]);
    h.seed_group("dev", group_state("dev-eng", &["alice"]));
    let mut template = group_template("dev", &["alice", "bob", "carol"]);
    if let TemplateProperties::Group(g) = &mut template.properties {
        g.description = "Engineering team".to_string();
    }

    let first = h.enact(&mut template).await;
    assert!(first.has_changes(), "first apply should converge the group");

    let second = h.enact(&mut template).await;
    assert!(second.is_empty(), "second apply should have nothing to do: {:?}", second);
}

#[tokio::test]
async fn test_apply_after_create_is_empty() {
    let h = Harness::new(&["dev"]);
    let mut template = group_template("dev", &["alice", "bob"]);

    let first = h.enact(&mut template).await;
    assert_eq!(first.proposed_changes().next().map(|c| c.change_type), Some(ProposedChangeType::Create));

    let second = h.enact(&mut template).await;
    assert!(second.is_empty());
}

// =============================================================================
// MODE EQUIVALENCE
// =============================================================================

#[tokio::test]
async fn test_detect_and_apply_propose_identical_changes() {
    let live = {
        let mut g = group_state("dev-eng", &["alice", "dave"]);
        g.description = "Old description".to_string();
        g
    };
    let template = group_template("dev", &["alice", "bob"]);

    let detect_run = Harness::new(&["dev"]);
    detect_run.seed_group("dev", live.clone());
    let detected = detect_run.detect(&mut template.clone()).await;

    let apply_run = Harness::new(&["dev"]);
    apply_run.seed_group("dev", live);
    let applied = apply_run.enact(&mut template.clone()).await;

    assert_eq!(fields(&detected), vec!["description", "members"]);
    assert_eq!(changes(&detected), changes(&applied));
}

#[tokio::test]
async fn test_mode_equivalence_for_users() {
    let live = super::scenarios::carol_state();
    let template = super::scenarios::carol_template();

    let detect_run = Harness::new(&["dev"]);
    detect_run.provider.seed_user("dev", live.clone()).unwrap();
    let detected: TemplateChangeReport = detect_run.detect(&mut template.clone()).await;

    let apply_run = Harness::new(&["dev"]);
    apply_run.provider.seed_user("dev", live).unwrap();
    let applied = apply_run.enact(&mut template.clone()).await;

    assert_eq!(changes(&detected).len(), 2);
    assert_eq!(changes(&detected), changes(&applied));
}

// =============================================================================
// NO SIDE EFFECTS IN DETECT MODE
// =============================================================================

#[tokio::test]
async fn test_detect_issues_no_mutating_calls() {
    let h = Harness::new(&["dev", "prod"]);
    h.seed_group("dev", group_state("dev-eng", &["dave"]));

    let mut present = group_template("dev", &["alice"]);
    present.included_tenants = vec!["*".to_string()];
    let mut expired = group_template("dev", &["alice"]);
    expired.expires_at = Some(yesterday());
    expired.force_delete = true;

    let results = h.run_batch(&mut [present, expired], ExecutionContext::detect()).await;
    assert!(results.iter().all(Result::is_ok));
    assert!(
        h.provider.mutating_calls().is_empty(),
        "detect must only fetch: {:?}",
        h.provider.mutating_calls()
    );
    assert!(!h.provider.calls_for(ProviderOperation::FetchGroup).is_empty());
}

// =============================================================================
// CREATE GATING
// =============================================================================

#[tokio::test]
async fn test_absent_resource_in_detect_stops_after_create() {
    let h = Harness::new(&["dev"]);
    let mut template = group_template("dev", &["alice", "bob"]);

    let report = h.detect(&mut template).await;

    let proposed = changes(&report);
    assert_eq!(proposed.len(), 1);
    assert_eq!(proposed[0].change_type, ProposedChangeType::Create);
    assert_eq!(proposed[0].resource_id, "dev-eng");
    assert!(h.provider.calls_for(ProviderOperation::CreateGroup).is_empty());
    assert!(h.provider.mutating_calls().is_empty());
}

#[tokio::test]
async fn test_create_precedes_field_updates() {
    let h = Harness::new(&["dev"]);
    let mut template = group_template("dev", &["alice"]);

    let report = h.enact(&mut template).await;

    let ops: Vec<_> = h.provider.mutating_calls().into_iter().map(|c| c.operation).collect();
    assert_eq!(ops.first(), Some(&ProviderOperation::CreateGroup));
    assert!(ops.contains(&ProviderOperation::UpdateGroupMembers));

    let proposed = changes(&report);
    assert_eq!(proposed[0].change_type, ProposedChangeType::Create);
    assert_eq!(proposed[1].field.as_deref(), Some("members"));
    assert_eq!(h.provider.group("dev", "dev-eng").unwrap().members, members(&["alice"]));
}

#[tokio::test]
async fn test_create_failure_keeps_create_entry() {
    let h = Harness::new(&["dev"]);
    h.provider.fail_operation("dev", ProviderOperation::CreateGroup);
    let mut template = group_template("dev", &["alice"]);

    let report = h.enact(&mut template).await;

    let tenant = &report.tenant_changes[0];
    assert_eq!(tenant.proposed_changes.len(), 1);
    assert_eq!(tenant.proposed_changes[0].change_type, ProposedChangeType::Create);
    assert_eq!(tenant.exceptions[0].step, "create");
    assert!(h.provider.calls_for(ProviderOperation::UpdateGroupMembers).is_empty());
}
