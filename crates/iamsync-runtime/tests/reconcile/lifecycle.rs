//! Expiry, soft delete and hard delete.

use super::common::*;
use iamsync_core::{ExecutionContext, MemberRef, ProposedChangeType, TemplateProperties};
use iamsync_provider::ProviderOperation;
use iamsync_runtime::record_removable;
use serde_json::json;

// =============================================================================
// TEMPLATE EXPIRY
// =============================================================================

#[tokio::test]
async fn test_expired_template_is_deleted_in_both_modes() {
    for ctx in [ExecutionContext::detect(), ExecutionContext::enact()] {
        let h = Harness::new(&["dev"]);
        h.seed_group("dev", group_state("dev-eng", &["alice"]));
        let mut template = group_template("dev", &["alice"]);
        template.expires_at = Some(yesterday());

        h.run(&mut template, ctx).await;

        assert!(template.deleted, "expired template should be marked deleted ({})", ctx.mode());
    }
}

#[tokio::test]
async fn test_future_expiry_is_not_deleted() {
    let h = Harness::new(&["dev"]);
    h.seed_group("dev", group_state("dev-eng", &["alice"]));
    let mut template = group_template("dev", &["alice"]);
    template.expires_at = Some(tomorrow());
    template.force_delete = true;

    let report = h.enact(&mut template).await;

    assert!(!template.deleted);
    assert!(report.is_empty());
    assert!(h.provider.group("dev", "dev-eng").is_some());
}

// =============================================================================
// HARD DELETE
// =============================================================================

#[tokio::test]
async fn test_force_delete_removes_group_only_in_apply() {
    let h = Harness::new(&["dev"]);
    h.seed_group("dev", group_state("dev-eng", &["alice"]));
    let mut template = group_template("dev", &["alice"]);
    template.expires_at = Some(yesterday());
    template.force_delete = true;

    let detected = h.detect(&mut template).await;
    let proposed = changes(&detected);
    assert_eq!(proposed.len(), 1);
    assert_eq!(proposed[0].change_type, ProposedChangeType::Delete);
    assert!(h.provider.calls_for(ProviderOperation::DeleteGroup).is_empty());
    assert!(h.provider.group("dev", "dev-eng").is_some());

    let applied = h.enact(&mut template).await;
    assert_eq!(changes(&applied), proposed);
    assert_eq!(h.provider.calls_for(ProviderOperation::DeleteGroup).len(), 1);
    assert!(h.provider.group("dev", "dev-eng").is_none());
    assert!(record_removable(&template, &applied, ExecutionContext::enact()));
}

#[tokio::test]
async fn test_deleted_resource_is_still_diffed_before_delete() {
    let h = Harness::new(&["dev"]);
    h.seed_group("dev", group_state("dev-eng", &["alice", "dave"]));
    let mut template = group_template("dev", &["alice"]);
    template.deleted = true;
    template.force_delete = true;

    let report = h.enact(&mut template).await;

    let types: Vec<_> = report.proposed_changes().map(|c| c.change_type).collect();
    assert_eq!(types, vec![ProposedChangeType::Update, ProposedChangeType::Delete]);
    let ops: Vec<_> = h.provider.mutating_calls().into_iter().map(|c| c.operation).collect();
    assert_eq!(ops.last(), Some(&ProviderOperation::DeleteGroup));
}

#[tokio::test]
async fn test_deleted_and_absent_proposes_nothing() {
    let h = Harness::new(&["dev"]);
    let mut template = group_template("dev", &["alice"]);
    template.deleted = true;
    template.force_delete = true;

    let report = h.enact(&mut template).await;

    assert!(report.is_empty());
    assert!(h.provider.mutating_calls().is_empty());
}

#[tokio::test]
async fn test_delete_failure_blocks_record_removal() {
    let h = Harness::new(&["dev"]);
    h.seed_group("dev", group_state("dev-eng", &["alice"]));
    h.provider.fail_operation("dev", ProviderOperation::DeleteGroup);
    let mut template = group_template("dev", &["alice"]);
    template.deleted = true;
    template.force_delete = true;

    let report = h.enact(&mut template).await;

    assert_eq!(report.tenant_changes[0].exceptions[0].step, "delete");
    assert!(!record_removable(&template, &report, ExecutionContext::enact()));
}

// =============================================================================
// SOFT DELETE
// =============================================================================

#[tokio::test]
async fn test_soft_delete_never_calls_delete() {
    let h = Harness::new(&["dev"]);
    h.seed_group("dev", group_state("dev-eng", &["alice"]));
    let mut template = group_template("dev", &["alice", "bob"]);
    template.expires_at = Some(yesterday());

    let report = h.enact(&mut template).await;

    assert!(template.deleted);
    assert_eq!(fields(&report), vec!["members"]);
    assert!(report.proposed_changes().all(|c| c.change_type != ProposedChangeType::Delete));
    assert!(h.provider.calls_for(ProviderOperation::DeleteGroup).is_empty());
    assert!(h.provider.group("dev", "dev-eng").is_some());
    assert!(!record_removable(&template, &report, ExecutionContext::enact()));
}

// =============================================================================
// MEMBER EXPIRY
// =============================================================================

#[tokio::test]
async fn test_expired_member_is_removed() {
    let h = Harness::new(&["dev"]);
    h.seed_group("dev", group_state("dev-eng", &["alice", "bob"]));
    let mut template = group_template("dev", &["alice"]);
    if let TemplateProperties::Group(g) = &mut template.properties {
        g.members.insert(MemberRef::new("bob").expiring_at(yesterday()));
    }

    let detected = h.detect(&mut template).await;
    let change = detected.proposed_changes().next().unwrap().clone();
    assert_eq!(change.field.as_deref(), Some("members"));
    assert_eq!(change.after, Some(json!(["alice"])));
    assert_eq!(change.change_summary, Some(json!({"added": [], "removed": ["bob"]})));
    assert!(h.provider.mutating_calls().is_empty());

    let bob = template.properties.members().unwrap().iter().find(|m| m.username == "bob").unwrap();
    assert!(bob.deleted, "expired member should be flagged for write-back");

    h.enact(&mut template).await;
    let group = h.provider.group("dev", "dev-eng").unwrap();
    assert!(!group.members.contains("bob"));
    assert!(group.members.contains("alice"));
}
