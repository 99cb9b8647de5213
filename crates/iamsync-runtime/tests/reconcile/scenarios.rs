//! End-to-end walkthroughs for each resource kind.

use super::common::*;
use iamsync_core::{ProposedChangeType, Template, UserProperties, UserStatus};
use iamsync_provider::{ProviderOperation, UserState};
use serde_json::json;
use std::collections::BTreeMap;

pub fn carol_template() -> Template {
    let mut properties = UserProperties::new("carol", "dev");
    properties.status = UserStatus::Active;
    properties.profile = BTreeMap::from([
        ("firstName".to_string(), json!("Caroline")),
        ("email".to_string(), json!("carol@example.com")),
    ]);
    Template::user("resources/dev/users/carol.yaml", properties)
}

pub fn carol_state() -> UserState {
    UserState {
        username: "carol".to_string(),
        status: UserStatus::Provisioned,
        profile: BTreeMap::from([
            ("firstName".to_string(), json!("Carol")),
            ("email".to_string(), json!("carol@example.com")),
            ("lastLogin".to_string(), json!("2026-02-27T09:00:00Z")),
        ]),
    }
}

// =============================================================================
// GROUP MEMBERSHIP
// =============================================================================

#[tokio::test]
async fn test_missing_member_is_added() {
    let h = Harness::new(&["dev"]);
    h.seed_group("dev", group_state("dev-eng", &["alice"]));
    let mut template = group_template("dev", &["alice", "bob"]);

    // Detect: one members UPDATE, no provider mutation.
    let detected = h.detect(&mut template).await;
    let proposed = changes(&detected);
    assert_eq!(proposed.len(), 1);
    assert_eq!(proposed[0].change_type, ProposedChangeType::Update);
    assert_eq!(proposed[0].field.as_deref(), Some("members"));
    assert_eq!(proposed[0].after, Some(json!(["alice", "bob"])));
    assert!(h.provider.mutating_calls().is_empty());

    // Apply: the member update adds bob and records the same change.
    let applied = h.enact(&mut template).await;
    assert_eq!(changes(&applied), proposed);
    let calls = h.provider.calls_for(ProviderOperation::UpdateGroupMembers);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].detail, Some(json!({"added": ["bob"], "removed": []})));
    assert!(h.provider.group("dev", "dev-eng").unwrap().members.contains("bob"));

    // Re-apply: converged.
    let again = h.enact(&mut template).await;
    assert!(again.is_empty());
    assert!(again.proposed_changes().next().is_none());
}

#[tokio::test]
async fn test_absent_group_detect_proposes_only_create() {
    let h = Harness::new(&["dev"]);
    let mut template = group_template("dev", &["alice", "bob"]);

    let report = h.detect(&mut template).await;

    assert_eq!(report.tenant_changes.len(), 1);
    let tenant = &report.tenant_changes[0];
    assert_eq!(tenant.tenant_id, "dev");
    assert_eq!(tenant.proposed_changes.len(), 1);
    assert_eq!(tenant.proposed_changes[0].change_type, ProposedChangeType::Create);
    assert!(tenant.current_value.is_none());
    assert!(h.provider.calls_for(ProviderOperation::CreateGroup).is_empty());
}

#[tokio::test]
async fn test_report_carries_current_and_new_value() {
    let h = Harness::new(&["dev"]);
    h.seed_group("dev", group_state("dev-eng", &["alice"]));
    let mut template = group_template("dev", &["alice", "bob"]);

    let report = h.detect(&mut template).await;

    assert_eq!(report.resource_id, "dev-eng");
    assert_eq!(report.resource_type, "idp:group");
    assert_eq!(report.storage_location, "resources/dev/eng.yaml");
    let tenant = &report.tenant_changes[0];
    assert_eq!(tenant.new_value["members"], json!(["alice", "bob"]));
    assert_eq!(tenant.current_value.as_ref().unwrap()["name"], json!("eng"));
}

#[tokio::test]
async fn test_field_failure_keeps_other_fields() {
    let h = Harness::new(&["dev"]);
    let mut live = group_state("dev-eng", &["alice"]);
    live.description = "Old".to_string();
    h.seed_group("dev", live);
    h.provider.fail_operation("dev", ProviderOperation::UpdateGroupDescription);
    let mut template = group_template("dev", &["alice", "bob"]);

    let report = h.enact(&mut template).await;

    let tenant = &report.tenant_changes[0];
    assert_eq!(fields(&report), vec!["members"]);
    assert_eq!(tenant.exceptions.len(), 1);
    assert_eq!(tenant.exceptions[0].step, "update:description");
    let group = h.provider.group("dev", "dev-eng").unwrap();
    assert_eq!(group.description, "Old");
    assert!(group.members.contains("bob"));
}

// =============================================================================
// USERS
// =============================================================================

#[tokio::test]
async fn test_user_status_and_profile_reconciled() {
    let h = Harness::new(&["dev"]);
    h.provider.seed_user("dev", carol_state()).unwrap();
    let mut template = carol_template();

    let report = h.enact(&mut template).await;

    assert_eq!(fields(&report), vec!["status", "profile"]);
    let profile_change = report
        .proposed_changes()
        .find(|c| c.field.as_deref() == Some("profile"))
        .unwrap();
    assert_eq!(
        profile_change.before,
        Some(json!({"email": "carol@example.com", "firstName": "Carol"}))
    );

    let user = h.provider.user("dev", "carol").unwrap();
    assert_eq!(user.status, UserStatus::Active);
    assert_eq!(user.profile["firstName"], json!("Caroline"));
    // Attributes the template does not name are left alone.
    assert_eq!(user.profile["lastLogin"], json!("2026-02-27T09:00:00Z"));

    assert!(h.enact(&mut template).await.is_empty());
}

#[tokio::test]
async fn test_absent_user_is_created_with_profile() {
    let h = Harness::new(&["dev"]);
    let mut template = carol_template();

    let report = h.enact(&mut template).await;

    let proposed = changes(&report);
    assert_eq!(proposed.len(), 1);
    assert_eq!(proposed[0].change_type, ProposedChangeType::Create);
    assert_eq!(proposed[0].resource_type, "idp:user");
    let user = h.provider.user("dev", "carol").unwrap();
    assert_eq!(user.profile["email"], json!("carol@example.com"));
    assert!(h.provider.calls_for(ProviderOperation::UpdateUserProfile).is_empty());
}
