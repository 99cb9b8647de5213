//! Pure diff helpers shared by the reconciler and provider adapters.
//!
//! Detect runs synthesize their changes with these functions, and adapters
//! report what they enacted with the same functions, so both modes produce
//! identical [`ProposedChange`] sets for the same live state.

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

use crate::changes::ProposedChange;
use crate::template::{MemberRef, Members};

pub const FIELD_NAME: &str = "name";
pub const FIELD_DESCRIPTION: &str = "description";
pub const FIELD_MEMBERS: &str = "members";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_PROFILE: &str = "profile";

/// UPDATE for `field` when `current` and `desired` differ.
pub fn diff_value(
    resource_id: &str,
    resource_type: &str,
    field: &str,
    current: Value,
    desired: Value,
) -> Option<ProposedChange> {
    if current == desired {
        return None;
    }
    Some(
        ProposedChange::update(resource_id, resource_type)
            .with_field(field)
            .with_before(current)
            .with_after(desired),
    )
}

/// Membership operations needed to turn `current` into `desired`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberDelta {
    /// Desired members missing from the provider, in desired order.
    pub added: Vec<MemberRef>,
    /// Usernames present in the provider but not desired, in current order.
    pub removed: Vec<String>,
}

impl MemberDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn added_usernames(&self) -> Vec<&str> {
        self.added.iter().map(|m| m.username.as_str()).collect()
    }
}

pub fn member_delta(current: &Members, desired: &Members) -> MemberDelta {
    MemberDelta {
        added: desired
            .iter()
            .filter(|m| !current.contains(&m.username))
            .cloned()
            .collect(),
        removed: current
            .iter()
            .filter(|m| !desired.contains(&m.username))
            .map(|m| m.username.clone())
            .collect(),
    }
}

/// Single UPDATE on `members` carrying the full before/after username lists.
pub fn diff_members(
    resource_id: &str,
    resource_type: &str,
    current: &Members,
    desired: &Members,
) -> Option<ProposedChange> {
    let delta = member_delta(current, desired);
    if delta.is_empty() {
        return None;
    }
    Some(
        ProposedChange::update(resource_id, resource_type)
            .with_field(FIELD_MEMBERS)
            .with_before(json!(current.usernames()))
            .with_after(json!(desired.usernames()))
            .with_summary(json!({
                "added": delta.added_usernames(),
                "removed": delta.removed,
            })),
    )
}

/// UPDATE on `profile` when any desired attribute differs.
///
/// Only attributes named in `desired` are compared; attributes the provider
/// manages on its own are left alone.
pub fn diff_profile(
    resource_id: &str,
    resource_type: &str,
    current: &BTreeMap<String, Value>,
    desired: &BTreeMap<String, Value>,
) -> Option<ProposedChange> {
    let projected: Map<String, Value> = desired
        .keys()
        .map(|k| (k.clone(), current.get(k).cloned().unwrap_or(Value::Null)))
        .collect();
    let wanted: Map<String, Value> = desired.clone().into_iter().collect();

    diff_value(
        resource_id,
        resource_type,
        FIELD_PROFILE,
        Value::Object(projected),
        Value::Object(wanted),
    )
}
