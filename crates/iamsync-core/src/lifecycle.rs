//! Expiry and soft-delete policy.
//!
//! `deleted` is a pure function of `(expires_at, explicit flag, now)`. The
//! engine evaluates it once per reconciliation pass, for the template and for
//! every nested collection member, regardless of execution mode so that
//! detect runs reveal deletions that an apply run would perform.

use chrono::{DateTime, Utc};

use crate::template::{MemberRef, Members, Template};

/// Outcome of evaluating the lifecycle of one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleState {
    pub deleted: bool,
}

/// Deleted iff already flagged, or `now` is strictly past `expires_at`.
pub fn evaluate_lifecycle(
    expires_at: Option<DateTime<Utc>>,
    deleted: bool,
    now: DateTime<Utc>,
) -> LifecycleState {
    let expired = expires_at.is_some_and(|at| now > at);
    LifecycleState {
        deleted: deleted || expired,
    }
}

/// An entity carrying lifecycle fields.
pub trait Expiring {
    fn expires_at(&self) -> Option<DateTime<Utc>>;
    fn is_deleted(&self) -> bool;
    fn set_deleted(&mut self, deleted: bool);

    fn lifecycle(&self, now: DateTime<Utc>) -> LifecycleState {
        evaluate_lifecycle(self.expires_at(), self.is_deleted(), now)
    }
}

impl Expiring for Template {
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }
}

impl Expiring for MemberRef {
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }
}

/// Evaluate the template and its nested members, writing the derived flags back.
///
/// This is the only place the engine mutates a template; outer tooling
/// persists the flags after the run.
pub fn mark_lifecycle(template: &mut Template, now: DateTime<Utc>) -> LifecycleState {
    if let Some(members) = template.properties.members_mut() {
        for member in members.iter_mut() {
            let state = member.lifecycle(now);
            member.set_deleted(state.deleted);
        }
    }

    let state = template.lifecycle(now);
    template.set_deleted(state.deleted);
    state
}

/// Desired members with expired entries removed.
///
/// Pure in-memory filtering; removing the member from the provider is up to
/// the members field reconciler.
pub fn prune_expired(members: &Members, now: DateTime<Utc>) -> Members {
    members
        .iter()
        .filter(|m| !m.lifecycle(now).deleted)
        .cloned()
        .collect()
}
