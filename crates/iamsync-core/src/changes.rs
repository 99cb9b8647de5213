//! Change ledger: structured diff records produced by reconciliation.
//!
//! Construction only. Diffing lives in [`crate::diff`] and is driven by the
//! reconciler; this module decides what is "empty" and what surfaces in a report.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Kind of an atomic change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposedChangeType {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for ProposedChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// One atomic diff unit for a resource or one of its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedChange {
    pub change_type: ProposedChangeType,
    pub resource_id: String,
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,

    /// Adapter-provided detail (e.g. which members were added).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_summary: Option<Value>,
}

impl ProposedChange {
    pub fn new(
        change_type: ProposedChangeType,
        resource_id: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            change_type,
            resource_id: resource_id.into(),
            resource_type: resource_type.into(),
            field: None,
            before: None,
            after: None,
            change_summary: None,
        }
    }

    pub fn create(resource_id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self::new(ProposedChangeType::Create, resource_id, resource_type)
    }

    pub fn update(resource_id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self::new(ProposedChangeType::Update, resource_id, resource_type)
    }

    pub fn delete(resource_id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self::new(ProposedChangeType::Delete, resource_id, resource_type)
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_before(mut self, before: Value) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_after(mut self, after: Value) -> Self {
        self.after = Some(after);
        self
    }

    pub fn with_summary(mut self, summary: Value) -> Self {
        self.change_summary = Some(summary);
        self
    }
}

/// Error marker attached to a tenant whose reconciliation did not fully complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeException {
    /// Step that failed: `fetch`, `create`, `update:<field>` or `delete`.
    pub step: String,
    pub message: String,
}

/// Result of reconciling one resource in one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantChangeDetails {
    pub tenant_id: String,
    pub resource_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<Value>,

    pub new_value: Value,

    #[serde(default)]
    pub proposed_changes: Vec<ProposedChange>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exceptions: Vec<ChangeException>,
}

impl TenantChangeDetails {
    pub fn new(tenant_id: impl Into<String>, resource_id: impl Into<String>, new_value: Value) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            resource_id: resource_id.into(),
            current_value: None,
            new_value,
            proposed_changes: Vec::new(),
            exceptions: Vec::new(),
        }
    }

    pub fn push(&mut self, change: ProposedChange) {
        self.proposed_changes.push(change);
    }

    pub fn extend(&mut self, changes: impl IntoIterator<Item = ProposedChange>) {
        self.proposed_changes.extend(changes);
    }

    pub fn record_exception(&mut self, step: impl Into<String>, message: impl std::fmt::Display) {
        self.exceptions.push(ChangeException {
            step: step.into(),
            message: message.to_string(),
        });
    }

    pub fn has_changes(&self) -> bool {
        !self.proposed_changes.is_empty()
    }

    pub fn has_exceptions(&self) -> bool {
        !self.exceptions.is_empty()
    }

    /// Nothing to report: no changes and no error marker.
    pub fn is_empty(&self) -> bool {
        !self.has_changes() && !self.has_exceptions()
    }
}

/// Per-template report; lists only tenants with something to report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateChangeReport {
    pub resource_id: String,
    pub resource_type: String,
    pub storage_location: String,

    #[serde(default)]
    pub tenant_changes: Vec<TenantChangeDetails>,
}

impl TemplateChangeReport {
    pub fn new(
        resource_id: impl Into<String>,
        resource_type: impl Into<String>,
        storage_location: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_type: resource_type.into(),
            storage_location: storage_location.into(),
            tenant_changes: Vec::new(),
        }
    }

    /// Append a tenant result, dropping it if it is empty.
    pub fn push_tenant(&mut self, details: TenantChangeDetails) {
        if !details.is_empty() {
            self.tenant_changes.push(details);
        }
    }

    pub fn with_tenants(mut self, details: impl IntoIterator<Item = TenantChangeDetails>) -> Self {
        for d in details {
            self.push_tenant(d);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tenant_changes.is_empty()
    }

    pub fn proposed_changes(&self) -> impl Iterator<Item = &ProposedChange> {
        self.tenant_changes.iter().flat_map(|t| t.proposed_changes.iter())
    }

    pub fn has_changes(&self) -> bool {
        self.tenant_changes.iter().any(TenantChangeDetails::has_changes)
    }

    pub fn has_exceptions(&self) -> bool {
        self.tenant_changes.iter().any(TenantChangeDetails::has_exceptions)
    }
}

/// Counts over a batch of reports, for review artifacts and merge gating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSummary {
    pub num_templates: usize,
    pub num_tenants: usize,
    pub num_create_actions: usize,
    pub num_update_actions: usize,
    pub num_delete_actions: usize,
    pub num_exceptions: usize,
}

impl ActionSummary {
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a TemplateChangeReport>) -> Self {
        let mut summary = Self::default();
        let mut tenants = BTreeSet::new();

        for report in reports {
            if report.is_empty() {
                continue;
            }
            summary.num_templates += 1;
            for tenant in &report.tenant_changes {
                tenants.insert(tenant.tenant_id.as_str());
                summary.num_exceptions += tenant.exceptions.len();
                for change in &tenant.proposed_changes {
                    match change.change_type {
                        ProposedChangeType::Create => summary.num_create_actions += 1,
                        ProposedChangeType::Update => summary.num_update_actions += 1,
                        ProposedChangeType::Delete => summary.num_delete_actions += 1,
                    }
                }
            }
        }

        summary.num_tenants = tenants.len();
        summary
    }

    pub fn num_actions(&self) -> usize {
        self.num_create_actions + self.num_update_actions + self.num_delete_actions
    }

    /// True when the batch proposes nothing and saw no errors.
    pub fn is_empty(&self) -> bool {
        self.num_actions() == 0 && self.num_exceptions == 0
    }
}
