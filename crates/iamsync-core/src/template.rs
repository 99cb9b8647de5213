//! Declarative templates and their resource-kind specific properties.
//!
//! A [`Template`] is bound to exactly one resource kind through its
//! [`TemplateType`]. The kind selects both the shape of
//! [`TemplateProperties`] and, at runtime, the provider adapter that
//! reconciles it.
//!
//! # File format
//!
//! ```yaml
//! template_type: IdP::Group
//! expires_at: 2030-01-01T00:00:00Z
//! management_mode: enforced
//! properties:
//!   name: engineering
//!   tenant_id: development
//!   description: Engineering team
//!   members:
//!     - username: alice@example.com
//!     - username: bob@example.com
//!       expires_at: 2029-06-30T00:00:00Z
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::TenantConfig;

/// Pattern matching every configured tenant in `included_tenants` / `excluded_tenants`.
pub const ALL_TENANTS: &str = "*";

/// Errors raised when a template is structurally invalid.
///
/// These are detected before any provider call and fail the whole template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// Properties do not match the declared template type.
    #[error("invalid {template_type} properties: {reason}")]
    InvalidProperties {
        template_type: TemplateType,
        reason: String,
    },

    /// A required property is empty.
    #[error("{template_type} template is missing required property '{field}'")]
    MissingField {
        template_type: TemplateType,
        field: &'static str,
    },

    /// The template does not name the tenant it belongs to.
    #[error("template {resource_id} has no tenant binding")]
    MissingTenantBinding { resource_id: String },

    /// Tenant targeting matched none of the configured tenants.
    #[error("template {resource_id} does not target any configured tenant (bound to '{tenant_id}')")]
    NoMatchingTenant {
        resource_id: String,
        tenant_id: String,
    },
}

/// Resource kind a template describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateType {
    #[serde(rename = "IdP::Group")]
    Group,
    #[serde(rename = "IdP::User")]
    User,
}

impl TemplateType {
    /// Resource type recorded on every proposed change.
    pub fn resource_type(&self) -> &'static str {
        match self {
            Self::Group => "idp:group",
            Self::User => "idp:user",
        }
    }
}

impl std::fmt::Display for TemplateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Group => write!(f, "IdP::Group"),
            Self::User => write!(f, "IdP::User"),
        }
    }
}

/// How strictly the engine owns a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagementMode {
    #[default]
    Undefined,
    /// Track live state only; never issue a mutating provider call.
    ImportOnly,
    Enforced,
}

impl ManagementMode {
    pub fn is_undefined(&self) -> bool {
        *self == Self::Undefined
    }
}

/// Account status of an identity-provider user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Provisioned,
    Deprovisioned,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Provisioned => "provisioned",
            Self::Deprovisioned => "deprovisioned",
        }
    }
}

/// Reference to a user inside a collection such as group membership.
///
/// Carries its own lifecycle fields so individual memberships can expire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRef {
    pub username: String,

    #[serde(default)]
    pub status: UserStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

impl MemberRef {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            status: UserStatus::Active,
            expires_at: None,
            deleted: false,
        }
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// Ordered set of members, unique by username.
///
/// Insertion order is preserved so diffs render the same way on every run.
/// Duplicate usernames collapse onto the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<MemberRef>", into = "Vec<MemberRef>")]
pub struct Members(Vec<MemberRef>);

impl Members {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert a member; returns false if the username was already present.
    pub fn insert(&mut self, member: MemberRef) -> bool {
        if self.contains(&member.username) {
            return false;
        }
        self.0.push(member);
        true
    }

    /// Remove a member by username; returns the removed entry.
    pub fn remove(&mut self, username: &str) -> Option<MemberRef> {
        let idx = self.0.iter().position(|m| m.username == username)?;
        Some(self.0.remove(idx))
    }

    pub fn contains(&self, username: &str) -> bool {
        self.0.iter().any(|m| m.username == username)
    }

    pub fn usernames(&self) -> Vec<String> {
        self.0.iter().map(|m| m.username.clone()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MemberRef> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, MemberRef> {
        self.0.iter_mut()
    }

    pub fn retain(&mut self, f: impl FnMut(&MemberRef) -> bool) {
        self.0.retain(f)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Same usernames, ignoring order.
    pub fn same_usernames(&self, other: &Members) -> bool {
        self.len() == other.len() && self.iter().all(|m| other.contains(&m.username))
    }
}

impl From<Vec<MemberRef>> for Members {
    fn from(members: Vec<MemberRef>) -> Self {
        members.into_iter().collect()
    }
}

impl From<Members> for Vec<MemberRef> {
    fn from(members: Members) -> Self {
        members.0
    }
}

impl FromIterator<MemberRef> for Members {
    fn from_iter<I: IntoIterator<Item = MemberRef>>(iter: I) -> Self {
        let mut members = Members::new();
        for member in iter {
            members.insert(member);
        }
        members
    }
}

impl<'a> IntoIterator for &'a Members {
    type Item = &'a MemberRef;
    type IntoIter = std::slice::Iter<'a, MemberRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Desired state of an identity-provider group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupProperties {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Tenant (identity-provider account) the group belongs to. An unset
    /// binding is reported by [`Template::validate`].
    #[serde(default)]
    pub tenant_id: String,

    /// Stable identifier. Derived from tenant and name when not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub members: Members,
}

impl GroupProperties {
    pub fn new(name: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: None,
            tenant_id: tenant_id.into(),
            resource_id: None,
            description: String::new(),
            members: Members::new(),
        }
    }

    pub fn resource_id(&self) -> String {
        match &self.resource_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => format!("{}-{}", self.tenant_id, self.name),
        }
    }
}

/// Desired state of an identity-provider user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProperties {
    pub username: String,

    #[serde(default)]
    pub tenant_id: String,

    #[serde(default)]
    pub status: UserStatus,

    /// Free-form profile attributes (first name, email, ...).
    #[serde(default)]
    pub profile: BTreeMap<String, serde_json::Value>,
}

impl UserProperties {
    pub fn new(username: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            tenant_id: tenant_id.into(),
            status: UserStatus::Active,
            profile: BTreeMap::new(),
        }
    }

    pub fn resource_id(&self) -> String {
        self.username.clone()
    }
}

/// Resource-kind specific desired state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TemplateProperties {
    Group(GroupProperties),
    User(UserProperties),
}

impl TemplateProperties {
    pub fn template_type(&self) -> TemplateType {
        match self {
            Self::Group(_) => TemplateType::Group,
            Self::User(_) => TemplateType::User,
        }
    }

    pub fn resource_id(&self) -> String {
        match self {
            Self::Group(p) => p.resource_id(),
            Self::User(p) => p.resource_id(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        match self {
            Self::Group(p) => &p.tenant_id,
            Self::User(p) => &p.tenant_id,
        }
    }

    /// Name used in log lines.
    pub fn display_name(&self) -> &str {
        match self {
            Self::Group(p) => &p.name,
            Self::User(p) => &p.username,
        }
    }

    pub fn members(&self) -> Option<&Members> {
        match self {
            Self::Group(p) => Some(&p.members),
            Self::User(_) => None,
        }
    }

    pub fn members_mut(&mut self) -> Option<&mut Members> {
        match self {
            Self::Group(p) => Some(&mut p.members),
            Self::User(_) => None,
        }
    }
}

/// A declarative record of one resource's desired state plus lifecycle metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TemplateDocument")]
pub struct Template {
    pub template_type: TemplateType,

    /// Opaque handle of the persisted record (a file path for the YAML store).
    #[serde(skip_serializing)]
    pub storage_location: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Soft-delete flag, explicit or derived from `expires_at`.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,

    /// Allows the provider resource to be removed once `deleted` is set.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub force_delete: bool,

    #[serde(skip_serializing_if = "ManagementMode::is_undefined")]
    pub management_mode: ManagementMode,

    /// Tenants to reconcile against. Empty means the tenant the properties are bound to.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub included_tenants: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excluded_tenants: Vec<String>,

    pub properties: TemplateProperties,
}

impl Template {
    pub fn new(storage_location: impl Into<String>, properties: TemplateProperties) -> Self {
        Self {
            template_type: properties.template_type(),
            storage_location: storage_location.into(),
            expires_at: None,
            deleted: false,
            force_delete: false,
            management_mode: ManagementMode::Undefined,
            included_tenants: Vec::new(),
            excluded_tenants: Vec::new(),
            properties,
        }
    }

    pub fn group(storage_location: impl Into<String>, properties: GroupProperties) -> Self {
        Self::new(storage_location, TemplateProperties::Group(properties))
    }

    pub fn user(storage_location: impl Into<String>, properties: UserProperties) -> Self {
        Self::new(storage_location, TemplateProperties::User(properties))
    }

    /// Parse a template from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Render the template in the file format [`from_yaml`](Self::from_yaml) reads.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn with_storage_location(mut self, storage_location: impl Into<String>) -> Self {
        self.storage_location = storage_location.into();
        self
    }

    pub fn resource_id(&self) -> String {
        self.properties.resource_id()
    }

    pub fn resource_type(&self) -> &'static str {
        self.template_type.resource_type()
    }

    /// Structural checks that must pass before any provider call.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.properties.template_type() != self.template_type {
            return Err(TemplateError::InvalidProperties {
                template_type: self.template_type,
                reason: format!(
                    "properties describe a {} resource",
                    self.properties.template_type()
                ),
            });
        }

        match &self.properties {
            TemplateProperties::Group(p) if p.name.trim().is_empty() => {
                return Err(TemplateError::MissingField {
                    template_type: self.template_type,
                    field: "name",
                });
            }
            TemplateProperties::User(p) if p.username.trim().is_empty() => {
                return Err(TemplateError::MissingField {
                    template_type: self.template_type,
                    field: "username",
                });
            }
            _ => {}
        }

        if self.properties.tenant_id().trim().is_empty() {
            return Err(TemplateError::MissingTenantBinding {
                resource_id: self.resource_id(),
            });
        }

        Ok(())
    }

    /// Resolve the configured tenants this template reconciles against, in configuration order.
    pub fn target_tenants<'a>(
        &self,
        configured: &'a [TenantConfig],
    ) -> Result<Vec<&'a TenantConfig>, TemplateError> {
        self.validate()?;

        let bound = [self.properties.tenant_id().to_string()];
        let included: &[String] = if self.included_tenants.is_empty() {
            &bound
        } else {
            &self.included_tenants
        };

        let targets: Vec<&TenantConfig> = configured
            .iter()
            .filter(|t| {
                tenant_matches(included, &t.name) && !tenant_matches(&self.excluded_tenants, &t.name)
            })
            .collect();

        if targets.is_empty() {
            return Err(TemplateError::NoMatchingTenant {
                resource_id: self.resource_id(),
                tenant_id: self.properties.tenant_id().to_string(),
            });
        }

        Ok(targets)
    }
}

fn tenant_matches(patterns: &[String], tenant: &str) -> bool {
    patterns.iter().any(|p| p == ALL_TENANTS || p == tenant)
}

/// On-disk shape of a template; properties are typed once `template_type` is known.
#[derive(Debug, Deserialize)]
struct TemplateDocument {
    template_type: TemplateType,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    force_delete: bool,
    #[serde(default)]
    management_mode: ManagementMode,
    #[serde(default)]
    included_tenants: Vec<String>,
    #[serde(default)]
    excluded_tenants: Vec<String>,
    properties: serde_yaml::Value,
}

impl TryFrom<TemplateDocument> for Template {
    type Error = TemplateError;

    fn try_from(doc: TemplateDocument) -> Result<Self, Self::Error> {
        let template_type = doc.template_type;
        let invalid = |e: serde_yaml::Error| TemplateError::InvalidProperties {
            template_type,
            reason: e.to_string(),
        };

        let properties = match template_type {
            TemplateType::Group => {
                TemplateProperties::Group(serde_yaml::from_value(doc.properties).map_err(invalid)?)
            }
            TemplateType::User => {
                TemplateProperties::User(serde_yaml::from_value(doc.properties).map_err(invalid)?)
            }
        };

        Ok(Self {
            template_type,
            storage_location: String::new(),
            expires_at: doc.expires_at,
            deleted: doc.deleted,
            force_delete: doc.force_delete,
            management_mode: doc.management_mode,
            included_tenants: doc.included_tenants,
            excluded_tenants: doc.excluded_tenants,
            properties,
        })
    }
}
