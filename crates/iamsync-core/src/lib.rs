//! # iamsync-core
//!
//! Shared model for the iamsync reconciler:
//!
//! - [`Template`]: declarative desired state of one IAM resource plus lifecycle fields
//! - [`ExecutionContext`]: detect vs. apply
//! - [`lifecycle`]: the single authoritative expiry / soft-delete policy
//! - [`changes`]: the change ledger returned to callers
//! - [`diff`]: pure field diffs used by both run modes
//! - [`config`]: configuration and the YAML template store

pub mod changes;
pub mod config;
pub mod context;
pub mod diff;
pub mod lifecycle;
pub mod template;

pub use changes::{
    ActionSummary, ChangeException, ProposedChange, ProposedChangeType, TemplateChangeReport,
    TenantChangeDetails,
};
pub use config::{ConfigError, IamsyncConfig, TemplateStore, TenantConfig};
pub use context::{ExecutionContext, ExecutionMode};
pub use lifecycle::{Expiring, LifecycleState, evaluate_lifecycle, mark_lifecycle, prune_expired};
pub use template::{
    GroupProperties, ManagementMode, MemberRef, Members, Template, TemplateError, TemplateProperties,
    TemplateType, UserProperties, UserStatus,
};
