//! # iamsync-runtime
//!
//! Reconciliation engine.
//!
//! - [`reconciler`]: the per-tenant state machine
//!   (`FETCHING -> ABSENT | PRESENT -> RECONCILING_FIELDS -> DELETION_CHECK -> DONE`)
//!   and the group/user resource reconcilers plugged into it
//! - [`orchestrator`]: fans one template out to every target tenant
//! - [`apply`]: the batch entry point outer tooling calls
//!
//! ```ignore
//! let engine = ApplyEngine::new(config.tenants.clone(), providers);
//! let results = engine.apply(&mut templates, ExecutionContext::detect()).await;
//! ```

pub mod apply;
pub mod error;
pub mod orchestrator;
pub mod reconciler;

pub use apply::{ApplyEngine, TemplateResult, record_removable};
pub use error::ReconcileError;
pub use orchestrator::reconcile_template;
pub use reconciler::{
    GroupReconciler, ResourceLifecycle, ResourceReconciler, UserReconciler, reconcile_tenant,
};
