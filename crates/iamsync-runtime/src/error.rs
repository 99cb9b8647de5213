//! Error types for the runtime crate.

use iamsync_core::TemplateError;
use thiserror::Error;

/// Errors that fail a whole template.
///
/// Provider failures never surface here; they are attached to the affected
/// tenant's [`TenantChangeDetails`](iamsync_core::TenantChangeDetails).
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// Template is structurally invalid; no provider call was made.
    #[error("configuration error in {storage_location}")]
    Configuration {
        storage_location: String,
        #[source]
        source: TemplateError,
    },
}
