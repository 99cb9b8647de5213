//! Error types for provider adapters.

use thiserror::Error;

/// Errors raised by a provider adapter call.
///
/// An absent resource is not an error; `fetch_*` returns `Ok(None)` for it.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider refused the request (validation, conflict, ...).
    #[error("{operation} rejected by tenant {tenant}: {reason}")]
    Rejected {
        tenant: String,
        operation: String,
        reason: String,
    },

    /// Credentials lack the permission for this call.
    #[error("permission denied in tenant {tenant}: {reason}")]
    PermissionDenied { tenant: String, reason: String },

    /// Provider-side rate limiting.
    #[error("rate limited by tenant {tenant}")]
    RateLimited { tenant: String },

    /// Network failure or provider outage.
    #[error("tenant {tenant} unavailable: {reason}")]
    Unavailable { tenant: String, reason: String },

    /// Internal error.
    #[error("internal provider error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ProviderError {
    /// Whether a retry at the adapter level could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Unavailable { .. })
    }
}
