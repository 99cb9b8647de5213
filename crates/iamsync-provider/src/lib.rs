//! # iamsync-provider
//!
//! The boundary between the reconciler and identity-provider tenants.
//!
//! Each resource kind has an adapter trait ([`GroupAdapter`], [`UserAdapter`])
//! exposing the same capability set: fetch, create, one update per mutable
//! field, delete. [`Providers`] is the dispatch table the runtime consults by
//! template type. [`InMemoryProvider`] implements every adapter against
//! in-process state. [`import`] turns live state back into templates.

pub mod adapter;
pub mod error;
pub mod import;
pub mod memory;

pub use adapter::{GroupAdapter, GroupState, Providers, UserAdapter, UserState};
pub use error::ProviderError;
pub use import::{group_template, user_template};
pub use memory::{InMemoryProvider, ProviderCall, ProviderOperation, ProviderSnapshot, TenantSnapshot};

use std::sync::Arc;

impl Providers {
    /// Route every resource kind to one in-memory provider.
    pub fn in_memory(provider: Arc<InMemoryProvider>) -> Self {
        Self::new(provider.clone(), provider)
    }
}
