//! CLI command implementations.

pub mod import;
pub mod reconcile;
pub mod summary;
