//! Execution context shared by every reconciliation call.

use serde::{Deserialize, Serialize};

use crate::template::ManagementMode;

/// Distinguishes a detect-only run from a run that enacts changes.
///
/// When `execute` is false no provider-mutating call may be issued; the
/// reconciler synthesizes the same [`ProposedChange`](crate::ProposedChange)
/// entries it would have recorded in apply mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execute: bool,
}

impl ExecutionContext {
    /// Detect drift only.
    pub fn detect() -> Self {
        Self { execute: false }
    }

    /// Enact changes against the providers.
    pub fn enact() -> Self {
        Self { execute: true }
    }

    pub fn mode(&self) -> ExecutionMode {
        if self.execute {
            ExecutionMode::Apply
        } else {
            ExecutionMode::Detect
        }
    }

    /// Context effective for a template with the given management mode.
    ///
    /// `None` for `IMPORT_ONLY`: such templates mirror live state and are
    /// neither diffed nor mutated, in either mode.
    pub fn for_management_mode(self, mode: ManagementMode) -> Option<Self> {
        match mode {
            ManagementMode::ImportOnly => None,
            ManagementMode::Undefined | ManagementMode::Enforced => Some(self),
        }
    }
}

/// Human-facing name of the run mode, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Detect,
    Apply,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Detect => write!(f, "detect"),
            Self::Apply => write!(f, "apply"),
        }
    }
}
