//! Configuration types for iamsync.
//!
//! Loaded from `iamsync.yaml`:
//!
//! ```yaml
//! tenants:
//!   - name: development
//!   - name: production
//!     description: Customer-facing identity provider
//! templates_dir: resources
//! state_file: state/live.yaml
//! proposed_changes_path: proposed_changes.yaml
//! ```
//!
//! Relative paths are resolved against the directory containing the config file.

pub mod store;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use store::TemplateStore;

/// One identity-provider account templates are reconciled against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TenantConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Complete iamsync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IamsyncConfig {
    /// Configured tenants, in reconciliation order.
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,

    /// Directory holding template files.
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,

    /// Live-state snapshot seeding the in-memory provider.
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    /// Where the reviewable change report is written.
    #[serde(default = "default_proposed_changes_path")]
    pub proposed_changes_path: PathBuf,
}

impl Default for IamsyncConfig {
    fn default() -> Self {
        Self {
            tenants: Vec::new(),
            templates_dir: default_templates_dir(),
            state_file: None,
            proposed_changes_path: default_proposed_changes_path(),
        }
    }
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("resources")
}

fn default_proposed_changes_path() -> PathBuf {
    PathBuf::from("proposed_changes.yaml")
}

/// Error type for configuration and template loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid template {}", .path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IamsyncConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration and resolve relative paths against the file's directory.
    pub fn load_with_context(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = Self::from_file(path)?;

        let base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let resolve = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                base_dir.join(p)
            }
        };

        config.templates_dir = resolve(&config.templates_dir);
        config.proposed_changes_path = resolve(&config.proposed_changes_path);
        config.state_file = config.state_file.as_ref().map(resolve);

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::BTreeSet::new();
        for tenant in &self.tenants {
            if tenant.name.trim().is_empty() {
                return Err(ConfigError::Config("tenant name must not be empty".to_string()));
            }
            if !seen.insert(tenant.name.as_str()) {
                return Err(ConfigError::Config(format!(
                    "tenant '{}' is configured more than once",
                    tenant.name
                )));
            }
        }
        Ok(())
    }

    /// Get a tenant by name.
    pub fn tenant(&self, name: &str) -> Option<&TenantConfig> {
        self.tenants.iter().find(|t| t.name == name)
    }
}
