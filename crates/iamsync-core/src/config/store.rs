//! YAML template store.
//!
//! Loads templates from a directory tree and writes lifecycle fields back
//! after a run. Property edits are never written by the engine.

use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};

use super::ConfigError;
use crate::template::{ManagementMode, Template};

/// File-backed template store rooted at a directory.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    root: PathBuf,
}

impl TemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load every `*.yaml` / `*.yml` file under the root, in path order.
    ///
    /// Each file gets its own result so one unreadable template does not
    /// hide the rest. Only a failure to walk the directory is fatal.
    pub fn load_all(&self) -> Result<Vec<Result<Template, ConfigError>>, ConfigError> {
        let mut paths = Vec::new();
        collect_yaml_files(&self.root, &mut paths)?;
        paths.sort();
        Ok(paths.iter().map(Self::load_file).collect())
    }

    /// Load one template; its storage location becomes the file path.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Template, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let template = Template::from_yaml(&content).map_err(|source| ConfigError::Template {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(template.with_storage_location(path.to_string_lossy()))
    }

    /// Persist `expires_at`, `deleted`, `force_delete`, `management_mode` and
    /// member `deleted` flags, leaving everything else in the file untouched.
    pub fn write_lifecycle(template: &Template) -> Result<(), ConfigError> {
        let path = Path::new(&template.storage_location);
        let content = fs::read_to_string(path)?;
        let mut doc: Value = serde_yaml::from_str(&content)?;

        let Some(map) = doc.as_mapping_mut() else {
            return Err(ConfigError::Config(format!(
                "{} is not a YAML mapping",
                path.display()
            )));
        };

        match template.expires_at {
            Some(at) => {
                map.insert(key("expires_at"), Value::String(at.to_rfc3339()));
            }
            None => {
                map.remove("expires_at");
            }
        }
        set_flag(map, "deleted", template.deleted);
        set_flag(map, "force_delete", template.force_delete);
        match template.management_mode {
            ManagementMode::Undefined => {
                map.remove("management_mode");
            }
            mode => {
                map.insert(key("management_mode"), serde_yaml::to_value(mode)?);
            }
        }

        if let Some(members) = template.properties.members() {
            let entries = map
                .get_mut("properties")
                .and_then(|p| p.get_mut("members"))
                .and_then(Value::as_sequence_mut);
            for entry in entries.into_iter().flatten() {
                let Some(entry) = entry.as_mapping_mut() else {
                    continue;
                };
                let username = entry.get("username").and_then(Value::as_str);
                let member = username.and_then(|u| members.iter().find(|m| m.username == u));
                if let Some(deleted) = member.map(|m| m.deleted) {
                    set_flag(entry, "deleted", deleted);
                }
            }
        }

        fs::write(path, serde_yaml::to_string(&doc)?)?;
        Ok(())
    }

    /// Remove the persisted record after a hard delete.
    pub fn remove(template: &Template) -> Result<(), ConfigError> {
        fs::remove_file(&template.storage_location)?;
        Ok(())
    }
}

fn key(name: &str) -> Value {
    Value::String(name.to_string())
}

fn set_flag(map: &mut Mapping, name: &str, value: bool) {
    if value {
        map.insert(key(name), Value::Bool(true));
    } else {
        map.remove(name);
    }
}

fn collect_yaml_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ConfigError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_yaml_files(&path, out)?;
        } else if path
            .extension()
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(false)
        {
            out.push(path);
        }
    }
    Ok(())
}
