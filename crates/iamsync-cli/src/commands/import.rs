//! `iamsync import`: write templates for live resources no template covers yet.

use anyhow::{Context, Result};
use iamsync_core::{IamsyncConfig, Template, TemplateStore, TenantConfig};
use iamsync_provider::{group_template, user_template};
use std::collections::HashSet;
use std::path::Path;

use super::reconcile::{load_provider, load_templates, write_file};

/// Tenant, resource type and resource id of one managed resource.
type ResourceKey = (String, &'static str, String);

pub fn run(config_path: &Path) -> Result<()> {
    let config = IamsyncConfig::load_with_context(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;

    let store = TemplateStore::new(&config.templates_dir);
    let (templates, failures) = load_templates(&store)?;
    if !failures.is_empty() {
        // An unreadable template may already cover a live resource.
        for e in &failures {
            eprintln!("✗ {:#}", e);
        }
        anyhow::bail!("{} template(s) failed to load; nothing imported", failures.len());
    }

    let snapshot = load_provider(&config)?.snapshot()?;
    let known = templated(&templates, &config.tenants);

    let mut imported = 0;
    for tenant in &config.tenants {
        let Some(live) = snapshot.tenants.get(&tenant.name) else {
            continue;
        };
        let generated = live
            .groups
            .iter()
            .map(|g| group_template(g, tenant))
            .chain(live.users.iter().map(|u| user_template(u, tenant)));

        for template in generated {
            let key = (tenant.name.clone(), template.resource_type(), template.resource_id());
            if known.contains(&key) {
                continue;
            }
            let path = store.root().join(&template.storage_location);
            if path.exists() {
                tracing::warn!(path = %path.display(), "Template file already exists, skipping");
                continue;
            }

            write_file(&path, &template.to_yaml()?)
                .with_context(|| format!("failed to write template {}", path.display()))?;
            tracing::info!(
                tenant = %tenant.name,
                resource_id = %template.resource_id(),
                resource_type = template.resource_type(),
                path = %path.display(),
                "Imported resource"
            );
            imported += 1;
        }
    }

    println!("Imported {} resource(s) into {}", imported, store.root().display());
    Ok(())
}

/// Resources the existing templates already manage, per target tenant.
fn templated(templates: &[Template], tenants: &[TenantConfig]) -> HashSet<ResourceKey> {
    let mut known = HashSet::new();
    for template in templates {
        let names: Vec<String> = match template.target_tenants(tenants) {
            Ok(targets) => targets.into_iter().map(|t| t.name.clone()).collect(),
            Err(_) => vec![template.properties.tenant_id().to_string()],
        };
        for name in names {
            known.insert((name, template.resource_type(), template.resource_id()));
        }
    }
    known
}
