//! `iamsync summary`: count actions in a written change report.
//!
//! With `--check` the command fails when the report is not empty, which lets
//! CI block a merge until the planned changes have been applied.

use anyhow::{Context, Result};
use iamsync_core::{ActionSummary, IamsyncConfig, TemplateChangeReport};
use std::fs;
use std::path::Path;

pub fn run(config_path: &Path, report: Option<&Path>, json: bool, check: bool) -> Result<()> {
    let path = match report {
        Some(path) => path.to_path_buf(),
        None => {
            IamsyncConfig::load_with_context(config_path)
                .with_context(|| format!("failed to load config {}", config_path.display()))?
                .proposed_changes_path
        }
    };

    let reports = read_reports(&path)?;
    let summary = ActionSummary::from_reports(&reports);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, &reports);
    }

    if check && !summary.is_empty() {
        anyhow::bail!(
            "{} pending action(s) and {} exception(s) in {}",
            summary.num_actions(),
            summary.num_exceptions,
            path.display()
        );
    }
    Ok(())
}

fn read_reports(path: &Path) -> Result<Vec<TemplateChangeReport>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read report {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_yaml::from_str(&content).with_context(|| format!("failed to parse report {}", path.display()))
}

fn print_summary(summary: &ActionSummary, reports: &[TemplateChangeReport]) {
    if summary.is_empty() {
        println!("✓ No changes");
        return;
    }

    for report in reports {
        println!("{} ({})", report.resource_id, report.resource_type);
        for tenant in &report.tenant_changes {
            for change in &tenant.proposed_changes {
                match &change.field {
                    Some(field) => println!("  [{}] {:?} {}", tenant.tenant_id, change.change_type, field),
                    None => println!("  [{}] {:?}", tenant.tenant_id, change.change_type),
                }
            }
            for exception in &tenant.exceptions {
                println!("  [{}] ✗ {}: {}", tenant.tenant_id, exception.step, exception.message);
            }
        }
    }

    println!();
    println!("Templates:  {}", summary.num_templates);
    println!("Tenants:    {}", summary.num_tenants);
    println!("Create:     {}", summary.num_create_actions);
    println!("Update:     {}", summary.num_update_actions);
    println!("Delete:     {}", summary.num_delete_actions);
    println!("Exceptions: {}", summary.num_exceptions);
}
