//! `iamsync plan` and `iamsync apply`.
//!
//! Loads the configuration and templates, runs the apply entry point, writes
//! the change report, and after an apply run persists lifecycle fields and
//! the provider state.

use anyhow::{Context, Result};
use iamsync_core::{
    ActionSummary, ExecutionContext, IamsyncConfig, Template, TemplateChangeReport, TemplateStore,
};
use iamsync_provider::{InMemoryProvider, ProviderSnapshot, Providers};
use iamsync_runtime::{ApplyEngine, TemplateResult, record_removable};
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub async fn run(config_path: &Path, ctx: ExecutionContext, output: Option<&Path>) -> Result<()> {
    let config = IamsyncConfig::load_with_context(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;

    let store = TemplateStore::new(&config.templates_dir);
    let (mut templates, mut failures) = load_templates(&store)?;

    let provider = Arc::new(load_provider(&config)?);
    let engine = ApplyEngine::from_config(&config, Providers::in_memory(provider.clone()));

    let before: Vec<LifecycleFlags> = templates.iter().map(LifecycleFlags::of).collect();
    let results = engine.apply(&mut templates, ctx).await;

    let output = output.unwrap_or(config.proposed_changes_path.as_path());
    let batch = templates
        .iter()
        .zip(&before)
        .zip(results)
        .map(|((template, flags), result)| (template, flags, result))
        .collect();
    let outcome = persist_run(&config, &provider, ctx, output, batch)?;
    failures.extend(outcome.failures);

    let summary = ActionSummary::from_reports(&outcome.reports);
    println!(
        "{} ({}): {} template(s), {} tenant(s), {} create, {} update, {} delete, {} exception(s)",
        if ctx.execute { "Applied" } else { "Planned" },
        ctx.mode(),
        summary.num_templates,
        summary.num_tenants,
        summary.num_create_actions,
        summary.num_update_actions,
        summary.num_delete_actions,
        summary.num_exceptions,
    );
    println!("Report written to {}", output.display());

    for e in &failures {
        eprintln!("✗ {:#}", e);
    }
    if !failures.is_empty() {
        anyhow::bail!("{} template(s) failed", failures.len());
    }
    Ok(())
}

/// Load every template under the store root.
///
/// Files that fail to load are returned as errors next to the templates that
/// did, so the rest of the batch still runs.
pub(crate) fn load_templates(store: &TemplateStore) -> Result<(Vec<Template>, Vec<anyhow::Error>)> {
    let loaded = store
        .load_all()
        .with_context(|| format!("failed to load templates from {}", store.root().display()))?;
    if loaded.is_empty() {
        tracing::warn!(templates_dir = %store.root().display(), "No templates found");
    }

    let mut templates = Vec::new();
    let mut failures = Vec::new();
    for result in loaded {
        match result {
            Ok(template) => templates.push(template),
            Err(e) => {
                tracing::error!(error = %e, "Skipping template that failed to load");
                failures.push(anyhow::Error::new(e));
            }
        }
    }
    Ok((templates, failures))
}

/// What a finished run left behind.
struct RunOutcome {
    /// Non-empty reports, in template order.
    reports: Vec<TemplateChangeReport>,
    failures: Vec<anyhow::Error>,
}

/// Persist the results of a run.
///
/// The report and, after an apply run, the provider state are written first.
/// Template files are touched only once the provider state is saved, and a
/// failed write-back is collected rather than ending the loop.
fn persist_run(
    config: &IamsyncConfig,
    provider: &InMemoryProvider,
    ctx: ExecutionContext,
    output: &Path,
    batch: Vec<(&Template, &LifecycleFlags, TemplateResult)>,
) -> Result<RunOutcome> {
    let mut reports = Vec::new();
    let mut failures = Vec::new();
    let mut write_backs = Vec::new();
    for (template, before, result) in batch {
        match result {
            Ok(report) => {
                if ctx.execute {
                    write_backs.push((template, before, record_removable(template, &report, ctx)));
                }
                if !report.is_empty() {
                    reports.push(report);
                }
            }
            Err(e) => failures.push(anyhow::Error::new(e)),
        }
    }

    write_report(output, &reports)?;
    if ctx.execute {
        save_provider(config, provider)?;
    }

    for (template, before, removable) in write_backs {
        if let Err(e) = persist_lifecycle(template, before, removable) {
            tracing::error!(
                storage_location = %template.storage_location,
                error = %e,
                "Failed to write back template"
            );
            failures.push(e);
        }
    }

    Ok(RunOutcome { reports, failures })
}

/// Seed the in-memory provider from the configured state file, if any.
pub(crate) fn load_provider(config: &IamsyncConfig) -> Result<InMemoryProvider> {
    tracing::warn!("Using the in-memory provider; no external identity provider is contacted");

    let Some(path) = config.state_file.as_deref() else {
        return Ok(InMemoryProvider::new());
    };
    if !path.exists() {
        tracing::info!(state_file = %path.display(), "State file not found, starting empty");
        return Ok(InMemoryProvider::new());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read state file {}", path.display()))?;
    let snapshot = ProviderSnapshot::from_yaml(&content)
        .with_context(|| format!("failed to parse state file {}", path.display()))?;
    Ok(InMemoryProvider::from_snapshot(snapshot))
}

fn save_provider(config: &IamsyncConfig, provider: &InMemoryProvider) -> Result<()> {
    let Some(path) = config.state_file.as_deref() else {
        return Ok(());
    };
    let snapshot = provider.snapshot()?;
    write_file(path, &snapshot.to_yaml()?)
        .with_context(|| format!("failed to write state file {}", path.display()))
}

pub(crate) fn write_report(path: &Path, reports: &[TemplateChangeReport]) -> Result<()> {
    let content = serde_yaml::to_string(reports)?;
    write_file(path, &content).with_context(|| format!("failed to write report {}", path.display()))
}

pub(crate) fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

/// Lifecycle fields the engine may derive during a run.
#[derive(Debug, PartialEq, Eq)]
struct LifecycleFlags {
    deleted: bool,
    members_deleted: Vec<bool>,
}

impl LifecycleFlags {
    fn of(template: &Template) -> Self {
        Self {
            deleted: template.deleted,
            members_deleted: template
                .properties
                .members()
                .map(|m| m.iter().map(|m| m.deleted).collect())
                .unwrap_or_default(),
        }
    }
}

fn persist_lifecycle(template: &Template, before: &LifecycleFlags, removable: bool) -> Result<()> {
    if removable {
        tracing::info!(
            storage_location = %template.storage_location,
            "Removing template of deleted resource"
        );
        TemplateStore::remove(template)
            .with_context(|| format!("failed to remove {}", template.storage_location))?;
    } else if LifecycleFlags::of(template) != *before {
        tracing::debug!(storage_location = %template.storage_location, "Writing lifecycle fields");
        TemplateStore::write_lifecycle(template)
            .with_context(|| format!("failed to update {}", template.storage_location))?;
    }
    Ok(())
}
