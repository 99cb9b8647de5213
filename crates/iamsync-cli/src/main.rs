use clap::{Parser, Subcommand};
use iamsync_core::ExecutionContext;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "iamsync", version, about = "Reconcile IAM templates against identity-provider tenants")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, env = "IAMSYNC_CONFIG", default_value = "iamsync.yaml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect drift between templates and tenants without changing anything.
    Plan {
        /// Where to write the change report (defaults to `proposed_changes_path`)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Apply templates to every targeted tenant and write lifecycle fields back.
    Apply {
        /// Where to write the change report (defaults to `proposed_changes_path`)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write templates for live resources that no template manages yet.
    Import,

    /// Summarize a previously written change report.
    Summary {
        /// Report to read (defaults to `proposed_changes_path`)
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Print the summary as JSON
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Exit non-zero when the report proposes any change or carries exceptions
        #[arg(long, default_value_t = false)]
        check: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Plan { output } => {
            commands::reconcile::run(&cli.config, ExecutionContext::detect(), output.as_deref())
                .await?
        }
        Command::Apply { output } => {
            commands::reconcile::run(&cli.config, ExecutionContext::enact(), output.as_deref())
                .await?
        }
        Command::Import => commands::import::run(&cli.config)?,
        Command::Summary {
            report,
            json,
            check,
        } => commands::summary::run(&cli.config, report.as_deref(), json, check)?,
    }

    Ok(())
}
