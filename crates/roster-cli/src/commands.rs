use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::{ColoredString, Colorize};
use roster_sync::{AbortedPass, InMemoryGateway, PassState, RunReport, SyncConfig, SyncOrchestrator};
use roster_types::OperationKind;
use tracing::warn;

use crate::cli::*;
use crate::snapshot_file::SnapshotFile;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Plan(args) => cmd_plan(args, &cli.format).await,
        Command::Sync(args) => cmd_sync(args, &cli.format).await,
        Command::Config(args) => cmd_config(args, &cli.format),
    }
}

async fn cmd_plan(args: PassArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    config.apply.dry_run = true;
    let (outcome, _) = run_pass(&args, config).await?;
    conclude(outcome, format)
}

async fn cmd_sync(args: SyncArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let mut config = load_config(args.pass.config.as_deref())?;
    config.apply.dry_run |= args.dry_run;
    let dry_run = config.apply.dry_run;

    let (outcome, gateway) = run_pass(&args.pass, config).await?;
    if let (Some(output), false) = (&args.output, dry_run) {
        SnapshotFile::from_gateway(&gateway).save(output)?;
        println!("Platform state written to {}", output.display().to_string().bold());
    }
    conclude(outcome, format)
}

fn cmd_config(args: ConfigArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    match format {
        OutputFormat::Text => print!("{}", config.to_toml()?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SyncConfig> {
    match path {
        Some(path) => SyncConfig::load(path).with_context(|| format!("loading config {}", path.display())),
        None => Ok(SyncConfig::default()),
    }
}

/// Run one pass against file-backed systems. The returned gateway holds the
/// platform state after the pass.
async fn run_pass(
    args: &PassArgs,
    config: SyncConfig,
) -> anyhow::Result<(Result<RunReport, AbortedPass>, Arc<InMemoryGateway>)> {
    let source = SnapshotFile::load(&args.source)?.into_feed();
    let gateway = Arc::new(SnapshotFile::load(&args.target)?.into_gateway());

    let mut orchestrator = SyncOrchestrator::new(Arc::new(source), gateway.clone(), config);
    if let Some(as_of) = args.as_of {
        orchestrator = orchestrator.with_as_of(as_of);
    }

    let cancel = orchestrator.cancellation();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling pass");
            cancel.cancel();
        }
    });
    let outcome = orchestrator.run().await;
    interrupt.abort();

    Ok((outcome, gateway))
}

fn conclude(outcome: Result<RunReport, AbortedPass>, format: &OutputFormat) -> anyhow::Result<()> {
    match outcome {
        Ok(report) => print_report(&report, format),
        Err(aborted) => {
            print_report(&aborted.report, format)?;
            Err(aborted.error).context("pass ended early")
        }
    }
}

fn print_report(report: &RunReport, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => print_text(report),
    }
    Ok(())
}

fn print_text(report: &RunReport) {
    let state = if report.state == PassState::Complete {
        report.state.as_str().green().bold()
    } else {
        report.state.as_str().red().bold()
    };
    let mode = if report.dry_run { " (dry run)" } else { "" };
    println!("Run {} {}{}", report.run_id.to_string().dimmed(), state, mode);

    if !report.planned.is_empty() {
        println!("\n{}", "Plan:".bold());
        for (i, op) in report.planned.iter().enumerate() {
            println!("  {:>4}  {} {}", i + 1, action_label(op.kind), op.key());
        }
    }

    if !report.kinds.is_empty() {
        println!(
            "\n  {:<12}{:>9}{:>9}{:>9}{:>13}{:>9}{:>9}",
            "kind", "planned", "created", "updated", "deactivated", "skipped", "failed"
        );
        for (kind, c) in &report.kinds {
            println!(
                "  {:<12}{:>9}{:>9}{:>9}{:>13}{:>9}{:>9}",
                kind.as_str(),
                c.planned,
                c.created,
                c.updated,
                c.deactivated,
                c.skipped,
                c.failed
            );
        }
    }

    if !report.failures.is_empty() {
        println!("\n{}", "Failures:".red().bold());
        for failure in &report.failures {
            println!("  {} {}", failure.identity.yellow(), failure.cause);
        }
    }

    if !report.skipped.is_empty() {
        println!("\n{}", "Skipped:".yellow().bold());
        for skipped in &report.skipped {
            println!(
                "  {} {} ({})",
                skipped.identity.yellow(),
                skipped.operation.as_str(),
                skipped.reason
            );
        }
    }
}

fn action_label(kind: OperationKind) -> ColoredString {
    let label = format!("{:<10}", kind.as_str());
    match kind {
        OperationKind::Create => label.green(),
        OperationKind::Update => label.yellow(),
        OperationKind::Deactivate => label.red(),
    }
}
