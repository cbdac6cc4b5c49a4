//! CLI command implementations.

use anyhow::{Context, Result};
use ferry_migrate::{
    ConsoleProgressReporter, FerryConfig, GitHubClient, GitLabClient, MigrationConfig,
    MigrationOptions, MigrationProgress, MigrationReport, Migrator,
};
use std::collections::BTreeMap;
use std::io::Write;

use crate::MigrateArgs;

/// Run a migration. Returns whether it ran to the end.
pub fn migrate(args: &MigrateArgs) -> Result<bool> {
    let config = FerryConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let options = options(&config, args);

    let source = GitLabClient::new(&config.source.url, &config.source.token, config.timeout())
        .context("Failed to create GitLab client")?;
    let destination = GitHubClient::new(
        &config.destination.api_url,
        &config.destination.token,
        config.timeout(),
    )
    .context("Failed to create GitHub client")?;

    tracing::info!(
        source = %args.source_project,
        destination = %args.destination_repo,
        "Migrating"
    );

    let reporter = ConsoleProgressReporter::new();
    let migrator = Migrator::new(
        source,
        destination,
        MigrationConfig::new(&args.source_project, &args.destination_repo),
        options,
    )
    .with_progress(MigrationProgress::with_callback(reporter.callback()));

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let report = runtime.block_on(migrator.migrate())?;
    reporter.finish(if report.is_successful() {
        "Migration complete"
    } else {
        "Migration aborted"
    });

    report.print_summary();
    print_issue_map(&mut std::io::stdout().lock(), &report)?;

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("\nReport written to {}", path.display());
    }

    Ok(report.is_successful())
}

fn options(config: &FerryConfig, args: &MigrateArgs) -> MigrationOptions {
    config
        .options()
        .with_labels(!args.no_labels)
        .with_relink(args.relink)
        .with_skip_system_notes(args.skip_system_notes)
}

/// Print the final source-to-destination issue table.
fn print_issue_map(out: &mut impl Write, report: &MigrationReport) -> Result<()> {
    writeln!(out, "\nIssue map ({} issues):", report.issue_map.len())?;
    for (source, destination) in &report.issue_map {
        writeln!(out, "  #{source} -> #{destination}")?;
    }

    let table: BTreeMap<String, u64> = report
        .issue_map
        .iter()
        .map(|(source, destination)| (source.to_string(), *destination))
        .collect();
    writeln!(out, "\n{}", serde_json::to_string(&table)?)?;
    Ok(())
}
