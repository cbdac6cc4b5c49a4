//! Ferry CLI - move a GitLab issue tracker to GitHub.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Ferry - GitLab to GitHub issue migration
#[derive(Parser, Debug)]
#[command(name = "ferry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy milestones, labels, issues and comments
    Migrate(MigrateArgs),

    /// Show version information
    Version,
}

#[derive(clap::Args, Debug, Clone)]
pub struct MigrateArgs {
    /// Source project ID or path (e.g. `group/project`)
    #[arg(long)]
    pub source_project: String,

    /// Destination repository (`owner/repo`)
    #[arg(long)]
    pub destination_repo: String,

    /// Skip the labels phase
    #[arg(long)]
    pub no_labels: bool,

    /// Re-edit issue bodies whose references were forward references
    #[arg(long)]
    pub relink: bool,

    /// Do not copy tracker-generated notes
    #[arg(long)]
    pub skip_system_notes: bool,

    /// Configuration file (default: ./ferry.toml if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the full report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("ferry={log_level},ferry_migrate={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match cli.command {
        Commands::Migrate(args) => commands::migrate(&args),
        Commands::Version => {
            println!(
                "ferry {} (engine {})",
                env!("CARGO_PKG_VERSION"),
                ferry_migrate::VERSION
            );
            Ok(true)
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
