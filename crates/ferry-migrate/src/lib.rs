//! # Ferry Migration Engine
//!
//! This crate copies the issue tracker of a GitLab project into a GitHub
//! repository: milestones, labels, issues and their comments, with
//! cross-links rewritten so they still point at the right things.
//!
//! ## Features
//!
//! - **Idempotent milestones and labels**: matched against what the destination already has
//! - **Cross-link rewriting**: `#12` follows the issue to its new number, `!34` becomes a citation
//! - **Provenance**: every issue links back to its source and carries a provenance label
//! - **Manual-action report**: attachments and links into the source are flagged for follow-up
//! - **Progress Tracking**: phase-by-phase progress reporting
//!
//! ## Example
//!
//! ```rust,ignore
//! use ferry_migrate::{GitHubClient, GitLabClient, MigrationConfig, MigrationOptions, Migrator};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = GitLabClient::new("https://gitlab.com", "glpat_xxx", Duration::from_secs(30))?;
//!     let destination = GitHubClient::new(ferry_migrate::github::DEFAULT_API_URL, "ghp_xxx", Duration::from_secs(30))?;
//!
//!     let config = MigrationConfig::new("group/project", "owner/repo");
//!     let options = MigrationOptions::default()
//!         .with_user_mapping("jdoe", "john-doe")
//!         .with_relink(true);
//!
//!     let report = Migrator::new(source, destination, config, options).migrate().await?;
//!
//!     report.print_summary();
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod github;
pub mod gitlab;
pub mod mapper;
pub mod migrator;
pub mod progress;
pub mod rewrite;
pub mod types;

// Re-export main types
pub use client::{DestinationClient, ErrorPayload, SourceClient, WriteOutcome};
pub use config::FerryConfig;
pub use error::{MigrationError, Result};
pub use github::GitHubClient;
pub use gitlab::GitLabClient;
pub use mapper::{EntityMapper, IdMap};
pub use migrator::Migrator;
pub use progress::{ConsoleProgressReporter, MigrationPhase, MigrationProgress, ProgressCallback};
pub use rewrite::{CrossLinkRewriter, UnresolvedReference};
pub use types::*;

/// Version of the migration engine.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
