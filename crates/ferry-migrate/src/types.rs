//! Common types for migration operations.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{MigrationError, Result};

/// Name of the label attached to every migrated issue unless overridden.
pub const DEFAULT_PROVENANCE_LABEL: &str = "originally gitlab";

/// Where to migrate from and to.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Source project identifier (numeric ID or `group/subgroup/project`).
    pub source_project: String,

    /// Destination repository (`owner/repo`).
    pub destination_repo: String,
}

impl MigrationConfig {
    /// Create a new migration configuration.
    pub fn new(source_project: impl Into<String>, destination_repo: impl Into<String>) -> Self {
        Self {
            source_project: source_project.into(),
            destination_repo: destination_repo.into(),
        }
    }

    /// Split the destination into owner and repository name.
    pub fn destination_parts(&self) -> Result<(&str, &str)> {
        match self.destination_repo.split('/').collect::<Vec<_>>().as_slice() {
            [owner, repo] if !owner.is_empty() && !repo.is_empty() => Ok((*owner, *repo)),
            _ => Err(MigrationError::InvalidConfig(format!(
                "Invalid repository format: {}. Expected 'owner/repo'",
                self.destination_repo
            ))),
        }
    }
}

/// Label attached to migrated issues to mark where they came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceLabel {
    pub name: String,
    pub color: String,
    pub description: Option<String>,
}

impl Default for ProvenanceLabel {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROVENANCE_LABEL.to_string(),
            color: "ddd".to_string(),
            description: Some(
                "For items that were originally created on gitlab and imported over".to_string(),
            ),
        }
    }
}

/// Options for controlling what gets migrated.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Run the labels phase.
    pub migrate_labels: bool,

    /// Re-edit issue bodies whose issue references could not be resolved
    /// when they were first created.
    pub relink_forward_references: bool,

    /// Skip tracker-generated notes ("changed milestone to ...").
    pub skip_system_notes: bool,

    /// Short name of the source used in linkbacks and citations.
    pub source_name: String,

    /// Label attached to every migrated issue, if any.
    pub provenance_label: Option<ProvenanceLabel>,

    /// Map of source usernames to destination usernames.
    pub user_mapping: HashMap<String, String>,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            migrate_labels: true,
            relink_forward_references: false,
            skip_system_notes: false,
            source_name: "gitlab".to_string(),
            provenance_label: Some(ProvenanceLabel::default()),
            user_mapping: HashMap::new(),
        }
    }
}

impl MigrationOptions {
    /// Enable or disable the labels phase.
    pub fn with_labels(mut self, migrate: bool) -> Self {
        self.migrate_labels = migrate;
        self
    }

    /// Enable or disable the deferred relink pass.
    pub fn with_relink(mut self, relink: bool) -> Self {
        self.relink_forward_references = relink;
        self
    }

    /// Enable or disable skipping of system notes.
    pub fn with_skip_system_notes(mut self, skip: bool) -> Self {
        self.skip_system_notes = skip;
        self
    }

    /// Set the source name used in linkbacks.
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    /// Set or clear the provenance label.
    pub fn with_provenance_label(mut self, label: Option<ProvenanceLabel>) -> Self {
        self.provenance_label = label;
        self
    }

    /// Add a user mapping.
    pub fn with_user_mapping(
        mut self,
        source_user: impl Into<String>,
        destination_user: impl Into<String>,
    ) -> Self {
        self.user_mapping
            .insert(source_user.into(), destination_user.into());
        self
    }

    /// Translate a source username. Unmapped users resolve to `None`.
    pub fn map_user(&self, source_user: &str) -> Option<&str> {
        self.user_mapping.get(source_user).map(String::as_str)
    }
}

/// Lifecycle state shared by issues and destination milestones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    #[serde(alias = "opened", alias = "reopened")]
    Open,
    Closed,
}

/// Source milestone state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneState {
    Active,
    Closed,
}

impl From<MilestoneState> for IssueState {
    fn from(state: MilestoneState) -> Self {
        match state {
            MilestoneState::Active => Self::Open,
            MilestoneState::Closed => Self::Closed,
        }
    }
}

/// A milestone as read from the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMilestone {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    pub state: MilestoneState,
    pub due_date: Option<NaiveDate>,
}

/// A label as read from the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLabel {
    pub name: String,
    pub color: String,
    pub description: Option<String>,
}

/// A source user reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUser {
    pub username: String,
    pub name: String,
}

/// An issue as read from the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceIssue {
    /// Instance-wide identifier.
    pub id: u64,
    /// Project-local number; what `#<n>` references point at.
    pub iid: u64,
    pub title: String,
    pub description: Option<String>,
    pub state: IssueState,
    pub labels: Vec<String>,
    pub assignee: Option<SourceUser>,
    pub milestone_id: Option<u64>,
    pub web_url: String,
}

/// A note (comment) as read from the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceNote {
    pub id: u64,
    pub body: String,
    pub author: SourceUser,
    pub created_at: DateTime<Utc>,
    /// Generated by the tracker rather than written by a person.
    pub system: bool,
    pub attachment: Option<String>,
}

/// Link target for a source merge request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequestRef {
    pub iid: u64,
    pub web_url: String,
}

/// Why a migrated item needs a human to look at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManualActionKind {
    /// The note carries an attachment that was not transferred.
    Attachment { reference: String },
    /// The note links into the source instance.
    InternalLinks { urls: Vec<String> },
}

/// A structured advisory for follow-up by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualAction {
    #[serde(flatten)]
    pub kind: ManualActionKind,
    /// Location of the original note.
    pub source: String,
    /// Location of the migrated comment.
    pub destination: String,
}

impl std::fmt::Display for ManualAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ManualActionKind::Attachment { reference } => write!(
                f,
                "copy attachment {reference} from {} to {}",
                self.source, self.destination
            ),
            ManualActionKind::InternalLinks { urls } => write!(
                f,
                "links into the source instance at {} need updating at {}: {}",
                self.source,
                self.destination,
                urls.join(", ")
            ),
        }
    }
}

/// Where a source note ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentMapping {
    pub source_issue_id: u64,
    pub source_note_id: u64,
    pub destination_issue: u64,
    pub destination_comment_id: u64,
}

/// Report of a completed (or aborted) migration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Milestones created on the destination.
    pub milestones_created: usize,

    /// Milestones matched by title to an existing destination milestone.
    pub milestones_reused: usize,

    /// Labels created on the destination.
    pub labels_created: usize,

    /// Labels whose color or description was edited.
    pub labels_updated: usize,

    /// Labels already identical on the destination.
    pub labels_unchanged: usize,

    /// Issues created on the destination.
    pub issues_migrated: usize,

    /// Issues closed after their comments were copied.
    pub issues_closed: usize,

    /// Issue bodies re-edited by the deferred relink pass.
    pub issues_relinked: usize,

    /// Comments created on the destination.
    pub comments_migrated: usize,

    /// System notes skipped.
    pub comments_skipped: usize,

    /// Source milestone ID to destination milestone number.
    pub milestone_map: BTreeMap<u64, u64>,

    /// Source issue number to destination issue number.
    pub issue_map: BTreeMap<u64, u64>,

    /// Where each copied note ended up.
    pub comment_map: Vec<CommentMapping>,

    /// Items needing manual follow-up.
    pub manual_actions: Vec<ManualAction>,

    /// Errors encountered during migration.
    pub errors: Vec<MigrationErrorInfo>,

    /// Warnings generated during migration.
    pub warnings: Vec<String>,

    /// Start time of migration.
    pub started_at: Option<DateTime<Utc>>,

    /// End time of migration.
    pub completed_at: Option<DateTime<Utc>>,
}

impl MigrationReport {
    /// Create a new empty report.
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Mark the migration as complete.
    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// Check if the migration ran to the end (no critical errors).
    pub fn is_successful(&self) -> bool {
        self.errors.iter().all(|e| !e.is_critical)
    }

    /// Number of items skipped because the destination rejected them.
    pub fn rejected_items(&self) -> usize {
        self.errors.iter().filter(|e| !e.is_critical).count()
    }

    /// Add an error to the report.
    pub fn add_error(&mut self, category: &str, message: &str, is_critical: bool) {
        self.errors.push(MigrationErrorInfo {
            category: category.to_string(),
            message: message.to_string(),
            is_critical,
        });
    }

    /// Add a warning to the report.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Get the duration of the migration.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Print a summary of the migration.
    pub fn print_summary(&self) {
        println!("\n=== Migration Summary ===\n");
        println!(
            "Milestones:         {} created, {} reused",
            self.milestones_created, self.milestones_reused
        );
        println!(
            "Labels:             {} created, {} updated, {} unchanged",
            self.labels_created, self.labels_updated, self.labels_unchanged
        );
        println!(
            "Issues:             {} migrated, {} closed, {} relinked",
            self.issues_migrated, self.issues_closed, self.issues_relinked
        );
        println!(
            "Comments:           {} migrated, {} skipped",
            self.comments_migrated, self.comments_skipped
        );

        if let Some(duration) = self.duration() {
            println!("\nCompleted in {} seconds", duration.num_seconds());
        }

        if !self.errors.is_empty() {
            println!("\nErrors ({}):", self.errors.len());
            for error in &self.errors {
                let severity = if error.is_critical {
                    "CRITICAL"
                } else {
                    "SKIPPED"
                };
                println!("  [{severity}] {}: {}", error.category, error.message);
            }
        }

        if !self.warnings.is_empty() {
            println!("\nWarnings ({}):", self.warnings.len());
            for warning in &self.warnings {
                println!("  - {warning}");
            }
        }

        if !self.manual_actions.is_empty() {
            println!("\nManual attention needed ({}):", self.manual_actions.len());
            for action in &self.manual_actions {
                println!("  - {action}");
            }
        }

        let status = if self.is_successful() {
            "SUCCESS"
        } else {
            "ABORTED"
        };
        println!("\nOverall Status: {status}");
    }
}

/// Information about an error that occurred during migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationErrorInfo {
    /// Category of the error (e.g., "issues", "milestones", "source").
    pub category: String,

    /// Error message.
    pub message: String,

    /// Whether this error aborted the run.
    pub is_critical: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_parts() {
        let config = MigrationConfig::new("group/project", "owner/repo");
        assert_eq!(config.destination_parts().unwrap(), ("owner", "repo"));

        for bad in ["owner", "owner/", "/repo", "a/b/c"] {
            let config = MigrationConfig::new("group/project", bad);
            assert!(matches!(
                config.destination_parts(),
                Err(MigrationError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_issue_state_accepts_gitlab_spelling() {
        let state: IssueState = serde_json::from_str("\"opened\"").unwrap();
        assert_eq!(state, IssueState::Open);
        assert_eq!(serde_json::to_string(&IssueState::Open).unwrap(), "\"open\"");
        assert_eq!(IssueState::from(MilestoneState::Active), IssueState::Open);
        assert_eq!(IssueState::from(MilestoneState::Closed), IssueState::Closed);
    }

    #[test]
    fn test_user_mapping_is_exact() {
        let options = MigrationOptions::default().with_user_mapping("jdoe", "john-doe");
        assert_eq!(options.map_user("jdoe"), Some("john-doe"));
        assert_eq!(options.map_user("JDOE"), None);
        assert_eq!(options.map_user("someone"), None);
    }

    #[test]
    fn test_report_success_ignores_rejections() {
        let mut report = MigrationReport::new();
        report.add_error("issues", "422 Validation Failed", false);
        assert!(report.is_successful());
        assert_eq!(report.rejected_items(), 1);

        report.add_error("source", "Authentication failed", true);
        assert!(!report.is_successful());
    }

    #[test]
    fn test_manual_action_display() {
        let action = ManualAction {
            kind: ManualActionKind::Attachment {
                reference: "/uploads/abc/log.txt".to_string(),
            },
            source: "https://gitlab.example/g/p/-/issues/1#note_7".to_string(),
            destination: "https://github.com/o/r/issues/1#issuecomment-9".to_string(),
        };
        let text = action.to_string();
        assert!(text.contains("/uploads/abc/log.txt"));
        assert!(text.contains("#note_7"));
        assert!(text.contains("#issuecomment-9"));
    }
}
