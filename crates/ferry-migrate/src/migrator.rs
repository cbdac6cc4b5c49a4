//! Migration orchestrator.
//!
//! Phases run strictly in order (milestones, labels, issues, comments) and
//! items within a phase run one at a time, because each phase reads the
//! tables the previous one filled. Any `Err` from a client ends the run;
//! rejected items are recorded and skipped.
//!
//! Milestones and labels are matched against what the destination already
//! has, so re-running after a failure does not duplicate them. Issues and
//! comments have no such safeguard: a re-run creates them again.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::client::{
    CommentResponse, CreateIssueRequest, CreateMilestoneRequest, DestinationClient,
    EditIssueRequest, LabelRequest, LabelResponse, SourceClient, WriteOutcome,
};
use crate::error::Result;
use crate::mapper::{find_existing, same_label, same_title, EntityMapper};
use crate::progress::{MigrationPhase, MigrationProgress};
use crate::rewrite::{CrossLinkRewriter, ReferenceKind, RewriteContext, Rewritten, UnresolvedReference};
use crate::types::{
    CommentMapping, IssueState, ManualAction, ManualActionKind, MigrationConfig,
    MigrationOptions, MigrationReport, SourceIssue, SourceMilestone, SourceNote,
};

static ABSOLUTE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>()\[\]"']+"#).expect("Invalid regex"));

static UPLOAD_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\]\((/uploads/[^)\s]+)\)").expect("Invalid regex"));

/// An issue that exists on the destination.
#[derive(Debug, Clone)]
struct MigratedIssue {
    source: SourceIssue,
    number: u64,
    html_url: String,
    body: String,
    forward_references: bool,
}

/// State owned by a single run.
struct Run {
    report: MigrationReport,
    mapper: EntityMapper,
    rewriter: CrossLinkRewriter,
    project_url: String,
    provenance_label: Option<String>,
    migrated: Vec<MigratedIssue>,
}

impl Run {
    async fn rewrite<S>(&mut self, source: &S, project: &str, text: &str) -> Result<Rewritten>
    where
        S: SourceClient + ?Sized,
    {
        let context = RewriteContext {
            source,
            project,
            project_url: &self.project_url,
            mapper: &self.mapper,
        };
        self.rewriter.rewrite(text, &context).await
    }

    fn note_unresolved(&mut self, location: &str, unresolved: &[UnresolvedReference]) {
        for reference in unresolved {
            warn!(%location, %reference, "Unresolved cross-link");
            self.report
                .add_warning(format!("{location}: unresolved reference {reference}"));
        }
    }

    fn note_conflict(&mut self, result: Result<()>) {
        if let Err(e) = result {
            warn!("{e}");
            self.report.add_warning(e.to_string());
        }
    }
}

/// Drives a migration from a source project to a destination repository.
pub struct Migrator<S, D> {
    source: S,
    destination: D,
    config: MigrationConfig,
    options: MigrationOptions,
    progress: MigrationProgress,
}

impl<S, D> Migrator<S, D>
where
    S: SourceClient,
    D: DestinationClient,
{
    /// Create a new migrator.
    pub fn new(source: S, destination: D, config: MigrationConfig, options: MigrationOptions) -> Self {
        Self {
            source,
            destination,
            config,
            options,
            progress: MigrationProgress::new(),
        }
    }

    /// Set a progress callback.
    pub fn with_progress(mut self, progress: MigrationProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Run the migration.
    ///
    /// Returns `Err` only for an unusable configuration. A fatal client error
    /// mid-run is recorded as a critical error in the returned report, which
    /// still carries every mapping made before the failure.
    pub async fn migrate(&self) -> Result<MigrationReport> {
        self.config.destination_parts()?;

        let mut run = Run {
            report: MigrationReport::new(),
            mapper: EntityMapper::new(),
            rewriter: CrossLinkRewriter::new(self.options.source_name.clone()),
            project_url: String::new(),
            provenance_label: None,
            migrated: Vec::new(),
        };

        info!(
            source = %self.config.source_project,
            destination = %self.config.destination_repo,
            "Starting migration"
        );

        if let Err(e) = self.run_phases(&mut run).await {
            let phase = self.progress.current_phase();
            error!(%phase, error = %e, "Migration aborted");
            run.report.add_error(phase_category(phase), &e.to_string(), true);
        } else {
            self.progress.set_phase(MigrationPhase::Complete, 1);
        }

        let mut report = run.report;
        report.milestone_map = run.mapper.milestones().to_map();
        report.issue_map = run.mapper.issues().to_map();
        report.comment_map = run.mapper.comments().to_vec();
        report.complete();

        Ok(report)
    }

    async fn run_phases(&self, run: &mut Run) -> Result<()> {
        self.prepare(run).await?;
        self.copy_milestones(run).await?;

        if self.options.migrate_labels {
            self.copy_labels(run).await?;
        } else {
            info!("Skipping labels");
        }

        let issues = self.copy_issues(run).await?;
        info!("Migrated {} of {issues} issues", run.report.issues_migrated);

        if self.options.relink_forward_references {
            self.relink_issues(run).await?;
        }

        self.copy_comments(run).await
    }

    fn project(&self) -> &str {
        &self.config.source_project
    }

    fn repo(&self) -> &str {
        &self.config.destination_repo
    }

    async fn prepare(&self, run: &mut Run) -> Result<()> {
        self.progress.set_phase(MigrationPhase::Initializing, 1);
        self.progress.message("Fetching project information...");

        run.project_url = self.source.project_url(self.project()).await?;
        debug!(project_url = %run.project_url, "Source project found");

        let Some(label) = &self.options.provenance_label else {
            return Ok(());
        };

        let existing = self.destination.list_labels(self.repo()).await?;
        if let Some(found) = find_existing(&existing, same_label(&label.name)) {
            run.provenance_label = Some(found.name.clone());
            return Ok(());
        }

        let request = LabelRequest {
            name: label.name.clone(),
            color: normalize_color(&label.color),
            description: label.description.clone(),
        };
        match self.destination.create_label(self.repo(), &request).await? {
            WriteOutcome::Created(created) => {
                info!(label = %created.name, "Created provenance label");
                run.provenance_label = Some(created.name);
            }
            WriteOutcome::Rejected(payload) => {
                warn!(label = %label.name, error = %payload, "Destination rejected provenance label");
                run.report
                    .add_error("labels", &format!("{}: {payload}", label.name), false);
            }
        }
        Ok(())
    }

    async fn copy_milestones(&self, run: &mut Run) -> Result<()> {
        let milestones = self.source.list_milestones(self.project()).await?;
        self.progress
            .set_phase(MigrationPhase::MigratingMilestones, milestones.len() as u64);

        let mut existing = self.destination.list_milestones(self.repo()).await?;

        for milestone in &milestones {
            let number = match find_existing(&existing, same_title(&milestone.title)) {
                Some(found) => {
                    debug!(title = %milestone.title, number = found.number, "Reusing milestone");
                    run.report.milestones_reused += 1;
                    found.number
                }
                None => {
                    let request = milestone_request(milestone);
                    match self.destination.create_milestone(self.repo(), &request).await? {
                        WriteOutcome::Created(created) => {
                            run.report.milestones_created += 1;
                            let number = created.number;
                            existing.push(created);
                            number
                        }
                        WriteOutcome::Rejected(payload) => {
                            warn!(title = %milestone.title, error = %payload, "Destination rejected milestone");
                            run.report.add_error(
                                "milestones",
                                &format!("{}: {payload}", milestone.title),
                                false,
                            );
                            self.progress.increment(Some(&milestone.title));
                            continue;
                        }
                    }
                }
            };

            let registered = run.mapper.register_milestone(milestone.id, number);
            run.note_conflict(registered);
            self.progress.increment(Some(&milestone.title));
        }

        info!(
            created = run.report.milestones_created,
            reused = run.report.milestones_reused,
            "Milestones copied"
        );
        Ok(())
    }

    async fn copy_labels(&self, run: &mut Run) -> Result<()> {
        let labels = self.source.list_labels(self.project()).await?;
        self.progress
            .set_phase(MigrationPhase::MigratingLabels, labels.len() as u64);

        let mut existing = self.destination.list_labels(self.repo()).await?;

        for label in &labels {
            info!(label = %label.name, "Checking label");
            let request = LabelRequest {
                name: label.name.clone(),
                color: normalize_color(&label.color),
                description: label.description.clone().filter(|d| !d.is_empty()),
            };

            let current = find_existing(&existing, same_label(&label.name)).cloned();
            let outcome = match &current {
                Some(current) if label_matches(current, &request) => {
                    run.report.labels_unchanged += 1;
                    self.progress.increment(Some(&label.name));
                    continue;
                }
                Some(current) => {
                    self.destination
                        .edit_label(self.repo(), &current.name, &request)
                        .await?
                }
                None => self.destination.create_label(self.repo(), &request).await?,
            };

            match outcome {
                WriteOutcome::Created(saved) => {
                    if let Some(current) = current {
                        run.report.labels_updated += 1;
                        existing.retain(|l| l.name != current.name);
                    } else {
                        run.report.labels_created += 1;
                    }
                    existing.push(saved);
                }
                WriteOutcome::Rejected(payload) => {
                    warn!(label = %label.name, error = %payload, "Destination rejected label");
                    run.report
                        .add_error("labels", &format!("{}: {payload}", label.name), false);
                }
            }
            self.progress.increment(Some(&label.name));
        }

        info!(
            created = run.report.labels_created,
            updated = run.report.labels_updated,
            unchanged = run.report.labels_unchanged,
            "Labels copied"
        );
        Ok(())
    }

    async fn copy_issues(&self, run: &mut Run) -> Result<usize> {
        let mut issues = self.source.list_issues(self.project()).await?;
        issues.sort_by_key(|issue| issue.id);
        self.progress
            .set_phase(MigrationPhase::MigratingIssues, issues.len() as u64);

        for issue in issues.iter() {
            info!("Processing {}: {}", issue.iid, issue.title);
            let location = format!("issue {}", issue.iid);

            let assignee = issue.assignee.as_ref().and_then(|user| {
                let mapped = self.options.map_user(&user.username);
                if mapped.is_none() {
                    warn!(username = %user.username, %location, "No destination user, leaving unassigned");
                    run.report.add_warning(format!(
                        "{location}: no destination user for {}, left unassigned",
                        user.username
                    ));
                }
                mapped.map(str::to_string)
            });

            let milestone = issue.milestone_id.map(|id| {
                run.mapper.resolve_milestone(id).unwrap_or_else(|| {
                    warn!(milestone = id, %location, "Milestone not migrated, passing source ID");
                    run.report.add_warning(format!(
                        "{location}: milestone {id} was not migrated, using source ID"
                    ));
                    id
                })
            });

            let description = issue.description.as_deref().unwrap_or_default();
            let rewritten = run.rewrite(&self.source, self.project(), description).await?;
            run.note_unresolved(&location, &rewritten.unresolved);
            let body = issue_body(&self.options.source_name, issue, &rewritten.text);

            let request = CreateIssueRequest {
                title: issue.title.clone(),
                body: body.clone(),
                labels: run
                    .provenance_label
                    .iter()
                    .chain(issue.labels.iter())
                    .cloned()
                    .collect(),
                assignee,
                milestone,
            };

            match self.destination.create_issue(self.repo(), &request).await? {
                WriteOutcome::Created(created) => {
                    let registered = run.mapper.register_issue(issue.iid, created.number);
                    run.note_conflict(registered);
                    run.report.issues_migrated += 1;
                    run.migrated.push(MigratedIssue {
                        source: issue.clone(),
                        number: created.number,
                        html_url: created.html_url,
                        body,
                        forward_references: rewritten
                            .unresolved
                            .iter()
                            .any(|r| r.kind == ReferenceKind::Issue),
                    });
                }
                WriteOutcome::Rejected(payload) => {
                    error!(iid = issue.iid, error = %payload, "Error copying issue");
                    run.report
                        .add_error("issues", &format!("{location}: {payload}"), false);
                }
            }
            self.progress
                .increment(Some(&format!("Issue #{}", issue.iid)));
        }

        Ok(issues.len())
    }

    async fn relink_issues(&self, run: &mut Run) -> Result<()> {
        let pending: Vec<(usize, SourceIssue)> = run
            .migrated
            .iter()
            .enumerate()
            .filter(|(_, issue)| issue.forward_references)
            .map(|(index, issue)| (index, issue.source.clone()))
            .collect();
        self.progress
            .set_phase(MigrationPhase::RelinkingIssues, pending.len() as u64);

        for (index, issue) in pending {
            let description = issue.description.as_deref().unwrap_or_default();
            let rewritten = run.rewrite(&self.source, self.project(), description).await?;
            let body = issue_body(&self.options.source_name, &issue, &rewritten.text);
            let number = run.migrated[index].number;

            if body != run.migrated[index].body {
                match self
                    .destination
                    .edit_issue(self.repo(), number, &EditIssueRequest::body(body.clone()))
                    .await?
                {
                    WriteOutcome::Created(_) => {
                        debug!(iid = issue.iid, number, "Relinked issue body");
                        run.report.issues_relinked += 1;
                        run.migrated[index].body = body;
                    }
                    WriteOutcome::Rejected(payload) => {
                        warn!(iid = issue.iid, error = %payload, "Destination rejected relinked body");
                        run.report.add_error(
                            "issues",
                            &format!("relink issue {}: {payload}", issue.iid),
                            false,
                        );
                    }
                }
            }
            self.progress
                .increment(Some(&format!("Issue #{}", issue.iid)));
        }
        Ok(())
    }

    async fn copy_comments(&self, run: &mut Run) -> Result<()> {
        let migrated = std::mem::take(&mut run.migrated);
        self.progress
            .set_phase(MigrationPhase::MigratingComments, migrated.len() as u64);

        for issue in &migrated {
            info!("Copying comments for {}: {}", issue.source.iid, issue.source.title);

            let mut notes = self
                .source
                .list_notes(self.project(), issue.source.iid)
                .await?;
            notes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

            for note in &notes {
                if note.system && self.options.skip_system_notes {
                    run.report.comments_skipped += 1;
                    continue;
                }

                let location = format!("note {} on issue {}", note.id, issue.source.iid);
                let rewritten = run.rewrite(&self.source, self.project(), &note.body).await?;
                run.note_unresolved(&location, &rewritten.unresolved);

                let body = comment_body(note, &rewritten.text);
                match self
                    .destination
                    .create_comment(self.repo(), issue.number, &body)
                    .await?
                {
                    WriteOutcome::Created(comment) => {
                        run.report.comments_migrated += 1;
                        run.mapper.register_comment(CommentMapping {
                            source_issue_id: issue.source.id,
                            source_note_id: note.id,
                            destination_issue: issue.number,
                            destination_comment_id: comment.id,
                        });
                        advise_manual_handling(run, issue, note, &comment);
                    }
                    WriteOutcome::Rejected(payload) => {
                        error!(note = note.id, iid = issue.source.iid, error = %payload, "Error copying comment");
                        run.report
                            .add_error("comments", &format!("{location}: {payload}"), false);
                    }
                }
            }

            if issue.source.state == IssueState::Closed {
                match self
                    .destination
                    .edit_issue(self.repo(), issue.number, &EditIssueRequest::close())
                    .await?
                {
                    WriteOutcome::Created(_) => run.report.issues_closed += 1,
                    WriteOutcome::Rejected(payload) => {
                        warn!(number = issue.number, error = %payload, "Destination refused to close issue");
                        run.report.add_error(
                            "issues",
                            &format!("close {}: {payload}", issue.html_url),
                            false,
                        );
                    }
                }
            }

            self.progress
                .increment(Some(&format!("Issue #{}", issue.source.iid)));
        }

        run.migrated = migrated;
        Ok(())
    }
}

fn phase_category(phase: MigrationPhase) -> &'static str {
    match phase {
        MigrationPhase::Initializing => "setup",
        MigrationPhase::MigratingMilestones => "milestones",
        MigrationPhase::MigratingLabels => "labels",
        MigrationPhase::MigratingIssues | MigrationPhase::RelinkingIssues => "issues",
        MigrationPhase::MigratingComments => "comments",
        MigrationPhase::Complete => "complete",
    }
}

/// Source colors carry a leading `#`, the destination wants bare hex.
pub fn normalize_color(color: &str) -> String {
    color.strip_prefix('#').unwrap_or(color).to_string()
}

fn label_matches(current: &LabelResponse, request: &LabelRequest) -> bool {
    current.name == request.name
        && current.color.eq_ignore_ascii_case(&request.color)
        && (request.description.is_none() || current.description == request.description)
}

fn milestone_request(milestone: &SourceMilestone) -> CreateMilestoneRequest {
    CreateMilestoneRequest {
        title: milestone.title.clone(),
        description: milestone.description.clone(),
        state: milestone.state.into(),
        due_on: milestone
            .due_date
            .map(|date| format!("{}T00:00:00Z", date.format("%Y-%m-%d"))),
    }
}

/// Issue body with a linkback header.
pub fn issue_body(source_name: &str, issue: &SourceIssue, description: &str) -> String {
    format!(
        "**Imported from [{source_name} issue {}]({})**\n\n{description}",
        issue.iid, issue.web_url
    )
}

/// Comment body with an attribution header.
pub fn comment_body(note: &SourceNote, body: &str) -> String {
    format!(
        "**On {} {} ({}) wrote:**\n\n{body}",
        note.created_at.format("%Y-%m-%d"),
        note.author.name,
        note.author.username
    )
}

/// Links in `body` that point into the source instance.
fn internal_links(body: &str, project_url: &str) -> Vec<String> {
    let origin = match Url::parse(project_url) {
        Ok(url) => url.origin().ascii_serialization(),
        Err(_) => return Vec::new(),
    };
    let project_url = project_url.trim_end_matches('/');

    let absolute = ABSOLUTE_URL
        .find_iter(body)
        .map(|m| m.as_str())
        .filter(|url| {
            url.strip_prefix(origin.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
        .map(str::to_string);
    let uploads = UPLOAD_LINK
        .captures_iter(body)
        .map(|caps| format!("{project_url}{}", &caps[1]));

    let mut seen = HashSet::new();
    absolute
        .chain(uploads)
        .filter(|link| seen.insert(link.clone()))
        .collect()
}

fn advise_manual_handling(
    run: &mut Run,
    issue: &MigratedIssue,
    note: &SourceNote,
    comment: &CommentResponse,
) {
    let source = format!("{}#note_{}", issue.source.web_url, note.id);
    let mut actions = Vec::new();

    if let Some(reference) = &note.attachment {
        actions.push(ManualActionKind::Attachment {
            reference: reference.clone(),
        });
    }

    let urls = internal_links(&note.body, &run.project_url);
    if !urls.is_empty() {
        actions.push(ManualActionKind::InternalLinks { urls });
    }

    for kind in actions {
        let action = ManualAction {
            kind,
            source: source.clone(),
            destination: comment.html_url.clone(),
        };
        warn!(source = %action.source, destination = %action.destination, "Manual attention needed: {action}");
        run.report.manual_actions.push(action);
    }
}
