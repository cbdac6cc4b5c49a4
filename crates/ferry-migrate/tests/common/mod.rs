//! In-memory trackers for driving the migrator end to end.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use ferry_migrate::client::{
    CommentResponse, CreateIssueRequest, CreateMilestoneRequest, DestinationClient,
    EditIssueRequest, IssueResponse, LabelRequest, LabelResponse, MilestoneResponse,
};
use ferry_migrate::{
    ErrorPayload, IssueState, MergeRequestRef, MigrationError, Result, SourceClient, SourceIssue,
    SourceLabel, SourceMilestone, SourceNote, SourceUser, WriteOutcome,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const PROJECT: &str = "group/project";
pub const PROJECT_URL: &str = "https://gitlab.example/group/project";
pub const REPO: &str = "owner/repo";

// ============================================================================
// Source
// ============================================================================

/// A source project held in memory.
#[derive(Default)]
pub struct FakeSource {
    pub milestones: Vec<SourceMilestone>,
    pub labels: Vec<SourceLabel>,
    pub issues: Vec<SourceIssue>,
    pub notes: HashMap<u64, Vec<SourceNote>>,
    pub merge_requests: HashMap<u64, String>,
    /// Listing notes of this issue fails with a network error.
    pub broken_notes: Option<u64>,
    /// Issues whose notes were requested, in order.
    pub notes_requested: Arc<Mutex<Vec<u64>>>,
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn project_url(&self, _project: &str) -> Result<String> {
        Ok(PROJECT_URL.to_string())
    }

    async fn list_milestones(&self, _project: &str) -> Result<Vec<SourceMilestone>> {
        Ok(self.milestones.clone())
    }

    async fn list_labels(&self, _project: &str) -> Result<Vec<SourceLabel>> {
        Ok(self.labels.clone())
    }

    async fn list_issues(&self, _project: &str) -> Result<Vec<SourceIssue>> {
        Ok(self.issues.clone())
    }

    async fn list_notes(&self, _project: &str, issue_iid: u64) -> Result<Vec<SourceNote>> {
        self.notes_requested.lock().push(issue_iid);
        if self.broken_notes == Some(issue_iid) {
            return Err(MigrationError::NetworkError("connection reset".to_string()));
        }
        Ok(self.notes.get(&issue_iid).cloned().unwrap_or_default())
    }

    async fn get_merge_request(&self, _project: &str, iid: u64) -> Result<Option<MergeRequestRef>> {
        Ok(self.merge_requests.get(&iid).map(|url| MergeRequestRef {
            iid,
            web_url: url.clone(),
        }))
    }
}

pub fn issue(iid: u64, title: &str) -> SourceIssue {
    SourceIssue {
        id: 1000 + iid,
        iid,
        title: title.to_string(),
        description: None,
        state: IssueState::Open,
        labels: Vec::new(),
        assignee: None,
        milestone_id: None,
        web_url: format!("{PROJECT_URL}/-/issues/{iid}"),
    }
}

pub fn user(username: &str) -> SourceUser {
    SourceUser {
        username: username.to_string(),
        name: format!("{username} name"),
    }
}

/// A note written `minute` minutes after 2024-03-01 09:00 UTC.
pub fn note(id: u64, minute: u32, body: &str) -> SourceNote {
    SourceNote {
        id,
        body: body.to_string(),
        author: user("jdoe"),
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, minute, 0).unwrap(),
        system: false,
        attachment: None,
    }
}

pub fn label(name: &str, color: &str) -> SourceLabel {
    SourceLabel {
        name: name.to_string(),
        color: color.to_string(),
        description: None,
    }
}

// ============================================================================
// Destination
// ============================================================================

#[derive(Debug, Clone)]
pub struct CreatedIssue {
    pub number: u64,
    pub request: CreateIssueRequest,
    pub body: String,
    pub state: IssueState,
}

#[derive(Debug, Clone)]
pub struct CreatedComment {
    pub id: u64,
    pub issue: u64,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct DestinationState {
    pub milestones: Vec<MilestoneResponse>,
    pub milestone_requests: Vec<CreateMilestoneRequest>,
    pub labels: Vec<LabelResponse>,
    pub issues: Vec<CreatedIssue>,
    pub comments: Vec<CreatedComment>,
    /// Every write, in order, e.g. `create_comment:3`.
    pub calls: Vec<String>,
    /// Issue titles the destination refuses.
    pub rejected_titles: HashSet<String>,
    pub next_milestone: u64,
    pub next_issue: u64,
    pub next_comment: u64,
}

/// A destination repository held in memory. Clones share state.
#[derive(Clone)]
pub struct FakeDestination {
    pub state: Arc<Mutex<DestinationState>>,
}

impl FakeDestination {
    /// Destination issues are numbered from `first_issue`.
    pub fn new(first_issue: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(DestinationState {
                next_milestone: 1,
                next_issue: first_issue,
                next_comment: 9000,
                ..Default::default()
            })),
        }
    }

    pub fn with_milestone(self, number: u64, title: &str) -> Self {
        self.state.lock().milestones.push(MilestoneResponse {
            number,
            title: title.to_string(),
        });
        self
    }

    pub fn with_label(self, name: &str, color: &str, description: Option<&str>) -> Self {
        self.state.lock().labels.push(LabelResponse {
            name: name.to_string(),
            color: color.to_string(),
            description: description.map(str::to_string),
        });
        self
    }

    pub fn rejecting(self, title: &str) -> Self {
        self.state.lock().rejected_titles.insert(title.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn issue(&self, number: u64) -> CreatedIssue {
        self.state
            .lock()
            .issues
            .iter()
            .find(|i| i.number == number)
            .cloned()
            .unwrap_or_else(|| panic!("no destination issue {number}"))
    }

    pub fn comments_on(&self, number: u64) -> Vec<String> {
        self.state
            .lock()
            .comments
            .iter()
            .filter(|c| c.issue == number)
            .map(|c| c.body.clone())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

fn rejected<T>(message: &str) -> Result<WriteOutcome<T>> {
    Ok(WriteOutcome::Rejected(ErrorPayload {
        status: 422,
        body: format!(r#"{{"message":"{message}"}}"#),
    }))
}

#[async_trait]
impl DestinationClient for FakeDestination {
    async fn list_milestones(&self, _repo: &str) -> Result<Vec<MilestoneResponse>> {
        Ok(self.state.lock().milestones.clone())
    }

    async fn create_milestone(
        &self,
        _repo: &str,
        request: &CreateMilestoneRequest,
    ) -> Result<WriteOutcome<MilestoneResponse>> {
        let mut state = self.state.lock();
        state.calls.push(format!("create_milestone:{}", request.title));
        let number = state.next_milestone;
        state.next_milestone += 1;
        let created = MilestoneResponse {
            number,
            title: request.title.clone(),
        };
        state.milestones.push(created.clone());
        state.milestone_requests.push(request.clone());
        Ok(WriteOutcome::Created(created))
    }

    async fn list_labels(&self, _repo: &str) -> Result<Vec<LabelResponse>> {
        Ok(self.state.lock().labels.clone())
    }

    async fn create_label(
        &self,
        _repo: &str,
        request: &LabelRequest,
    ) -> Result<WriteOutcome<LabelResponse>> {
        let mut state = self.state.lock();
        state.calls.push(format!("create_label:{}", request.name));
        if state
            .labels
            .iter()
            .any(|l| l.name.eq_ignore_ascii_case(&request.name))
        {
            return rejected("already_exists");
        }
        let created = LabelResponse {
            name: request.name.clone(),
            color: request.color.clone(),
            description: request.description.clone(),
        };
        state.labels.push(created.clone());
        Ok(WriteOutcome::Created(created))
    }

    async fn edit_label(
        &self,
        _repo: &str,
        current_name: &str,
        request: &LabelRequest,
    ) -> Result<WriteOutcome<LabelResponse>> {
        let mut state = self.state.lock();
        state.calls.push(format!("edit_label:{current_name}"));
        let Some(existing) = state.labels.iter_mut().find(|l| l.name == current_name) else {
            return rejected("Not Found");
        };
        existing.name = request.name.clone();
        existing.color = request.color.clone();
        if request.description.is_some() {
            existing.description = request.description.clone();
        }
        Ok(WriteOutcome::Created(existing.clone()))
    }

    async fn create_issue(
        &self,
        _repo: &str,
        request: &CreateIssueRequest,
    ) -> Result<WriteOutcome<IssueResponse>> {
        let mut state = self.state.lock();
        state.calls.push(format!("create_issue:{}", request.title));
        if state.rejected_titles.contains(&request.title) {
            return rejected("Validation Failed");
        }
        let number = state.next_issue;
        state.next_issue += 1;
        state.issues.push(CreatedIssue {
            number,
            request: request.clone(),
            body: request.body.clone(),
            state: IssueState::Open,
        });
        Ok(WriteOutcome::Created(IssueResponse {
            number,
            html_url: format!("https://github.com/{REPO}/issues/{number}"),
        }))
    }

    async fn edit_issue(
        &self,
        _repo: &str,
        number: u64,
        request: &EditIssueRequest,
    ) -> Result<WriteOutcome<IssueResponse>> {
        let mut state = self.state.lock();
        let what = if request.state.is_some() { "close" } else { "body" };
        state.calls.push(format!("edit_issue:{number}:{what}"));
        let Some(issue) = state.issues.iter_mut().find(|i| i.number == number) else {
            return rejected("Not Found");
        };
        if let Some(issue_state) = request.state {
            issue.state = issue_state;
        }
        if let Some(body) = &request.body {
            issue.body = body.clone();
        }
        Ok(WriteOutcome::Created(IssueResponse {
            number,
            html_url: format!("https://github.com/{REPO}/issues/{number}"),
        }))
    }

    async fn create_comment(
        &self,
        _repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<WriteOutcome<CommentResponse>> {
        let mut state = self.state.lock();
        state.calls.push(format!("create_comment:{issue_number}"));
        let id = state.next_comment;
        state.next_comment += 1;
        state.comments.push(CreatedComment {
            id,
            issue: issue_number,
            body: body.to_string(),
        });
        Ok(WriteOutcome::Created(CommentResponse {
            id,
            html_url: format!("https://github.com/{REPO}/issues/{issue_number}#issuecomment-{id}"),
        }))
    }
}
