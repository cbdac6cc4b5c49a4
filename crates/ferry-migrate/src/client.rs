//! Contracts between the migration engine and the trackers it talks to.
//!
//! Reads return plain `Result`s. Writes return [`WriteOutcome`] inside the
//! `Result`: `Err` means the tracker could not be reached or refused our
//! credentials, `Rejected` means this one item was refused.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{
    IssueState, MergeRequestRef, SourceIssue, SourceLabel, SourceMilestone, SourceNote,
};

/// Raw error response returned by the destination for a single item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub status: u16,
    pub body: String,
}

impl std::fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "status {}: {}", self.status, self.body)
    }
}

/// Result of a create or edit call on the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome<T> {
    Created(T),
    Rejected(ErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneResponse {
    pub number: u64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateMilestoneRequest {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub state: IssueState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_on: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelResponse {
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Label fields for create and edit. On edit, `name` becomes the new name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelRequest {
    pub name: String,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateIssueRequest {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EditIssueRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<IssueState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl EditIssueRequest {
    pub fn close() -> Self {
        Self {
            state: Some(IssueState::Closed),
            ..Default::default()
        }
    }

    pub fn body(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueResponse {
    pub number: u64,
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentResponse {
    pub id: u64,
    pub html_url: String,
}

/// Read access to the tracker being migrated from.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Web URL of the project.
    async fn project_url(&self, project: &str) -> Result<String>;

    async fn list_milestones(&self, project: &str) -> Result<Vec<SourceMilestone>>;

    async fn list_labels(&self, project: &str) -> Result<Vec<SourceLabel>>;

    /// All issues, ascending by source ID.
    async fn list_issues(&self, project: &str) -> Result<Vec<SourceIssue>>;

    /// Notes of one issue, in whatever order the source returns them.
    async fn list_notes(&self, project: &str, issue_iid: u64) -> Result<Vec<SourceNote>>;

    /// Look up a merge request; `None` if the source does not know it.
    async fn get_merge_request(&self, project: &str, iid: u64) -> Result<Option<MergeRequestRef>>;
}

/// Read/write access to the tracker being migrated to.
#[async_trait]
pub trait DestinationClient: Send + Sync {
    async fn list_milestones(&self, repo: &str) -> Result<Vec<MilestoneResponse>>;

    async fn create_milestone(
        &self,
        repo: &str,
        request: &CreateMilestoneRequest,
    ) -> Result<WriteOutcome<MilestoneResponse>>;

    async fn list_labels(&self, repo: &str) -> Result<Vec<LabelResponse>>;

    async fn create_label(
        &self,
        repo: &str,
        request: &LabelRequest,
    ) -> Result<WriteOutcome<LabelResponse>>;

    /// Edit the label currently called `current_name`.
    async fn edit_label(
        &self,
        repo: &str,
        current_name: &str,
        request: &LabelRequest,
    ) -> Result<WriteOutcome<LabelResponse>>;

    async fn create_issue(
        &self,
        repo: &str,
        request: &CreateIssueRequest,
    ) -> Result<WriteOutcome<IssueResponse>>;

    async fn edit_issue(
        &self,
        repo: &str,
        number: u64,
        request: &EditIssueRequest,
    ) -> Result<WriteOutcome<IssueResponse>>;

    async fn create_comment(
        &self,
        repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<WriteOutcome<CommentResponse>>;
}
