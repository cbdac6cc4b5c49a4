//! GitLab source client (REST API v4).

use crate::client::SourceClient;
use crate::error::{MigrationError, Result};
use crate::types::{IssueState, MergeRequestRef, SourceIssue, SourceLabel, SourceMilestone, SourceNote, SourceUser};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const PER_PAGE: usize = 100;

/// GitLab API response types
#[derive(Debug, Deserialize)]
struct GitLabProject {
    web_url: String,
}

#[derive(Debug, Deserialize)]
struct GitLabUser {
    username: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitLabMilestoneRef {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct GitLabIssue {
    id: u64,
    iid: u64,
    title: String,
    description: Option<String>,
    state: IssueState,
    #[serde(default)]
    labels: Vec<String>,
    assignee: Option<GitLabUser>,
    milestone: Option<GitLabMilestoneRef>,
    web_url: String,
}

#[derive(Debug, Deserialize)]
struct GitLabNote {
    id: u64,
    body: String,
    author: GitLabUser,
    created_at: DateTime<Utc>,
    #[serde(default)]
    system: bool,
    #[serde(default)]
    attachment: Option<String>,
}

impl From<GitLabUser> for SourceUser {
    fn from(user: GitLabUser) -> Self {
        Self {
            username: user.username,
            name: user.name,
        }
    }
}

impl From<GitLabIssue> for SourceIssue {
    fn from(issue: GitLabIssue) -> Self {
        Self {
            id: issue.id,
            iid: issue.iid,
            title: issue.title,
            description: issue.description,
            state: issue.state,
            labels: issue.labels,
            assignee: issue.assignee.map(Into::into),
            milestone_id: issue.milestone.map(|m| m.id),
            web_url: issue.web_url,
        }
    }
}

impl From<GitLabNote> for SourceNote {
    fn from(note: GitLabNote) -> Self {
        Self {
            id: note.id,
            body: note.body,
            author: note.author.into(),
            created_at: note.created_at,
            system: note.system,
            attachment: note.attachment.filter(|a| !a.is_empty()),
        }
    }
}

/// Client for reading a GitLab project.
pub struct GitLabClient {
    client: Client,
    base_url: String,
    token: String,
}

impl GitLabClient {
    /// Create a new GitLab client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - GitLab instance URL (e.g., "https://gitlab.com")
    /// * `token` - GitLab personal access token
    /// * `timeout` - per-request timeout
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("ferry-migrate")
            .timeout(timeout)
            .build()
            .map_err(|e| MigrationError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Instance base URL, without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}/api/v4{path}", self.base_url);
        debug!(%url, "GitLab request");

        let response = self
            .client
            .get(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
            .map_err(|e| MigrationError::NetworkError(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                MigrationError::AuthenticationFailed("Invalid GitLab token".to_string()),
            ),
            _ => Ok(response),
        }
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MigrationError::ApiError(format!(
                "GitLab API error ({status}): {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| MigrationError::ApiError(e.to_string()))
    }

    async fn gitlab_get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(path).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(MigrationError::NotFound(path.to_string()));
        }
        Self::decode(response).await
    }

    async fn gitlab_get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let response = self.send(path).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::decode(response).await.map(Some)
    }

    async fn gitlab_get_paginated<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut all_items = Vec::new();
        let mut page = 1;

        loop {
            let paginated_path = if path.contains('?') {
                format!("{path}&page={page}&per_page={PER_PAGE}")
            } else {
                format!("{path}?page={page}&per_page={PER_PAGE}")
            };

            let items: Vec<T> = self.gitlab_get(&paginated_path).await?;

            if items.is_empty() {
                break;
            }

            let count = items.len();
            all_items.extend(items);

            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(all_items)
    }
}

/// Encode a project ID or namespaced path for use as a single path segment.
fn encode_project(project: &str) -> String {
    url::form_urlencoded::byte_serialize(project.as_bytes()).collect()
}

#[async_trait]
impl SourceClient for GitLabClient {
    async fn project_url(&self, project: &str) -> Result<String> {
        let project: GitLabProject = self
            .gitlab_get(&format!("/projects/{}", encode_project(project)))
            .await?;
        Ok(project.web_url)
    }

    async fn list_milestones(&self, project: &str) -> Result<Vec<SourceMilestone>> {
        self.gitlab_get_paginated(&format!("/projects/{}/milestones", encode_project(project)))
            .await
    }

    async fn list_labels(&self, project: &str) -> Result<Vec<SourceLabel>> {
        self.gitlab_get_paginated(&format!("/projects/{}/labels", encode_project(project)))
            .await
    }

    async fn list_issues(&self, project: &str) -> Result<Vec<SourceIssue>> {
        let issues: Vec<GitLabIssue> = self
            .gitlab_get_paginated(&format!(
                "/projects/{}/issues?scope=all&state=all&order_by=created_at&sort=asc",
                encode_project(project)
            ))
            .await?;

        let mut issues: Vec<SourceIssue> = issues.into_iter().map(Into::into).collect();
        issues.sort_by_key(|issue| issue.id);
        Ok(issues)
    }

    async fn list_notes(&self, project: &str, issue_iid: u64) -> Result<Vec<SourceNote>> {
        let notes: Vec<GitLabNote> = self
            .gitlab_get_paginated(&format!(
                "/projects/{}/issues/{issue_iid}/notes",
                encode_project(project)
            ))
            .await?;
        Ok(notes.into_iter().map(Into::into).collect())
    }

    async fn get_merge_request(&self, project: &str, iid: u64) -> Result<Option<MergeRequestRef>> {
        self.gitlab_get_optional(&format!(
            "/projects/{}/merge_requests/{iid}",
            encode_project(project)
        ))
        .await
    }
}
