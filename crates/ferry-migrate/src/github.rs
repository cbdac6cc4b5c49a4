//! GitHub destination client (REST API v3).

use crate::client::{
    CommentResponse, CreateIssueRequest, CreateMilestoneRequest, DestinationClient,
    EditIssueRequest, ErrorPayload, IssueResponse, LabelRequest, LabelResponse,
    MilestoneResponse, WriteOutcome,
};
use crate::error::{MigrationError, Result};

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default public API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const PER_PAGE: usize = 100;

#[derive(Debug, Serialize)]
struct EditLabelBody<'a> {
    new_name: &'a str,
    color: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

/// Client for writing to a GitHub repository.
pub struct GitHubClient {
    client: Client,
    api_url: Url,
    token: String,
}

impl GitHubClient {
    /// Create a new GitHub client.
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("ferry-migrate")
            .timeout(timeout)
            .build()
            .map_err(|e| MigrationError::NetworkError(e.to_string()))?;

        let api_url = Url::parse(api_url)
            .map_err(|e| MigrationError::InvalidConfig(format!("Invalid GitHub API URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token: token.to_string(),
        })
    }

    /// Build `<api>/repos/<owner>/<repo>/<segments...>`, encoding each segment.
    fn endpoint(&self, repo: &str, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| MigrationError::InvalidConfig(self.api_url.to_string()))?
            .pop_if_empty()
            .push("repos")
            .extend(repo.split('/'))
            .extend(segments);
        Ok(url)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<reqwest::Response> {
        debug!(%method, %url, "GitHub request");

        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MigrationError::NetworkError(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(MigrationError::AuthenticationFailed(
                "Invalid GitHub token".to_string(),
            )),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                if let Some(wait) = rate_limit_wait(&response) {
                    return Err(MigrationError::RateLimitExceeded(wait));
                }
                Err(MigrationError::AuthenticationFailed(
                    "Access denied. Check your token permissions.".to_string(),
                ))
            }
            status if status.is_server_error() => {
                let body = response.text().await.unwrap_or_default();
                Err(MigrationError::ApiError(format!(
                    "GitHub API error ({status}): {body}"
                )))
            }
            _ => Ok(response),
        }
    }

    async fn github_get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.send::<()>(Method::GET, url.clone(), None).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(MigrationError::NotFound(url.to_string()));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MigrationError::ApiError(format!(
                "GitHub API error ({status}): {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| MigrationError::ApiError(e.to_string()))
    }

    async fn github_get_paginated<T: DeserializeOwned>(
        &self,
        base_url: Url,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let mut all_items = Vec::new();
        let mut page = 1;

        loop {
            let mut url = base_url.clone();
            url.query_pairs_mut()
                .extend_pairs(query)
                .append_pair("page", &page.to_string())
                .append_pair("per_page", &PER_PAGE.to_string());

            let items: Vec<T> = self.github_get(url).await?;

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

    async fn write<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<WriteOutcome<T>> {
        let response = self.send(method, url, Some(body)).await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(WriteOutcome::Rejected(ErrorPayload {
                status: status.as_u16(),
                body,
            }));
        }

        response
            .json()
            .await
            .map(WriteOutcome::Created)
            .map_err(|e| MigrationError::ApiError(e.to_string()))
    }
}

/// Seconds until the rate limit resets, if the response says it is exhausted.
fn rate_limit_wait(response: &reqwest::Response) -> Option<u64> {
    let headers = response.headers();
    let remaining = headers.get("x-ratelimit-remaining")?.to_str().ok()?;
    if remaining != "0" {
        return None;
    }
    let reset: i64 = headers.get("x-ratelimit-reset")?.to_str().ok()?.parse().ok()?;
    let now = chrono::Utc::now().timestamp();
    Some(u64::try_from(reset - now).unwrap_or(0))
}

#[async_trait]
impl DestinationClient for GitHubClient {
    async fn list_milestones(&self, repo: &str) -> Result<Vec<MilestoneResponse>> {
        let url = self.endpoint(repo, &["milestones"])?;
        self.github_get_paginated(url, &[("state", "all")]).await
    }

    async fn create_milestone(
        &self,
        repo: &str,
        request: &CreateMilestoneRequest,
    ) -> Result<WriteOutcome<MilestoneResponse>> {
        let url = self.endpoint(repo, &["milestones"])?;
        self.write(Method::POST, url, request).await
    }

    async fn list_labels(&self, repo: &str) -> Result<Vec<LabelResponse>> {
        let url = self.endpoint(repo, &["labels"])?;
        self.github_get_paginated(url, &[]).await
    }

    async fn create_label(
        &self,
        repo: &str,
        request: &LabelRequest,
    ) -> Result<WriteOutcome<LabelResponse>> {
        let url = self.endpoint(repo, &["labels"])?;
        self.write(Method::POST, url, request).await
    }

    async fn edit_label(
        &self,
        repo: &str,
        current_name: &str,
        request: &LabelRequest,
    ) -> Result<WriteOutcome<LabelResponse>> {
        let url = self.endpoint(repo, &["labels", current_name])?;
        let body = EditLabelBody {
            new_name: &request.name,
            color: &request.color,
            description: request.description.as_deref(),
        };
        self.write(Method::PATCH, url, &body).await
    }

    async fn create_issue(
        &self,
        repo: &str,
        request: &CreateIssueRequest,
    ) -> Result<WriteOutcome<IssueResponse>> {
        let url = self.endpoint(repo, &["issues"])?;
        self.write(Method::POST, url, request).await
    }

    async fn edit_issue(
        &self,
        repo: &str,
        number: u64,
        request: &EditIssueRequest,
    ) -> Result<WriteOutcome<IssueResponse>> {
        let number = number.to_string();
        let url = self.endpoint(repo, &["issues", &number])?;
        self.write(Method::PATCH, url, request).await
    }

    async fn create_comment(
        &self,
        repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<WriteOutcome<CommentResponse>> {
        let number = issue_number.to_string();
        let url = self.endpoint(repo, &["issues", &number, "comments"])?;
        self.write(Method::POST, url, &CommentBody { body }).await
    }
}
