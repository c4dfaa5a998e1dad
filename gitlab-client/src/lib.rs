//! GitLab reporting client (REST v4).
//!
//! Endpoints used:
//! - POST /projects/:id/statuses/:sha                    (commit status)
//! - POST /projects/:id/merge_requests/:iid/notes        (MR comment)
//! - POST /projects/:id/repository/commits/:sha/comments (commit comment)
//!
//! All calls are best-effort: a failed post is logged (response body
//! truncated) and swallowed. The review outcome is computed locally and
//! never depends on whether reporting succeeded.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

/// Context label shown next to the status in the GitLab UI.
const STATUS_CONTEXT: &str = "code-review-bot";

/// Max bytes of an error response body kept in the log.
const BODY_LOG_LIMIT: usize = 500;

#[derive(Debug, Error)]
pub enum GitLabClientError {
    #[error("invalid gitlab token: {0}")]
    InvalidToken(#[from] reqwest::header::InvalidHeaderValue),

    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Commit status states we report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    Running,
    Success,
    Failed,
}

impl CommitState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitLabClient {
    http: Client,
    base_api: String,
}

impl GitLabClient {
    /// Builds a client with the token baked into the default headers and
    /// the per-call timeout applied to every request.
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, GitLabClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("mr-review-bot/0.1"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("PRIVATE-TOKEN", HeaderValue::from_str(token)?);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_api: format!("{}/api/v4", base_url.trim_end_matches('/')),
        })
    }

    /// Sets the commit status shown as a pipeline gate in the GitLab UI.
    pub async fn set_commit_status(
        &self,
        project_id: u64,
        sha: &str,
        state: CommitState,
        description: &str,
    ) {
        #[derive(Serialize)]
        struct Req<'a> {
            state: &'a str,
            context: &'a str,
            description: &'a str,
        }

        let url = format!("{}/projects/{}/statuses/{}", self.base_api, project_id, sha);
        info!(
            project_id,
            sha = short_sha(sha),
            state = state.as_str(),
            description,
            "setting commit status"
        );
        self.post_best_effort(
            &url,
            &Req {
                state: state.as_str(),
                context: STATUS_CONTEXT,
                description,
            },
            "commit status",
        )
        .await;
    }

    /// Posts a note on the given merge request.
    pub async fn post_mr_note(&self, project_id: u64, mr_iid: u64, body: &str) {
        #[derive(Serialize)]
        struct Req<'a> {
            body: &'a str,
        }

        let url = format!(
            "{}/projects/{}/merge_requests/{}/notes",
            self.base_api, project_id, mr_iid
        );
        info!(project_id, mr_iid, "posting MR note");
        self.post_best_effort(&url, &Req { body }, "MR note").await;
    }

    /// Posts a comment on the given commit (push review results).
    pub async fn post_commit_comment(&self, project_id: u64, sha: &str, note: &str) {
        #[derive(Serialize)]
        struct Req<'a> {
            note: &'a str,
        }

        let url = format!(
            "{}/projects/{}/repository/commits/{}/comments",
            self.base_api, project_id, sha
        );
        info!(project_id, sha = short_sha(sha), "posting commit comment");
        self.post_best_effort(&url, &Req { note }, "commit comment")
            .await;
    }

    async fn post_best_effort<T: Serialize>(&self, url: &str, body: &T, what: &'static str) {
        match self.http.post(url).json(body).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    info!(%status, what, "gitlab post ok");
                } else {
                    let text = resp.text().await.unwrap_or_default();
                    warn!(%status, what, body = truncate(&text), "gitlab post failed");
                }
            }
            Err(e) => warn!(error = %e, what, "gitlab post failed"),
        }
    }
}

/// The sha comes straight from the webhook payload, so it may be any
/// string; clamp to a char boundary rather than trusting it is ASCII.
fn short_sha(sha: &str) -> &str {
    let mut end = sha.len().min(8);
    while !sha.is_char_boundary(end) {
        end -= 1;
    }
    &sha[..end]
}

fn truncate(text: &str) -> &str {
    let mut end = text.len().min(BODY_LOG_LIMIT);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
