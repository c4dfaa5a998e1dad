//! Webhook event classification and validation.
//!
//! Pure mapping from the raw GitLab payload to a typed event. No
//! network or filesystem access; fully unit-testable with literal
//! payload fixtures.

use serde_json::Value;

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// MR lifecycle actions that trigger a review.
const ACCEPTED_MR_ACTIONS: &[&str] = &["open", "reopen", "update", "merge"];

/// Clone-URL payload locations for push events, in preference order.
const PUSH_URL_PATHS: &[&[&str]] = &[
    &["project", "http_url"],
    &["project", "git_http_url"],
    &["repository", "git_http_url"],
];

/// Clone-URL payload locations for MR events. The canonical repo URLs
/// come before the source-fork URLs.
const MR_URL_PATHS: &[&[&str]] = &[
    &["project", "http_url_to_repo"],
    &["project", "git_http_url"],
    &["project", "http_url"],
    &["object_attributes", "source", "git_http_url"],
    &["object_attributes", "source", "http_url"],
];

#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    pub project_id: u64,
    pub project_path: String,
    pub repo_url: String,
    pub branch: String,
    pub before_sha: String,
    pub after_sha: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeRequestEvent {
    pub project_id: u64,
    pub project_path: String,
    pub repo_url: String,
    pub mr_iid: u64,
    pub source_branch: String,
    pub target_branch: String,
    pub head_sha: String,
}

/// Result of classifying one inbound payload. Consumed exactly once by
/// the webhook handler.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    Push(PushEvent),
    MergeRequest(MergeRequestEvent),
    /// Not actionable; the reason doubles as the 200 response body.
    Ignored { reason: String },
    /// Actionable kind but required fields are absent or empty.
    Invalid { missing: Vec<&'static str> },
}

pub fn classify(payload: &Value) -> WebhookEvent {
    match payload.get("object_kind").and_then(Value::as_str) {
        Some("push") => classify_push(payload),
        Some("merge_request") => classify_merge_request(payload),
        _ => WebhookEvent::Ignored {
            reason: "Not a supported event".to_string(),
        },
    }
}

fn classify_push(payload: &Value) -> WebhookEvent {
    let Some(branch) = str_at(payload, &["ref"])
        .and_then(|r| r.strip_prefix(BRANCH_REF_PREFIX))
        .filter(|b| !b.is_empty())
    else {
        return WebhookEvent::Ignored {
            reason: "Push to non-branch ref, ignored".to_string(),
        };
    };

    let project_id = u64_at(payload, &["project", "id"]);
    let repo_url = first_url(payload, PUSH_URL_PATHS);
    let before_sha = str_at(payload, &["before"]);
    // The checkout sha is the actual reviewed tip; "after" is a fallback.
    let after_sha = str_at(payload, &["checkout_sha"]).or_else(|| str_at(payload, &["after"]));

    let mut missing = Vec::new();
    if project_id.is_none() {
        missing.push("project.id");
    }
    if repo_url.is_none() {
        missing.push("repo_url");
    }
    if before_sha.is_none() {
        missing.push("before_sha");
    }
    if after_sha.is_none() {
        missing.push("after_sha");
    }
    if !missing.is_empty() {
        return WebhookEvent::Invalid { missing };
    }

    let project_id = project_id.unwrap_or_default();
    WebhookEvent::Push(PushEvent {
        project_id,
        project_path: project_path(payload, project_id),
        repo_url: repo_url.unwrap_or_default().to_string(),
        branch: branch.to_string(),
        before_sha: before_sha.unwrap_or_default().to_string(),
        after_sha: after_sha.unwrap_or_default().to_string(),
    })
}

fn classify_merge_request(payload: &Value) -> WebhookEvent {
    if let Some(action) = str_at(payload, &["object_attributes", "action"]) {
        if !ACCEPTED_MR_ACTIONS.contains(&action) {
            return WebhookEvent::Ignored {
                reason: "Action ignored".to_string(),
            };
        }
    }

    let project_id = u64_at(payload, &["project", "id"]);
    let mr_iid = u64_at(payload, &["object_attributes", "iid"]);
    let repo_url = first_url(payload, MR_URL_PATHS);
    let source_branch = str_at(payload, &["object_attributes", "source_branch"]);
    let target_branch = str_at(payload, &["object_attributes", "target_branch"]);
    let head_sha = str_at(payload, &["object_attributes", "last_commit", "id"]);

    let mut missing = Vec::new();
    if project_id.is_none() {
        missing.push("project.id");
    }
    if mr_iid.is_none() {
        missing.push("mr_iid");
    }
    if repo_url.is_none() {
        missing.push("repo_url");
    }
    if source_branch.is_none() {
        missing.push("source_branch");
    }
    if target_branch.is_none() {
        missing.push("target_branch");
    }
    if head_sha.is_none() {
        missing.push("last_commit_sha");
    }
    if !missing.is_empty() {
        return WebhookEvent::Invalid { missing };
    }

    let project_id = project_id.unwrap_or_default();
    WebhookEvent::MergeRequest(MergeRequestEvent {
        project_id,
        project_path: project_path(payload, project_id),
        repo_url: repo_url.unwrap_or_default().to_string(),
        mr_iid: mr_iid.unwrap_or_default(),
        source_branch: source_branch.unwrap_or_default().to_string(),
        target_branch: target_branch.unwrap_or_default().to_string(),
        head_sha: head_sha.unwrap_or_default().to_string(),
    })
}

fn project_path(payload: &Value, project_id: u64) -> String {
    str_at(payload, &["project", "path_with_namespace"])
        .map(str::to_string)
        .unwrap_or_else(|| project_id.to_string())
}

fn value_at<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(payload, |v, key| v.get(key))
}

/// Non-empty string at the given path; empty counts as absent.
fn str_at<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a str> {
    value_at(payload, path)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn u64_at(payload: &Value, path: &[&str]) -> Option<u64> {
    value_at(payload, path).and_then(Value::as_u64)
}

/// First non-empty URL across the ordered extractor paths.
fn first_url<'a>(payload: &'a Value, paths: &[&[&str]]) -> Option<&'a str> {
    paths.iter().find_map(|path| str_at(payload, path))
}
