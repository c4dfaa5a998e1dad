use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::StatusCode};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::core::app_state::AppState;
use crate::review::{self, RUNNING_DESCRIPTION, job::ReviewJob};
use crate::routes::webhook::event::{WebhookEvent, classify};
use gitlab_client::CommitState;

/// POST /webhook — GitLab push / merge-request events.
///
/// Always answers immediately: 200 for non-actionable events, 400 for
/// missing fields, 500 when no token is configured, 202 once the
/// "running" status is set and the review is scheduled. The review
/// itself runs on a background task; its outcome is only visible via
/// the commit status and comment.
#[instrument(name = "webhook_route", skip(state, body))]
pub async fn webhook_route(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> (StatusCode, String) {
    // Lenient body handling: a payload we cannot parse classifies as
    // an unsupported event rather than a parse error.
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    info!(
        object_kind = payload.get("object_kind").and_then(serde_json::Value::as_str).unwrap_or("?"),
        "webhook received"
    );

    let (status, response) = match classify(&payload) {
        WebhookEvent::Ignored { reason } => {
            info!(%reason, "event not actionable");
            (StatusCode::OK, reason)
        }
        WebhookEvent::Invalid { missing } => {
            warn!(?missing, "webhook payload missing required fields");
            (
                StatusCode::BAD_REQUEST,
                format!("Missing required fields: {}", missing.join(", ")),
            )
        }
        WebhookEvent::Push(ev) => {
            schedule(&state, |config| ReviewJob::for_push(config, &ev)).await
        }
        WebhookEvent::MergeRequest(ev) => {
            schedule(&state, |config| ReviewJob::for_merge_request(config, &ev)).await
        }
    };

    info!(status = %status, body = %response, "webhook response");
    (status, response)
}

/// Announces the running status, then spawns the background review.
/// The status call happens before the 202 goes out so that an
/// immediate status poll already shows the review as in progress.
async fn schedule(
    state: &Arc<AppState>,
    make_job: impl FnOnce(&crate::core::app_state::AppConfig) -> ReviewJob,
) -> (StatusCode, String) {
    if state.config.gitlab_token.is_empty() {
        error!("GITLAB_TOKEN not configured");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "GITLAB_TOKEN not configured".to_string(),
        );
    }

    let job = make_job(&state.config);
    state
        .gitlab
        .set_commit_status(
            job.project_id,
            &job.commit_sha,
            CommitState::Running,
            RUNNING_DESCRIPTION,
        )
        .await;

    tokio::spawn(review::run_and_report(state.clone(), job));
    info!("review scheduled in background");

    (
        StatusCode::ACCEPTED,
        "Accepted, review in background".to_string(),
    )
}
