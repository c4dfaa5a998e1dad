//! Background review execution and result reporting.
//!
//! One task per accepted webhook. The task serializes with other
//! reviews of the same project via the lock registry, supervises the
//! agent run, and reports the outcome as a commit status plus a
//! comment. Every failure inside the task ends in a terminal report;
//! nothing escapes to crash the process.

pub mod job;

use std::sync::Arc;

use gitlab_client::CommitState;
use review_agent::{ExecutionResult, run_review};
use tracing::{info, warn};

use crate::core::app_state::AppState;
use crate::review::job::{ReportTarget, ReviewJob};

pub const RUNNING_DESCRIPTION: &str = "AI code review in progress...";

const COMMENT_BANNER: &str = "🤖 **Code Review Result**";
const TIMEOUT_COMMENT: &str = "❌ **System Error**: AI review execution timed out";

/// Case-insensitive approval token in the review text.
const APPROVAL_MARKER: &str = "lgtm";

/// Terminal outcome of one review job. Never persisted; drives the two
/// GitLab side effects and is dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(String),
    Failed(String),
    Timeout,
}

/// Entry point of the background task spawned by the webhook handler.
pub async fn run_and_report(state: Arc<AppState>, job: ReviewJob) {
    info!(project_id = job.project_id, "review task started");
    let lock = state.locks.lock_for(job.project_id);
    let _held = lock.lock().await;

    let outcome = execute(&state, &job).await;
    report(&state, &job, outcome).await;
    // _held drops here; the next job for this project may proceed.
}

/// Runs the agent and folds every result and error into an [`Outcome`].
async fn execute(state: &AppState, job: &ReviewJob) -> Outcome {
    let cfg = ReviewJob::agent_config(&state.config);
    match run_review(&cfg, &job.prompt).await {
        Ok(ExecutionResult::TimedOut) => Outcome::Timeout,
        Ok(ExecutionResult::Completed {
            exit_code: 0,
            stdout,
            ..
        }) => Outcome::Success(if stdout.is_empty() {
            "(no output)".to_string()
        } else {
            stdout
        }),
        Ok(ExecutionResult::Completed {
            exit_code, stderr, ..
        }) => {
            warn!(exit_code, "review agent exited non-zero");
            Outcome::Failed(if stderr.is_empty() {
                "Unknown error".to_string()
            } else {
                stderr
            })
        }
        Err(e) => {
            warn!(error = %e, "review execution failed");
            Outcome::Failed(e.to_string())
        }
    }
}

async fn report(state: &AppState, job: &ReviewJob, outcome: Outcome) {
    let (commit_state, description, comment) = match outcome {
        Outcome::Success(text) => {
            let description = success_description(&text);
            let comment = format!("{}{}", comment_banner(job), text);
            (CommitState::Success, description.to_string(), comment)
        }
        Outcome::Timeout => {
            warn!(project_id = job.project_id, "review timed out");
            (
                CommitState::Failed,
                "AI review timeout".to_string(),
                TIMEOUT_COMMENT.to_string(),
            )
        }
        Outcome::Failed(detail) => (
            CommitState::Failed,
            "Processing error".to_string(),
            format!("❌ **System Error**: {detail}"),
        ),
    };

    state
        .gitlab
        .set_commit_status(job.project_id, &job.commit_sha, commit_state, &description)
        .await;

    match job.target {
        ReportTarget::MergeRequest { iid } => {
            state.gitlab.post_mr_note(job.project_id, iid, &comment).await;
        }
        ReportTarget::Commit => {
            state
                .gitlab
                .post_commit_comment(job.project_id, &job.commit_sha, &comment)
                .await;
        }
    }

    info!(
        project_id = job.project_id,
        state = commit_state.as_str(),
        description,
        "review reported"
    );
}

fn success_description(text: &str) -> &'static str {
    if text.to_lowercase().contains(APPROVAL_MARKER) {
        "AI review passed (LGTM)"
    } else {
        "AI review done"
    }
}

fn comment_banner(job: &ReviewJob) -> String {
    match &job.branch {
        Some(branch) => format!("{COMMENT_BANNER} (push {branch}):\n\n"),
        None => format!("{COMMENT_BANNER}:\n\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::app_state::AppConfig;
    use crate::routes::webhook::event::PushEvent;
    use std::path::PathBuf;

    #[test]
    fn lgtm_marker_is_detected_case_insensitively() {
        assert_eq!(success_description("All good. LGTM!"), "AI review passed (LGTM)");
        assert_eq!(success_description("looks fine, lgtm"), "AI review passed (LGTM)");
        assert_eq!(success_description("Lgtm with nits"), "AI review passed (LGTM)");
    }

    #[test]
    fn plain_success_gets_generic_description() {
        assert_eq!(success_description("Found two issues."), "AI review done");
        assert_eq!(success_description(""), "AI review done");
    }

    #[test]
    fn push_banner_names_the_branch() {
        let config = AppConfig {
            gitlab_url: "http://localhost".into(),
            gitlab_token: "tok".into(),
            repo_workspace: "repos".into(),
            opencode_cmd: "opencode".into(),
            opencode_log_level: String::new(),
            opencode_model: String::new(),
            host: "0.0.0.0".into(),
            port: 5000,
            review_timeout_secs: 600,
            api_timeout_secs: 10,
            log_file: String::new(),
            project_root: PathBuf::from("/srv/bot"),
        };
        let ev = PushEvent {
            project_id: 1,
            project_path: "g/a".into(),
            repo_url: "https://git.example.com/g/a.git".into(),
            branch: "main".into(),
            before_sha: "aaa".into(),
            after_sha: "bbb".into(),
        };
        let push_job = job::ReviewJob::for_push(&config, &ev);
        assert_eq!(
            comment_banner(&push_job),
            "🤖 **Code Review Result** (push main):\n\n"
        );

        let mr_job = ReviewJob {
            branch: None,
            ..push_job
        };
        assert_eq!(comment_banner(&mr_job), "🤖 **Code Review Result**:\n\n");
    }
}
