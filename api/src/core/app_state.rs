use std::path::{Path, PathBuf};
use std::time::Duration;

use gitlab_client::{GitLabClient, GitLabClientError};

use crate::core::locks::ProjectLocks;

/// Process configuration, read once at startup. Env only, defaults in
/// code. A missing `GITLAB_TOKEN` is allowed here and rejected per
/// request with a 500 so that the service still boots and /health works.
#[derive(Clone)]
pub struct AppConfig {
    /// GitLab base URL, e.g. "https://gitlab.example.com".
    pub gitlab_url: String,
    /// Project access token used for API calls and clone URLs.
    pub gitlab_token: String,
    /// Clone workspace for the agent; relative paths resolve against
    /// `project_root`.
    pub repo_workspace: String,
    /// Review agent executable name.
    pub opencode_cmd: String,
    /// Agent `--log-level`; empty to omit.
    pub opencode_log_level: String,
    /// Agent `--model` (`provider/model`); empty to omit.
    pub opencode_model: String,
    pub host: String,
    pub port: u16,
    /// Wall-clock budget for one agent run, seconds.
    pub review_timeout_secs: u64,
    /// Per-call timeout for GitLab API requests, seconds.
    pub api_timeout_secs: u64,
    /// Optional log file path; empty disables the file layer.
    pub log_file: String,
    /// Our own project root: the agent's working directory.
    pub project_root: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            gitlab_url: env_str("GITLAB_URL", "http://localhost"),
            gitlab_token: env_str("GITLAB_TOKEN", ""),
            repo_workspace: env_str("REPO_WORKSPACE", "repos"),
            opencode_cmd: env_str("OPENCODE_CMD", "opencode"),
            opencode_log_level: env_str("OPENCODE_LOG_LEVEL", "WARN"),
            opencode_model: env_str("OPENCODE_MODEL", ""),
            host: env_str("HOST", "0.0.0.0"),
            port: env_parse("PORT", 5000),
            review_timeout_secs: env_parse("REVIEW_TIMEOUT", 600),
            api_timeout_secs: env_parse("API_TIMEOUT", 10),
            log_file: env_str("LOG_FILE", ""),
            project_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Absolute path of the agent clone workspace.
    pub fn repo_workspace_path(&self) -> PathBuf {
        let path = Path::new(&self.repo_workspace);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Malformed values fall back to the default rather than failing boot.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Shared state for all HTTP handlers.
pub struct AppState {
    pub config: AppConfig,
    pub gitlab: GitLabClient,
    pub locks: ProjectLocks,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self, GitLabClientError> {
        let gitlab = GitLabClient::new(
            &config.gitlab_url,
            &config.gitlab_token,
            Duration::from_secs(config.api_timeout_secs),
        )?;
        Ok(Self {
            config,
            gitlab,
            locks: ProjectLocks::new(),
        })
    }
}
