use thiserror::Error;

/// Failures while launching or supervising the agent process.
///
/// A timeout is not an error: the runner reports it as
/// [`crate::ExecutionResult::TimedOut`] so the caller can distinguish
/// "agent never finished" from "supervisor broke".
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to create repo workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("failed to spawn review agent: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to wait for review agent: {0}")]
    Wait(#[source] std::io::Error),

    #[error("review agent {0} pipe was not captured")]
    MissingPipe(&'static str),
}
