//! Supervision of the external review agent.
//!
//! The agent (OpenCode by default) is a black-box CLI: it receives a
//! prompt with the repository context, clones and diffs the target
//! itself, and prints the review to stdout. This crate spawns the
//! agent, streams its output, and enforces the wall-clock timeout.

pub mod clone_url;
pub mod errors;
pub mod prompts;
pub mod runner;

pub use clone_url::build_clone_url;
pub use errors::AgentError;
pub use runner::{AgentConfig, ExecutionResult, run_review};
