use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArmadaError {
    #[error("Mission not found: {repo}/{mission_id}")]
    MissionNotFound { repo: String, mission_id: String },

    #[error("Objective not found: {mission_id}/{item_id}")]
    ItemNotFound { mission_id: String, item_id: String },

    #[error("Failed to acquire lock on {} after {timeout_ms}ms", path.display())]
    LockTimeout { path: PathBuf, timeout_ms: u64 },

    #[error("Invalid mission state: expected {expected}, got {actual}")]
    InvalidMissionState { expected: String, actual: String },

    #[error("Invalid state transition: {from} -> {to} (allowed: {allowed})")]
    InvalidStateTransition {
        from: String,
        to: String,
        allowed: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid repository name: {0}")]
    InvalidRepoName(String),

    #[error("Unsafe {field}: {value}")]
    UnsafeRef { field: String, value: String },

    #[error("Dependency graph error: {0}")]
    DependencyGraph(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Worktree error: {message}")]
    Worktree { message: String, path: PathBuf },

    #[error("Planning failed: {0}")]
    Planning(String),

    #[error("Worker execution failed: {0}")]
    Worker(String),

    #[error("Merge conflict on {branch}: {message}")]
    MergeConflict { branch: String, message: String },

    #[error("Pull request error: {0}")]
    PullRequest(String),

    #[error("Evidence bundle invalid: {0}")]
    Evidence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl ArmadaError {
    /// Lock contention is the one store error callers are expected to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, ArmadaError>;
