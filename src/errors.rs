//! Typed error hierarchy for the backspace pipeline.
//!
//! Three subsystem enums plus one orchestration-level wrapper:
//! - `GitHubError` — source-control adapter failures
//! - `ModelError` — model adapter failures
//! - `WorkspaceError` — working-copy failures
//! - `JobError` — everything a job can terminate with; `kind()` yields the
//!   name carried in the terminal error event

use thiserror::Error;

/// Errors from the source-control adapter. Variants follow the operation
/// that produced them, so the mapping to an event kind needs no context.
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication with the source-control service failed: {0}")]
    AuthFailed(String),

    #[error("Branch already exists on the remote: {0}")]
    AlreadyExists(String),

    #[error("Source-control service rejected the object: {0}")]
    Invalid(String),

    #[error("Branch update is not a fast-forward: {0}")]
    NonFastForward(String),

    #[error("Pull request was rejected: {0}")]
    ValidationFailed(String),

    #[error("Source-control service unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected source-control response ({status}): {body}")]
    Api { status: u16, body: String },
}

/// Errors from the model adapter.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model service unavailable: {0}")]
    Unavailable(String),

    #[error("Model returned an unparseable response: {0}")]
    Unparseable(String),

    #[error("Model returned no completion content")]
    NoChanges,
}

/// Errors from the working copy on disk.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to clone repository: {0}")]
    CloneFailed(String),

    #[error("Failed to create local branch {branch}: {message}")]
    BranchCreateFailed { branch: String, message: String },

    #[error("Push was not accepted by the remote: {0}")]
    PushFailed(String),

    #[error("Nothing to commit: the edit plan produced no effective changes")]
    NoEffectiveChanges,

    #[error("Filesystem error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Edit path is not usable inside the workspace: {0}")]
    InvalidPath(std::path::PathBuf),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Terminal failure of one job. The failing pipeline state is attached by
/// the orchestrator when it emits the error event.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid repository URL: {0}")]
    InvalidRepoUrl(String),

    #[error("Invalid edit plan: {path}: {rule}")]
    InvalidEditPlan { path: String, rule: String },

    #[error("Job exceeded its deadline of {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("Job was cancelled by the caller")]
    Cancelled,

    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

impl JobError {
    /// Taxonomy name carried in the terminal error event payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRepoUrl(_) => "InvalidRepoURL",
            Self::InvalidEditPlan { .. } => "InvalidEditPlan",
            Self::Timeout { .. } => "Timeout",
            Self::Cancelled => "Cancelled",
            Self::GitHub(e) => match e {
                GitHubError::NotFound(_) => "UpstreamUnavailable",
                GitHubError::AuthFailed(_) => "AuthFailed",
                GitHubError::AlreadyExists(_) => "PushRejected",
                GitHubError::Invalid(_) => "PushRejected",
                GitHubError::NonFastForward(_) => "PushRejected",
                GitHubError::ValidationFailed(_) => "ValidationFailed",
                GitHubError::Unavailable(_) => "UpstreamUnavailable",
                GitHubError::Api { .. } => "UpstreamUnavailable",
            },
            Self::Model(e) => match e {
                ModelError::Unavailable(_) => "ModelUnavailable",
                ModelError::Unparseable(_) => "ModelReturnedUnparseable",
                ModelError::NoChanges => "ModelReturnedNoChanges",
            },
            Self::Workspace(e) => match e {
                WorkspaceError::CloneFailed(_) => "CloneFailed",
                WorkspaceError::BranchCreateFailed { .. } => "BranchCreateFailed",
                WorkspaceError::PushFailed(_) => "PushRejected",
                WorkspaceError::NoEffectiveChanges => "NoEffectiveChanges",
                WorkspaceError::Io { .. }
                | WorkspaceError::InvalidPath(_)
                | WorkspaceError::Git(_)
                | WorkspaceError::Other(_) => "WorkspaceFailed",
            },
        }
    }
}
