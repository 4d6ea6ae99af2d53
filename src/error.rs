use std::path::PathBuf;
use std::process::ExitCode;

/// Broad failure classes. The CLI only distinguishes these, never variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    InvalidInput,
    ToolMissing,
    ToolTimeout,
    ToolFailure,
    UserCancelled,
    Io,
    Config,
}

/// Errors that cause ghwt to exit with a specific code.
#[derive(Debug, thiserror::Error)]
pub enum ExitError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid GitHub URL: {input}")]
    InvalidUrl { input: String },

    #[error("invalid issue/PR number: {input}")]
    InvalidNumber { input: String },

    #[error("bare number {number} requires --issue or --pr flag")]
    MissingKind { number: String },

    #[error(
        "no {host} remote found; pass a full URL or run inside a repository with a {host} remote"
    )]
    NoRemoteFound { host: String },

    #[error("{tool} is not installed or not on PATH. {hint}")]
    ToolNotFound { tool: String, hint: &'static str },

    #[error("{operation} timed out after {timeout_secs}s ({tool})")]
    Timeout {
        tool: String,
        operation: String,
        timeout_secs: u64,
    },

    #[error("{tool} failed (exit {code}) while {operation}: {message}")]
    ToolFailed {
        tool: String,
        operation: String,
        code: i32,
        message: String,
    },

    #[error("could not parse {tool} response: {detail}")]
    ResponseFormat { tool: String, detail: String },

    #[error("failed to create worktree '{name}': {message}")]
    WorkspaceCreate { name: String, message: String },

    #[error("failed to remove existing worktree '{name}': {message}")]
    RemoveFailed { name: String, message: String },

    #[error("user cancelled: branch '{branch}' already exists")]
    UserCancelled { branch: String },

    #[error("failed to write WT-TASK.md to {}", path.display())]
    TaskFileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template error: {0}")]
    Template(String),
}

impl ExitError {
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidUrl { .. }
            | Self::InvalidNumber { .. }
            | Self::MissingKind { .. }
            | Self::NoRemoteFound { .. } => ErrorClass::InvalidInput,
            Self::ToolNotFound { .. } => ErrorClass::ToolMissing,
            Self::Timeout { .. } => ErrorClass::ToolTimeout,
            Self::ToolFailed { .. }
            | Self::ResponseFormat { .. }
            | Self::WorkspaceCreate { .. }
            | Self::RemoveFailed { .. } => ErrorClass::ToolFailure,
            Self::UserCancelled { .. } => ErrorClass::UserCancelled,
            Self::TaskFileWrite { .. } => ErrorClass::Io,
            Self::Config(_) | Self::Template(_) => ErrorClass::Config,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        match self.class() {
            ErrorClass::UserCancelled => ExitCode::from(1),
            ErrorClass::InvalidInput | ErrorClass::Config => ExitCode::from(2),
            ErrorClass::ToolMissing => ExitCode::from(3),
            ErrorClass::ToolFailure => ExitCode::from(4),
            ErrorClass::ToolTimeout => ExitCode::from(5),
            ErrorClass::Io => ExitCode::from(6),
        }
    }
}
