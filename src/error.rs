//! Error types for the agent manager.

use std::path::PathBuf;

/// Top-level error type shared by the setup wizard and the control panel.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An external command could not be spawned or reported failure.
    #[error("command `{program}` failed: {message}")]
    Command { program: String, message: String },

    /// Release feed or artifact download error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Downloaded archive is missing, empty or corrupt.
    #[error("archive error: {0}")]
    Archive(String),

    /// Install plan failed validation.
    #[error("invalid install plan: {0}")]
    Plan(String),

    /// A required helper tool (Chocolatey, NSSM) is unavailable.
    #[error("prerequisite missing: {0}")]
    Prerequisite(String),

    /// An expected file or directory does not exist.
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The operation was cancelled by the user.
    #[error("operation cancelled")]
    Cancelled,

    /// A background worker thread panicked.
    #[error("worker failed: {0}")]
    Worker(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ManagerError {
    pub(crate) fn command(program: &str, message: impl Into<String>) -> Self {
        ManagerError::Command {
            program: program.to_string(),
            message: message.into(),
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ManagerError>;
