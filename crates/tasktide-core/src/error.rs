//! Error types for tasktide.
//!
//! Exit codes used by the command-line front end:
//! - 0: success
//! - 1: backend, transport, or storage failure
//! - 2: user error (invalid input, unknown task, task busy, bad config)

use std::path::PathBuf;

use thiserror::Error;

use crate::task::TaskId;
use crate::validate::FieldErrors;

pub mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const OPERATION_FAILED: u8 = 1;
    pub const USER_ERROR: u8 = 2;
}

#[derive(Error, Debug)]
pub enum Error {
    // Backend and transport failures
    #[error("request to task backend failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("task backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{0}")]
    Rejected(String),

    #[error("malformed task record: {0}")]
    MalformedRecord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // User-facing failures
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("task form is invalid: {0}")]
    Invalid(FieldErrors),

    #[error("another operation is already running for task {0}")]
    Busy(TaskId),

    #[error("a task is already being saved")]
    SubmitInFlight,

    #[error("no task form is open")]
    NoOpenModal,

    #[error("no task is waiting for delete confirmation")]
    NoPendingDelete,

    #[error("no calendar event is selected")]
    NoSelection,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Failures the user can fix by changing input, as opposed to backend faults.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::TaskNotFound(_)
                | Self::Invalid(_)
                | Self::Busy(_)
                | Self::SubmitInFlight
                | Self::NoOpenModal
                | Self::NoPendingDelete
                | Self::NoSelection
                | Self::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Exit code for an error that bubbled up to the command-line front end.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<Error>() {
        Some(inner) if inner.is_user_error() => exit_codes::USER_ERROR,
        _ => exit_codes::OPERATION_FAILED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_and_invalid_are_user_errors() {
        assert!(Error::Busy(TaskId::from("7")).is_user_error());
        assert!(Error::Invalid(FieldErrors::default()).is_user_error());
        assert!(!Error::Rejected("boom".to_string()).is_user_error());
    }

    #[test]
    fn exit_code_looks_through_anyhow_context() {
        let err = anyhow::Error::new(Error::TaskNotFound(TaskId::from("9")))
            .context("failed to toggle task");
        assert_eq!(exit_code(&err), exit_codes::USER_ERROR);

        let err = anyhow::anyhow!("disk on fire");
        assert_eq!(exit_code(&err), exit_codes::OPERATION_FAILED);
    }
}
