//! Shared error types for the services crate.

use thiserror::Error;

use hub_core::model::ProgressError;
use storage::repository::StorageError;

/// Errors emitted by the answer grading backend.
///
/// These never escape `ProgressService::submit_quiz`: a failed grading call
/// is recovered locally by marking the answer incorrect.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraderError {
    #[error("grading backend is not configured")]
    Disabled,
    #[error("grading request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("grading backend returned an empty response")]
    EmptyResponse,
    #[error("grading backend returned a malformed verdict: {0}")]
    MalformedVerdict(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    /// The lesson referenced by a quiz submission does not exist.
    #[error("lesson not found")]
    LessonNotFound,

    /// The lesson exists but carries no quiz, so there is nothing to grade.
    #[error("lesson has no quiz to grade")]
    EmptyQuiz,

    /// Every save attempt lost the race against another writer for the same
    /// user. Transient; the caller should retry the whole operation.
    #[error("progress update lost {attempts} consecutive write races")]
    SaveContention { attempts: u32 },

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
