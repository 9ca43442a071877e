#![forbid(unsafe_code)]

pub mod error;
pub mod grader;
pub mod progress_service;

pub use hub_core::Clock;

pub use error::{GraderError, ProgressServiceError};
pub use grader::{AiGrader, AiGraderConfig, AnswerGrader, KeywordGrader};
pub use progress_service::{ProgressDelta, ProgressService, QuizOutcome};
