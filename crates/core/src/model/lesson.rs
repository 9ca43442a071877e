use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{LessonId, QuizQuestion};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LessonError {
    #[error("lesson order must be a positive integer")]
    InvalidOrder,
    #[error("lesson title must not be empty")]
    EmptyTitle,
}

/// Catalog entry for one lesson: its gating order and its quiz, which is all
/// the progress engine reads. Content (video, recipe text) lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    id: LessonId,
    order: u32,
    title: String,
    quiz: Vec<QuizQuestion>,
}

impl Lesson {
    /// Create a lesson entry.
    ///
    /// # Errors
    ///
    /// Returns `LessonError` for order 0 or an empty title.
    pub fn new(
        id: LessonId,
        order: u32,
        title: impl Into<String>,
        quiz: Vec<QuizQuestion>,
    ) -> Result<Self, LessonError> {
        if order == 0 {
            return Err(LessonError::InvalidOrder);
        }
        let title = title.into();
        if title.trim().is_empty() {
            return Err(LessonError::EmptyTitle);
        }
        Ok(Self {
            id,
            order,
            title,
            quiz,
        })
    }

    #[must_use]
    pub fn id(&self) -> LessonId {
        self.id
    }

    /// Position in the curriculum sequence; doubles as the gating key.
    #[must_use]
    pub fn order(&self) -> u32 {
        self.order
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn quiz(&self) -> &[QuizQuestion] {
        &self.quiz
    }
}
