mod ids;
mod lesson;
mod progress;
mod quiz;

pub use ids::{LessonId, ParseIdError, UserId};
pub use lesson::{Lesson, LessonError};
pub use progress::{CompletionOutcome, LessonProgress, ProgressError, TOTAL_LESSONS};
pub use quiz::{GradedAnswer, QuizQuestion};
