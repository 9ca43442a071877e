//! Lesson-progress orchestration: quiz submission, completion, and the
//! optimistic-concurrency retry loop around saves.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use hub_core::model::{GradedAnswer, LessonId, LessonProgress, UserId};
use hub_core::{Badge, Clock};
use storage::{LessonCatalog, ProgressRepository, Storage, StorageError};

use crate::error::ProgressServiceError;
use crate::grader::AnswerGrader;

/// How many times a completion is re-applied against a fresh snapshot before
/// giving up with `SaveContention`.
const MAX_SAVE_ATTEMPTS: u32 = 3;

//
// ─── DELTAS ────────────────────────────────────────────────────────────────────
//

/// Snapshot of a user's progress after a completion, plus what this
/// particular event changed. `newly_awarded` lists only badges granted by
/// this event, so callers can announce each badge exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressDelta {
    pub current_lesson: u32,
    pub completed_lessons: Vec<u32>,
    pub unlocked_lessons: Vec<u32>,
    pub streak_count: u32,
    pub badges: Vec<Badge>,
    pub completion_percentage: u8,
    pub training_complete: bool,
    pub newly_completed: bool,
    pub newly_awarded: Vec<Badge>,
    pub newly_unlocked_rewards: Vec<u32>,
}

/// Result of grading one quiz submission. `progress` is populated only when
/// the submission passed and the completion was recorded.
#[derive(Debug, Clone, Serialize)]
pub struct QuizOutcome {
    pub passed: bool,
    pub all_correct: bool,
    pub quiz_score: u8,
    pub grading: Vec<GradedAnswer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressDelta>,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// The gating engine's front door: everything above storage goes through
/// here.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    progress: Arc<dyn ProgressRepository>,
    lessons: Arc<dyn LessonCatalog>,
}

impl ProgressService {
    #[must_use]
    pub fn new(storage: &Storage, clock: Clock) -> Self {
        Self {
            clock,
            progress: Arc::clone(&storage.progress),
            lessons: Arc::clone(&storage.lessons),
        }
    }

    /// Fetch a user's progress, creating and persisting the default record
    /// on first contact. A concurrent first contact loses the insert race
    /// and reloads the winner's record instead.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn get_or_init(
        &self,
        user_id: UserId,
    ) -> Result<LessonProgress, ProgressServiceError> {
        if let Some(existing) = self.progress.load(user_id).await? {
            return Ok(existing);
        }

        let fresh = LessonProgress::new(user_id, self.clock.now());
        match self.progress.save(&fresh).await {
            Ok(()) => Ok(fresh.with_next_version()),
            Err(StorageError::Conflict) => {
                debug!(%user_id, "lost first-contact insert race, reloading");
                self.progress
                    .load(user_id)
                    .await?
                    .ok_or(ProgressServiceError::Storage(StorageError::NotFound))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record a lesson completion and return the resulting delta.
    ///
    /// The transition is applied to a freshly loaded snapshot and saved
    /// conditionally on its version; a conflicting writer forces a reload
    /// and re-apply, up to `MAX_SAVE_ATTEMPTS` times. Re-applying is safe
    /// because every transition is idempotent on an already-complete lesson.
    ///
    /// # Errors
    ///
    /// `Progress` for invalid inputs (nothing is written), `SaveContention`
    /// when every attempt lost its race, or a storage failure.
    pub async fn complete_lesson(
        &self,
        user_id: UserId,
        lesson_order: u32,
        quiz_score: Option<u8>,
    ) -> Result<ProgressDelta, ProgressServiceError> {
        LessonProgress::validate_completion(lesson_order, quiz_score)?;

        let total_lessons = self.lessons.count_lessons().await?;
        let now = self.clock.now();

        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            let mut record = match self.progress.load(user_id).await? {
                Some(existing) => existing,
                None => LessonProgress::new(user_id, now),
            };

            let outcome = record.apply_completion(lesson_order, quiz_score, total_lessons, now)?;

            match self.progress.save(&record).await {
                Ok(()) => {
                    debug!(
                        %user_id,
                        lesson_order,
                        streak = record.streak_count(),
                        newly_completed = outcome.newly_completed,
                        "completion recorded"
                    );
                    return Ok(delta(
                        &record,
                        outcome.newly_completed,
                        outcome.newly_awarded,
                        outcome.newly_unlocked_rewards,
                    ));
                }
                Err(StorageError::Conflict) => {
                    warn!(%user_id, lesson_order, attempt, "completion save conflicted, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ProgressServiceError::SaveContention {
            attempts: MAX_SAVE_ATTEMPTS,
        })
    }

    /// Grade a quiz submission and, on a pass, record the lesson completion.
    ///
    /// Answers are graded independently; a grader failure marks that answer
    /// incorrect rather than failing the submission. The pass bar is 80% of
    /// questions, rounded up. A failed submission mutates nothing.
    ///
    /// # Errors
    ///
    /// `LessonNotFound` for an unknown lesson, `EmptyQuiz` when the lesson
    /// has no questions or the answer list is empty, plus anything
    /// `complete_lesson` can return.
    pub async fn submit_quiz(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        answers: &[String],
        grader: &dyn AnswerGrader,
    ) -> Result<QuizOutcome, ProgressServiceError> {
        let lesson = match self.lessons.get_lesson(lesson_id).await {
            Ok(lesson) => lesson,
            Err(StorageError::NotFound) => return Err(ProgressServiceError::LessonNotFound),
            Err(e) => return Err(e.into()),
        };

        let questions = lesson.quiz();
        if questions.is_empty() || answers.is_empty() {
            return Err(ProgressServiceError::EmptyQuiz);
        }

        let mut grading = Vec::with_capacity(questions.len());
        for (question, answer) in questions.iter().zip(answers) {
            match grader.grade(question, answer).await {
                Ok(graded) => grading.push(graded),
                Err(e) => {
                    warn!(%user_id, %lesson_id, error = %e, "grader failed, marking incorrect");
                    grading.push(GradedAnswer::unavailable(question, answer));
                }
            }
        }
        // Unanswered questions count against the score.
        for question in questions.iter().skip(answers.len()) {
            grading.push(GradedAnswer::incorrect(question, "", None));
        }

        let total = u32::try_from(questions.len()).unwrap_or(u32::MAX);
        let correct = u32::try_from(grading.iter().filter(|g| g.correct).count()).unwrap_or(0);
        let required = (total * 4).div_ceil(5);
        let passed = correct >= required;
        let all_correct = correct == total;
        let quiz_score = score_percentage(correct, total);

        debug!(
            %user_id,
            %lesson_id,
            correct,
            total,
            required,
            passed,
            "quiz graded"
        );

        let progress = if passed {
            Some(
                self.complete_lesson(user_id, lesson.order(), Some(quiz_score))
                    .await?,
            )
        } else {
            None
        };

        Ok(QuizOutcome {
            passed,
            all_correct,
            quiz_score,
            grading,
            progress,
        })
    }
}

fn score_percentage(correct: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let score = ((f64::from(correct) / f64::from(total)) * 100.0).round() as u8;
    score.min(100)
}

fn delta(
    record: &LessonProgress,
    newly_completed: bool,
    newly_awarded: Vec<Badge>,
    newly_unlocked_rewards: Vec<u32>,
) -> ProgressDelta {
    ProgressDelta {
        current_lesson: record.current_lesson(),
        completed_lessons: record.completed_lessons().iter().copied().collect(),
        unlocked_lessons: record.unlocked_lessons().iter().copied().collect(),
        streak_count: record.streak_count(),
        badges: record.badges().iter().copied().collect(),
        completion_percentage: record.completion_percentage(),
        training_complete: record.training_complete(),
        newly_completed,
        newly_awarded,
        newly_unlocked_rewards,
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::time::fixed_clock;

    #[test]
    fn pass_bar_is_eighty_percent_rounded_up() {
        // required = ceil(0.8 * total)
        assert_eq!((1_u32 * 4).div_ceil(5), 1);
        assert_eq!((4_u32 * 4).div_ceil(5), 4);
        assert_eq!((5_u32 * 4).div_ceil(5), 4);
        assert_eq!((7_u32 * 4).div_ceil(5), 6);
        assert_eq!((10_u32 * 4).div_ceil(5), 8);
    }

    #[test]
    fn score_percentage_rounds_half_up_and_caps() {
        assert_eq!(score_percentage(0, 5), 0);
        assert_eq!(score_percentage(3, 5), 60);
        assert_eq!(score_percentage(2, 3), 67);
        assert_eq!(score_percentage(5, 5), 100);
        assert_eq!(score_percentage(0, 0), 0);
    }

    #[tokio::test]
    async fn get_or_init_persists_the_default_record() {
        let storage = Storage::in_memory();
        let service = ProgressService::new(&storage, fixed_clock());
        let user = UserId::random();

        let record = service.get_or_init(user).await.unwrap();
        assert_eq!(record.current_lesson(), 1);
        assert_eq!(record.version(), 1);

        let reloaded = service.get_or_init(user).await.unwrap();
        assert_eq!(reloaded.version(), 1);
    }
}
