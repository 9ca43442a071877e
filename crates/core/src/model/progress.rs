use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::badges::{self, Badge};
use crate::model::UserId;
use crate::streak;

/// Size of the core curriculum; the denominator for completion percentage.
/// Reward recipes (order > this) do not change the denominator.
pub const TOTAL_LESSONS: u32 = 30;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("lesson order must be a positive integer")]
    InvalidLessonOrder,
    #[error("quiz score must be within 0-100, got {provided}")]
    InvalidQuizScore { provided: u8 },
}

//
// ─── COMPLETION OUTCOME ────────────────────────────────────────────────────────
//

/// Delta produced by a single completion event, for caller-facing
/// notifications.
///
/// `newly_completed` is true only the first time a lesson order enters the
/// completed set; repeat submissions of the same lesson report false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub newly_completed: bool,
    pub newly_awarded: Vec<Badge>,
    pub newly_unlocked_rewards: Vec<u32>,
}

//
// ─── PROGRESS RECORD ───────────────────────────────────────────────────────────
//

/// Per-user progress record: the single mutable document the gating engine
/// owns.
///
/// Invariants held by construction:
///
/// - lesson 1 is always unlocked
/// - `completed_lessons`, `unlocked_lessons`, and `badges` only ever grow
/// - `current_lesson` never decreases
/// - `completion_percentage` is recomputed on every mutation, never stored
///   independently
///
/// The `version` field is an optimistic-concurrency token: repositories
/// accept a save only when the stored version matches the snapshot this
/// record was loaded from, so racing writers for the same user cannot
/// double-apply a completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgress {
    user_id: UserId,
    completed_lessons: BTreeSet<u32>,
    unlocked_lessons: BTreeSet<u32>,
    current_lesson: u32,
    badges: BTreeSet<Badge>,
    streak_count: u32,
    last_completed_at: Option<DateTime<Utc>>,
    last_activity_date: DateTime<Utc>,
    completion_percentage: u8,
    training_complete: bool,
    version: u64,
}

impl LessonProgress {
    /// Fresh record with the defaults a first read or first completion
    /// initializes: lesson 1 unlocked, pointer at lesson 1, no badges, no
    /// streak. Badges are empty on purpose; the baseline badge is granted by
    /// the first rule evaluation.
    #[must_use]
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            completed_lessons: BTreeSet::new(),
            unlocked_lessons: BTreeSet::from([1]),
            current_lesson: 1,
            badges: BTreeSet::new(),
            streak_count: 0,
            last_completed_at: None,
            last_activity_date: now,
            completion_percentage: 0,
            training_complete: false,
            version: 0,
        }
    }

    /// Rebuild a record from storage.
    ///
    /// Defensive normalization mirrors initialization: lesson 1 is forced
    /// into the unlocked set and the percentage is recomputed rather than
    /// trusted.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        user_id: UserId,
        completed_lessons: BTreeSet<u32>,
        unlocked_lessons: BTreeSet<u32>,
        current_lesson: u32,
        badges: BTreeSet<Badge>,
        streak_count: u32,
        last_completed_at: Option<DateTime<Utc>>,
        last_activity_date: DateTime<Utc>,
        training_complete: bool,
        version: u64,
    ) -> Self {
        let mut progress = Self {
            user_id,
            completed_lessons,
            unlocked_lessons,
            current_lesson: current_lesson.max(1),
            badges,
            streak_count,
            last_completed_at,
            last_activity_date,
            completion_percentage: 0,
            training_complete,
            version,
        };
        progress.unlocked_lessons.insert(1);
        progress.recompute_percentage();
        progress
    }

    // ─── Accessors ─────────────────────────────────────────────────────────

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn completed_lessons(&self) -> &BTreeSet<u32> {
        &self.completed_lessons
    }

    /// Number of completed lessons, saturated into `u32`.
    #[must_use]
    pub fn completed_count(&self) -> u32 {
        u32::try_from(self.completed_lessons.len()).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn unlocked_lessons(&self) -> &BTreeSet<u32> {
        &self.unlocked_lessons
    }

    #[must_use]
    pub fn current_lesson(&self) -> u32 {
        self.current_lesson
    }

    #[must_use]
    pub fn badges(&self) -> &BTreeSet<Badge> {
        &self.badges
    }

    #[must_use]
    pub fn has_badge(&self, badge: Badge) -> bool {
        self.badges.contains(&badge)
    }

    #[must_use]
    pub fn streak_count(&self) -> u32 {
        self.streak_count
    }

    #[must_use]
    pub fn last_completed_at(&self) -> Option<DateTime<Utc>> {
        self.last_completed_at
    }

    #[must_use]
    pub fn last_activity_date(&self) -> DateTime<Utc> {
        self.last_activity_date
    }

    #[must_use]
    pub fn completion_percentage(&self) -> u8 {
        self.completion_percentage
    }

    #[must_use]
    pub fn training_complete(&self) -> bool {
        self.training_complete
    }

    /// Optimistic-concurrency token; the number of saves this snapshot has
    /// behind it.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The record as it exists after a successful conditional save.
    /// Repositories commit this shape; everything but the version is
    /// unchanged.
    #[must_use]
    pub fn with_next_version(mut self) -> Self {
        self.version += 1;
        self
    }

    // ─── Mutators ──────────────────────────────────────────────────────────

    /// Add a lesson to the completed set. Returns true if it was not already
    /// there. Keeps the derived percentage in sync.
    pub fn record_completion(&mut self, lesson_order: u32) -> bool {
        let inserted = self.completed_lessons.insert(lesson_order);
        self.recompute_percentage();
        inserted
    }

    /// Add a badge. Idempotent; returns true only on first grant.
    pub fn grant_badge(&mut self, badge: Badge) -> bool {
        self.badges.insert(badge)
    }

    /// Add a lesson to the unlocked set. Idempotent; returns true only when
    /// the unlock is new.
    pub fn unlock_lesson(&mut self, lesson_order: u32) -> bool {
        self.unlocked_lessons.insert(lesson_order)
    }

    // ─── Completion transition ─────────────────────────────────────────────

    /// Precondition checks shared by callers that want to reject bad input
    /// before touching any state.
    ///
    /// # Errors
    ///
    /// `InvalidLessonOrder` for order 0; `InvalidQuizScore` for a score
    /// above 100.
    pub fn validate_completion(
        lesson_order: u32,
        quiz_score: Option<u8>,
    ) -> Result<(), ProgressError> {
        if lesson_order == 0 {
            return Err(ProgressError::InvalidLessonOrder);
        }
        if let Some(provided) = quiz_score {
            if provided > 100 {
                return Err(ProgressError::InvalidQuizScore { provided });
            }
        }
        Ok(())
    }

    /// Apply one completion event: the full gating transition.
    ///
    /// Marks the lesson complete (deduped), updates the streak, advances the
    /// pointer and unlocks the successor when the lesson is not the last in
    /// the catalog, maintains `training_complete` against the current
    /// curriculum size, then runs the badge rules. The derived percentage is
    /// recomputed before returning.
    ///
    /// `total_lessons` is the catalog size *right now*; a lesson order at or
    /// past it is final. A record previously marked complete flips back to
    /// incomplete when the catalog has grown past the old maximum.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` for an invalid lesson order or quiz score,
    /// in which case nothing is mutated.
    pub fn apply_completion(
        &mut self,
        lesson_order: u32,
        quiz_score: Option<u8>,
        total_lessons: u32,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, ProgressError> {
        Self::validate_completion(lesson_order, quiz_score)?;

        let newly_completed = self.completed_lessons.insert(lesson_order);

        self.streak_count = streak::update_streak(self.last_completed_at, self.streak_count, now);
        self.last_completed_at = Some(now);
        self.last_activity_date = now;

        let is_final = lesson_order >= total_lessons;
        if is_final {
            self.training_complete = true;
        } else {
            let next_lesson = lesson_order + 1;
            if self.current_lesson <= lesson_order {
                self.current_lesson = next_lesson;
            }
            self.unlocked_lessons.insert(next_lesson);
            // The catalog has grown past the old maximum; a stale "complete"
            // flag no longer holds.
            self.training_complete = false;
        }

        let awarded = badges::award_badges(self, quiz_score);
        self.recompute_percentage();

        Ok(CompletionOutcome {
            newly_completed,
            newly_awarded: awarded.badges,
            newly_unlocked_rewards: awarded.reward_lessons,
        })
    }

    fn recompute_percentage(&mut self) {
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let percentage =
            ((self.completed_lessons.len() as f64 / f64::from(TOTAL_LESSONS)) * 100.0).round()
                as u8;
        self.completion_percentage = percentage.min(100);
    }

    #[cfg(test)]
    pub(crate) fn set_streak_for_test(&mut self, streak: u32) {
        self.streak_count = streak;
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
