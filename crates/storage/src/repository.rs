use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use hub_core::Badge;
use hub_core::model::{Lesson, LessonId, LessonProgress, UserId};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// A conditional save lost the race against a concurrent writer for the
    /// same user. The caller should reload and retry the whole operation.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persisted shape for a progress record.
///
/// Mirrors the domain `LessonProgress` so repositories can serialize and
/// deserialize without leaking storage concerns into the domain layer. Badges
/// are kept as their display names; unknown names fail the load rather than
/// being dropped silently.
#[derive(Debug, Clone)]
pub struct ProgressRecord {
    pub user_id: UserId,
    pub completed_lessons: Vec<u32>,
    pub unlocked_lessons: Vec<u32>,
    pub current_lesson: u32,
    pub badges: Vec<String>,
    pub streak_count: u32,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub last_activity_date: DateTime<Utc>,
    pub completion_percentage: u8,
    pub training_complete: bool,
    pub version: u64,
}

impl ProgressRecord {
    #[must_use]
    pub fn from_progress(progress: &LessonProgress) -> Self {
        Self {
            user_id: progress.user_id(),
            completed_lessons: progress.completed_lessons().iter().copied().collect(),
            unlocked_lessons: progress.unlocked_lessons().iter().copied().collect(),
            current_lesson: progress.current_lesson(),
            badges: progress
                .badges()
                .iter()
                .map(|badge| badge.as_str().to_owned())
                .collect(),
            streak_count: progress.streak_count(),
            last_completed_at: progress.last_completed_at(),
            last_activity_date: progress.last_activity_date(),
            completion_percentage: progress.completion_percentage(),
            training_complete: progress.training_complete(),
            version: progress.version(),
        }
    }

    /// Convert the record back into a domain `LessonProgress`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if a persisted badge name is
    /// not recognized.
    pub fn into_progress(self) -> Result<LessonProgress, StorageError> {
        let badges = self
            .badges
            .iter()
            .map(|name| {
                name.parse::<Badge>()
                    .map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .collect::<Result<BTreeSet<Badge>, _>>()?;

        Ok(LessonProgress::from_persisted(
            self.user_id,
            self.completed_lessons.into_iter().collect(),
            self.unlocked_lessons.into_iter().collect(),
            self.current_lesson,
            badges,
            self.streak_count,
            self.last_completed_at,
            self.last_activity_date,
            self.training_complete,
            self.version,
        ))
    }
}

/// Repository contract for progress records.
///
/// `save` is conditional on the record's version: it succeeds only when the
/// stored version still equals the snapshot's (or the record is absent and
/// the snapshot is fresh), and increments the stored version on success.
/// This is what serializes concurrent completion events for one user.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch a user's progress, or `None` if they have none yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be read.
    async fn load(&self, user_id: UserId) -> Result<Option<LessonProgress>, StorageError>;

    /// Conditionally persist a progress snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when the snapshot is stale, or other
    /// storage errors.
    async fn save(&self, progress: &LessonProgress) -> Result<(), StorageError>;
}

/// Read-only view of the lesson catalog the gating engine consults.
#[async_trait]
pub trait LessonCatalog: Send + Sync {
    /// Number of lessons currently in the catalog; the final-lesson
    /// boundary.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be read.
    async fn count_lessons(&self) -> Result<u32, StorageError>;

    /// Fetch a lesson (order plus quiz) by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_lesson(&self, id: LessonId) -> Result<Lesson, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<HashMap<UserId, LessonProgress>>>,
    lessons: Arc<Mutex<BTreeMap<LessonId, Lesson>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a lesson into the catalog, replacing any previous entry with the
    /// same id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the catalog lock is poisoned.
    pub fn insert_lesson(&self, lesson: Lesson) -> Result<(), StorageError> {
        let mut guard = self
            .lessons
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(lesson.id(), lesson);
        Ok(())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn load(&self, user_id: UserId) -> Result<Option<LessonProgress>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&user_id).cloned())
    }

    async fn save(&self, progress: &LessonProgress) -> Result<(), StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let stored_version = guard.get(&progress.user_id()).map(LessonProgress::version);
        let expected = match stored_version {
            Some(version) => version,
            None => 0,
        };
        if progress.version() != expected {
            return Err(StorageError::Conflict);
        }

        guard.insert(progress.user_id(), progress.clone().with_next_version());
        Ok(())
    }
}

#[async_trait]
impl LessonCatalog for InMemoryRepository {
    async fn count_lessons(&self) -> Result<u32, StorageError> {
        let guard = self
            .lessons
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        u32::try_from(guard.len())
            .map_err(|_| StorageError::Serialization("lesson count overflow".into()))
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Lesson, StorageError> {
        let guard = self
            .lessons
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }
}

/// Aggregates the progress store and lesson catalog behind trait objects for
/// easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub lessons: Arc<dyn LessonCatalog>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let lessons: Arc<dyn LessonCatalog> = Arc::new(repo);
        Self { progress, lessons }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::time::fixed_now;

    fn build_lesson(id: u64, order: u32) -> Lesson {
        Lesson::new(LessonId::new(id), order, format!("Lesson {order}"), vec![]).unwrap()
    }

    #[tokio::test]
    async fn load_returns_none_for_unknown_user() {
        let repo = InMemoryRepository::new();
        let loaded = repo.load(UserId::random()).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn save_then_load_round_trips_with_bumped_version() {
        let repo = InMemoryRepository::new();
        let user_id = UserId::random();
        let mut progress = LessonProgress::new(user_id, fixed_now());
        progress
            .apply_completion(1, None, hub_core::model::TOTAL_LESSONS, fixed_now())
            .unwrap();

        repo.save(&progress).await.unwrap();

        let loaded = repo.load(user_id).await.unwrap().unwrap();
        assert_eq!(loaded.version(), 1);
        assert!(loaded.completed_lessons().contains(&1));
        assert_eq!(loaded.current_lesson(), 2);
    }

    #[tokio::test]
    async fn stale_snapshot_save_conflicts() {
        let repo = InMemoryRepository::new();
        let user_id = UserId::random();
        let fresh = LessonProgress::new(user_id, fixed_now());

        repo.save(&fresh).await.unwrap();

        // The snapshot still carries version 0 but the store is at 1.
        let err = repo.save(&fresh).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        // Reloading picks up the committed version and the save goes through.
        let reloaded = repo.load(user_id).await.unwrap().unwrap();
        repo.save(&reloaded).await.unwrap();
        let latest = repo.load(user_id).await.unwrap().unwrap();
        assert_eq!(latest.version(), 2);
    }

    #[tokio::test]
    async fn catalog_counts_and_fetches_lessons() {
        let repo = InMemoryRepository::new();
        for id in 1..=3u64 {
            repo.insert_lesson(build_lesson(id, u32::try_from(id).unwrap()))
                .unwrap();
        }

        assert_eq!(repo.count_lessons().await.unwrap(), 3);
        let lesson = repo.get_lesson(LessonId::new(2)).await.unwrap();
        assert_eq!(lesson.order(), 2);

        let err = repo.get_lesson(LessonId::new(99)).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[test]
    fn record_round_trips_badges_by_name() {
        let user_id = UserId::random();
        let mut progress = LessonProgress::new(user_id, fixed_now());
        progress.grant_badge(Badge::JoinedHub);
        progress.grant_badge(Badge::Apprentice);
        progress.unlock_lesson(101);

        let record = ProgressRecord::from_progress(&progress);
        assert!(record.badges.contains(&"Apprentice Badge".to_owned()));

        let back = record.into_progress().unwrap();
        assert_eq!(back, progress);
    }

    #[test]
    fn record_with_unknown_badge_fails_to_load() {
        let user_id = UserId::random();
        let progress = LessonProgress::new(user_id, fixed_now());
        let mut record = ProgressRecord::from_progress(&progress);
        record.badges.push("Best Dishwasher".to_owned());

        let err = record.into_progress().unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
