use hub_core::model::{LessonProgress, UserId};

use super::{
    SqliteRepository,
    mapping::{encode_names, encode_orders, map_progress_row, u32_to_i64, version_to_i64},
};
use crate::repository::{ProgressRecord, ProgressRepository, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn load(&self, user_id: UserId) -> Result<Option<LessonProgress>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                user_id, completed_lessons, unlocked_lessons, current_lesson, badges,
                streak_count, last_completed_at, last_activity_date,
                completion_percentage, training_complete, version
            FROM lesson_progress
            WHERE user_id = ?1
            ",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(map_progress_row(&row)?.into_progress()?)),
            None => Ok(None),
        }
    }

    async fn save(&self, progress: &LessonProgress) -> Result<(), StorageError> {
        let record = ProgressRecord::from_progress(progress);

        let completed = encode_orders(&record.completed_lessons)?;
        let unlocked = encode_orders(&record.unlocked_lessons)?;
        let badges = encode_names(&record.badges)?;

        // Version 0 is a record that has never been saved: insert, and treat
        // an existing row as a lost race. Anything else is a conditional
        // update keyed on the version the snapshot was loaded with.
        let result = if record.version == 0 {
            sqlx::query(
                r"
                INSERT INTO lesson_progress (
                    user_id, completed_lessons, unlocked_lessons, current_lesson, badges,
                    streak_count, last_completed_at, last_activity_date,
                    completion_percentage, training_complete, version
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1)
                ON CONFLICT(user_id) DO NOTHING
                ",
            )
            .bind(record.user_id.to_string())
            .bind(completed)
            .bind(unlocked)
            .bind(u32_to_i64(record.current_lesson))
            .bind(badges)
            .bind(u32_to_i64(record.streak_count))
            .bind(record.last_completed_at)
            .bind(record.last_activity_date)
            .bind(i64::from(record.completion_percentage))
            .bind(record.training_complete)
            .execute(&self.pool)
            .await
        } else {
            sqlx::query(
                r"
                UPDATE lesson_progress SET
                    completed_lessons = ?2,
                    unlocked_lessons = ?3,
                    current_lesson = ?4,
                    badges = ?5,
                    streak_count = ?6,
                    last_completed_at = ?7,
                    last_activity_date = ?8,
                    completion_percentage = ?9,
                    training_complete = ?10,
                    version = version + 1
                WHERE user_id = ?1 AND version = ?11
                ",
            )
            .bind(record.user_id.to_string())
            .bind(completed)
            .bind(unlocked)
            .bind(u32_to_i64(record.current_lesson))
            .bind(badges)
            .bind(u32_to_i64(record.streak_count))
            .bind(record.last_completed_at)
            .bind(record.last_activity_date)
            .bind(i64::from(record.completion_percentage))
            .bind(record.training_complete)
            .bind(version_to_i64(record.version)?)
            .execute(&self.pool)
            .await
        };

        let result = result.map_err(|e| StorageError::Connection(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }
}
