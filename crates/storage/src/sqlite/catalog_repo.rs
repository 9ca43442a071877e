use sqlx::Row;

use hub_core::model::{Lesson, LessonId};

use super::{
    SqliteRepository,
    mapping::{encode_names, map_question_row, ser, u32_to_i64},
};
use crate::repository::{LessonCatalog, StorageError};

impl SqliteRepository {
    /// Persist or replace a catalog lesson together with its quiz.
    ///
    /// Questions are rewritten wholesale; their position column preserves
    /// authoring order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lesson cannot be stored.
    pub async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        let lesson_id = i64::try_from(lesson.id().value())
            .map_err(|_| StorageError::Serialization("lesson_id overflow".into()))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO lessons (id, lesson_order, title)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                lesson_order = excluded.lesson_order,
                title = excluded.title
            ",
        )
        .bind(lesson_id)
        .bind(u32_to_i64(lesson.order()))
        .bind(lesson.title().to_owned())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query("DELETE FROM quiz_questions WHERE lesson_id = ?1")
            .bind(lesson_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        for (position, question) in lesson.quiz().iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO quiz_questions (
                    lesson_id, position, question, correct_answer,
                    accepted_keywords, explanation, hint
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
            )
            .bind(lesson_id)
            .bind(i64::try_from(position).map_err(ser)?)
            .bind(question.question.clone())
            .bind(question.correct_answer.clone())
            .bind(encode_names(&question.accepted_keywords)?)
            .bind(question.explanation.clone())
            .bind(question.hint.clone())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait::async_trait]
impl LessonCatalog for SqliteRepository {
    async fn count_lessons(&self) -> Result<u32, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM lessons")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let count: i64 = row.try_get("n").map_err(ser)?;
        u32::try_from(count)
            .map_err(|_| StorageError::Serialization("lesson count out of range".into()))
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Lesson, StorageError> {
        let lesson_id = i64::try_from(id.value())
            .map_err(|_| StorageError::Serialization("lesson_id overflow".into()))?;

        let row = sqlx::query("SELECT id, lesson_order, title FROM lessons WHERE id = ?1")
            .bind(lesson_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .ok_or(StorageError::NotFound)?;

        let order = u32::try_from(row.try_get::<i64, _>("lesson_order").map_err(ser)?)
            .map_err(|_| StorageError::Serialization("lesson_order out of range".into()))?;
        let title: String = row.try_get("title").map_err(ser)?;

        let question_rows = sqlx::query(
            r"
            SELECT question, correct_answer, accepted_keywords, explanation, hint
            FROM quiz_questions
            WHERE lesson_id = ?1
            ORDER BY position
            ",
        )
        .bind(lesson_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut quiz = Vec::with_capacity(question_rows.len());
        for row in &question_rows {
            quiz.push(map_question_row(row)?);
        }

        Lesson::new(id, order, title, quiz).map_err(ser)
    }
}
