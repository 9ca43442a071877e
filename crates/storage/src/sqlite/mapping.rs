use chrono::{DateTime, Utc};
use sqlx::Row;

use hub_core::model::{QuizQuestion, UserId};

use crate::repository::{ProgressRecord, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} out of range")))
}

pub(crate) fn u32_to_i64(v: u32) -> i64 {
    i64::from(v)
}

pub(crate) fn version_to_i64(v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization("version overflow".into()))
}

/// Encode a lesson-order list as a JSON array column.
pub(crate) fn encode_orders(orders: &[u32]) -> Result<String, StorageError> {
    serde_json::to_string(orders).map_err(ser)
}

pub(crate) fn decode_orders(field: &'static str, raw: &str) -> Result<Vec<u32>, StorageError> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::Serialization(format!("{field}: {e}")))
}

pub(crate) fn encode_names(names: &[String]) -> Result<String, StorageError> {
    serde_json::to_string(names).map_err(ser)
}

pub(crate) fn decode_names(field: &'static str, raw: &str) -> Result<Vec<String>, StorageError> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::Serialization(format!("{field}: {e}")))
}

pub(crate) fn map_progress_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ProgressRecord, StorageError> {
    let user_id: UserId = row
        .try_get::<String, _>("user_id")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;

    let completed_lessons = decode_orders(
        "completed_lessons",
        &row.try_get::<String, _>("completed_lessons").map_err(ser)?,
    )?;
    let unlocked_lessons = decode_orders(
        "unlocked_lessons",
        &row.try_get::<String, _>("unlocked_lessons").map_err(ser)?,
    )?;
    let badges = decode_names("badges", &row.try_get::<String, _>("badges").map_err(ser)?)?;

    let last_completed_at: Option<DateTime<Utc>> =
        row.try_get("last_completed_at").map_err(ser)?;
    let last_activity_date: DateTime<Utc> = row.try_get("last_activity_date").map_err(ser)?;

    let completion_percentage = u8::try_from(
        row.try_get::<i64, _>("completion_percentage").map_err(ser)?,
    )
    .map_err(|_| StorageError::Serialization("completion_percentage out of range".into()))?;

    let version = u64::try_from(row.try_get::<i64, _>("version").map_err(ser)?)
        .map_err(|_| StorageError::Serialization("version out of range".into()))?;

    Ok(ProgressRecord {
        user_id,
        completed_lessons,
        unlocked_lessons,
        current_lesson: i64_to_u32(
            "current_lesson",
            row.try_get::<i64, _>("current_lesson").map_err(ser)?,
        )?,
        badges,
        streak_count: i64_to_u32(
            "streak_count",
            row.try_get::<i64, _>("streak_count").map_err(ser)?,
        )?,
        last_completed_at,
        last_activity_date,
        completion_percentage,
        training_complete: row.try_get::<bool, _>("training_complete").map_err(ser)?,
        version,
    })
}

pub(crate) fn map_question_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<QuizQuestion, StorageError> {
    let keywords = decode_names(
        "accepted_keywords",
        &row.try_get::<String, _>("accepted_keywords").map_err(ser)?,
    )?;

    Ok(QuizQuestion::new(
        row.try_get::<String, _>("question").map_err(ser)?,
        row.try_get::<String, _>("correct_answer").map_err(ser)?,
        keywords,
        row.try_get::<String, _>("explanation").map_err(ser)?,
        row.try_get::<String, _>("hint").map_err(ser)?,
    ))
}
