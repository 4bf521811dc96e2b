use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::db::{DbPool, Log};

const LOG_COLUMNS: &str = "id, trig_id, user_id, visit_date, comment, condition, created_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewLog {
    pub trig_id: i64,
    pub user_id: i64,
    pub visit_date: Option<NaiveDate>,
    #[serde(default)]
    pub comment: String,
    #[serde(default = "default_condition")]
    pub condition: String,
}

fn default_condition() -> String {
    "G".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogUpdate {
    pub visit_date: Option<NaiveDate>,
    pub comment: Option<String>,
    pub condition: Option<String>,
}

/// A removed log together with the photos that were soft-deleted with it.
#[derive(Debug, Clone)]
pub struct DeletedLog {
    pub log: Log,
    pub photo_ids: Vec<i64>,
}

pub async fn create_log(pool: &DbPool, log: &NewLog) -> Result<Log, sqlx::Error> {
    sqlx::query_as::<_, Log>(&format!(
        "INSERT INTO logs (trig_id, user_id, visit_date, comment, condition, created_at)
         VALUES (?, ?, ?, ?, ?, ?) RETURNING {}",
        LOG_COLUMNS
    ))
    .bind(log.trig_id)
    .bind(log.user_id)
    .bind(log.visit_date)
    .bind(&log.comment)
    .bind(&log.condition)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

pub async fn find_log(pool: &DbPool, id: i64) -> Result<Option<Log>, sqlx::Error> {
    sqlx::query_as::<_, Log>(&format!("SELECT {} FROM logs WHERE id = ?", LOG_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn update_log(
    pool: &DbPool,
    id: i64,
    update: &LogUpdate,
) -> Result<Option<Log>, sqlx::Error> {
    sqlx::query_as::<_, Log>(&format!(
        "UPDATE logs SET visit_date = COALESCE(?, visit_date), comment = COALESCE(?, comment),
         condition = COALESCE(?, condition) WHERE id = ? RETURNING {}",
        LOG_COLUMNS
    ))
    .bind(update.visit_date)
    .bind(&update.comment)
    .bind(&update.condition)
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Soft-deletes every photo of the log, then hard-deletes the log, in one
/// transaction. Returns `None` when the log does not exist.
pub async fn delete_log_cascade(pool: &DbPool, id: i64) -> Result<Option<DeletedLog>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let log = match sqlx::query_as::<_, Log>(&format!("SELECT {} FROM logs WHERE id = ?", LOG_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
    {
        Some(log) => log,
        None => return Ok(None),
    };

    let photo_ids: Vec<i64> = sqlx::query_scalar(
        "UPDATE photos SET deleted = TRUE, updated_at = ? WHERE log_id = ? AND deleted = FALSE RETURNING id",
    )
    .bind(Utc::now())
    .bind(id)
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM logs WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Some(DeletedLog { log, photo_ids }))
}
