use log::{info, warn};
use std::sync::Arc;

use crate::cache::{Invalidator, MutationKind, MutationScope};
use crate::coordinates::GeoError;
use crate::db::logs::{self, DeletedLog, LogUpdate, NewLog};
use crate::db::{trigs, DbPool, Log};

/// Visit conditions recorded against a log, as single-letter codes.
pub const LOG_CONDITIONS: &[&str] = &["G", "S", "D", "T", "N", "X", "Q", "V", "P", "U", "C", "Z", "M", "R"];

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Geo(#[from] GeoError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn validate_condition(condition: &str) -> Result<(), ServiceError> {
    if LOG_CONDITIONS.contains(&condition) {
        Ok(())
    } else {
        Err(ServiceError::Validation(format!(
            "unknown condition code {:?}",
            condition
        )))
    }
}

pub(crate) async fn fan_out(invalidator: &dyn Invalidator, kind: MutationKind, scope: MutationScope) {
    if let Err(e) = invalidator.invalidate(kind, &scope).await {
        warn!("Cache invalidation for {:?} {:?} failed: {}", kind, scope, e);
    }
}

#[derive(Clone)]
pub struct LogService {
    pool: DbPool,
    invalidator: Arc<dyn Invalidator>,
}

impl LogService {
    pub fn new(pool: DbPool, invalidator: Arc<dyn Invalidator>) -> Self {
        Self { pool, invalidator }
    }

    fn log_scope(log: &Log) -> MutationScope {
        MutationScope {
            trig_id: Some(log.trig_id),
            user_id: Some(log.user_id),
            log_id: Some(log.id),
            photo_id: None,
        }
    }

    pub async fn create_log(&self, new_log: NewLog) -> Result<Log, ServiceError> {
        validate_condition(&new_log.condition)?;
        if trigs::find_trig(&self.pool, new_log.trig_id).await?.is_none() {
            return Err(ServiceError::NotFound(format!("trig {}", new_log.trig_id)));
        }

        let log = logs::create_log(&self.pool, &new_log).await?;
        info!("Created log {} for trig {} by user {}", log.id, log.trig_id, log.user_id);

        fan_out(self.invalidator.as_ref(), MutationKind::Log, Self::log_scope(&log)).await;
        Ok(log)
    }

    pub async fn update_log(&self, id: i64, update: LogUpdate) -> Result<Log, ServiceError> {
        if let Some(condition) = &update.condition {
            validate_condition(condition)?;
        }

        let log = logs::update_log(&self.pool, id, &update)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("log {}", id)))?;

        fan_out(self.invalidator.as_ref(), MutationKind::Log, Self::log_scope(&log)).await;
        Ok(log)
    }

    /// Removes the log and soft-deletes its photos, then purges the log and
    /// every affected photo from the cache.
    pub async fn delete_log(&self, id: i64) -> Result<DeletedLog, ServiceError> {
        let deleted = logs::delete_log_cascade(&self.pool, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("log {}", id)))?;
        info!(
            "Deleted log {} and {} photos",
            id,
            deleted.photo_ids.len()
        );

        let scope = Self::log_scope(&deleted.log);
        fan_out(self.invalidator.as_ref(), MutationKind::Log, scope).await;
        for photo_id in &deleted.photo_ids {
            fan_out(
                self.invalidator.as_ref(),
                MutationKind::Photo,
                MutationScope {
                    photo_id: Some(*photo_id),
                    ..scope
                },
            )
            .await;
        }

        Ok(deleted)
    }
}
