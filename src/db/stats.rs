use serde::Serialize;

use crate::db::DbPool;
use crate::search::RETIRED_STATUS_THRESHOLD;

/// Site-wide totals shown on the landing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct SiteStats {
    pub trigs: i64,
    pub logs: i64,
    pub photos: i64,
    pub loggers: i64,
}

pub async fn site_stats(pool: &DbPool) -> Result<SiteStats, sqlx::Error> {
    sqlx::query_as::<_, SiteStats>(
        "SELECT
            (SELECT COUNT(*) FROM trigs WHERE status_id <= ?) AS trigs,
            (SELECT COUNT(*) FROM logs) AS logs,
            (SELECT COUNT(*) FROM photos WHERE status = 'committed' AND deleted = FALSE) AS photos,
            (SELECT COUNT(DISTINCT user_id) FROM logs) AS loggers",
    )
    .bind(RETIRED_STATUS_THRESHOLD)
    .fetch_one(pool)
    .await
}
