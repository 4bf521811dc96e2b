use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};

use crate::db::{DbPool, Trig};
use crate::search::{CandidateFilter, PointStore, SearchError};

const TRIG_COLUMNS: &str = "id, waypoint, name, county, physical_type, status_id, wgs_lat, wgs_long, \
     osgb_gridref, osgb_eastings, osgb_northings";

pub async fn insert_trig(pool: &DbPool, trig: &Trig) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO trigs (id, waypoint, name, county, physical_type, status_id, wgs_lat, wgs_long,
         osgb_gridref, osgb_eastings, osgb_northings, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(trig.id)
    .bind(&trig.waypoint)
    .bind(&trig.name)
    .bind(&trig.county)
    .bind(&trig.physical_type)
    .bind(trig.status_id)
    .bind(trig.wgs_lat)
    .bind(trig.wgs_long)
    .bind(&trig.osgb_gridref)
    .bind(trig.osgb_eastings)
    .bind(trig.osgb_northings)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_trig(pool: &DbPool, id: i64) -> Result<Option<Trig>, sqlx::Error> {
    sqlx::query_as::<_, Trig>(&format!("SELECT {} FROM trigs WHERE id = ?", TRIG_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Overwrites the curated fields of an existing marker.
pub async fn save_trig(pool: &DbPool, trig: &Trig) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE trigs SET name = ?, county = ?, physical_type = ?, status_id = ?, wgs_lat = ?,
         wgs_long = ?, osgb_gridref = ?, osgb_eastings = ?, osgb_northings = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&trig.name)
    .bind(&trig.county)
    .bind(&trig.physical_type)
    .bind(trig.status_id)
    .bind(trig.wgs_lat)
    .bind(trig.wgs_long)
    .bind(&trig.osgb_gridref)
    .bind(trig.osgb_eastings)
    .bind(trig.osgb_northings)
    .bind(Utc::now())
    .bind(trig.id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

#[derive(Clone)]
pub struct SqlitePointStore {
    pool: DbPool,
}

impl SqlitePointStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Escapes `LIKE` wildcards so user text matches literally under `ESCAPE '\'`.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn build_candidate_query(filter: &CandidateFilter) -> QueryBuilder<'_, Sqlite> {
    let mut query = QueryBuilder::new(format!(
        "SELECT {} FROM trigs WHERE status_id <= ",
        TRIG_COLUMNS
    ));
    query.push_bind(filter.max_status);

    if let Some(name) = &filter.name {
        query
            .push(" AND name LIKE ")
            .push_bind(format!("%{}%", escape_like(name.trim())))
            .push(" ESCAPE '\\'");
    }
    if let Some(county) = &filter.county {
        query
            .push(" AND county = ")
            .push_bind(county.trim())
            .push(" COLLATE NOCASE");
    }
    if let Some(physical_type) = &filter.physical_type {
        query
            .push(" AND physical_type = ")
            .push_bind(physical_type.trim())
            .push(" COLLATE NOCASE");
    }
    if let Some(user_id) = filter.exclude_logged_by {
        query
            .push(" AND id NOT IN (SELECT trig_id FROM logs WHERE user_id = ")
            .push_bind(user_id)
            .push(")");
    }
    if let Some(bounds) = &filter.bounds {
        query
            .push(" AND wgs_lat BETWEEN ")
            .push_bind(bounds.min_lat)
            .push(" AND ")
            .push_bind(bounds.max_lat)
            .push(" AND wgs_long BETWEEN ")
            .push_bind(bounds.min_lon)
            .push(" AND ")
            .push_bind(bounds.max_lon);
    }

    query.push(" ORDER BY id");
    query
}

#[async_trait]
impl PointStore for SqlitePointStore {
    async fn candidates(&self, filter: &CandidateFilter) -> Result<Vec<Trig>, SearchError> {
        let mut query = build_candidate_query(filter);
        let trigs = query
            .build_query_as::<Trig>()
            .fetch_all(&self.pool)
            .await?;
        Ok(trigs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_in_memory_pool;
    use crate::db::test_fixtures::{seed_log, seed_trig};
    use crate::search::{search_trigs, BoundingBox, TrigSearch, RETIRED_STATUS_THRESHOLD};

    fn filter() -> CandidateFilter {
        CandidateFilter {
            name: None,
            county: None,
            physical_type: None,
            exclude_logged_by: None,
            bounds: None,
            max_status: RETIRED_STATUS_THRESHOLD,
        }
    }

    #[tokio::test]
    async fn test_candidates_exclude_retired_and_logged() {
        let pool = create_in_memory_pool().await.unwrap();
        seed_trig(&pool, 1, "Active", 51.0, -1.0, 10).await;
        seed_trig(&pool, 2, "Retired", 51.0, -1.0, 70).await;
        seed_trig(&pool, 3, "Logged", 51.0, -1.0, 10).await;
        seed_log(&pool, 3, 42).await;

        let store = SqlitePointStore::new(pool);

        let all = store.candidates(&filter()).await.unwrap();
        let ids: Vec<i64> = all.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 3]);

        let not_logged = store
            .candidates(&CandidateFilter {
                exclude_logged_by: Some(42),
                ..filter()
            })
            .await
            .unwrap();
        assert_eq!(not_logged.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn test_candidates_text_filters_and_bounds() {
        let pool = create_in_memory_pool().await.unwrap();
        seed_trig(&pool, 1, "Win Green", 51.0, -2.1, 10).await;
        seed_trig(&pool, 2, "Ben Nevis", 56.8, -5.0, 10).await;

        let store = SqlitePointStore::new(pool);

        let by_name = store
            .candidates(&CandidateFilter {
                name: Some("green".to_string()),
                ..filter()
            })
            .await
            .unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].id, 1);

        let by_county = store
            .candidates(&CandidateFilter {
                county: Some("WILTSHIRE".to_string()),
                ..filter()
            })
            .await
            .unwrap();
        assert_eq!(by_county.len(), 2);

        let boxed = store
            .candidates(&CandidateFilter {
                bounds: Some(BoundingBox::around(56.8, -5.0, 10.0)),
                ..filter()
            })
            .await
            .unwrap();
        assert_eq!(boxed.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn test_name_filter_matches_wildcards_literally() {
        let pool = create_in_memory_pool().await.unwrap();
        seed_trig(&pool, 1, "100% Hill", 51.0, -1.0, 10).await;
        seed_trig(&pool, 2, "1000 Hill", 51.0, -1.0, 10).await;
        seed_trig(&pool, 3, "Long_Barrow", 51.0, -1.0, 10).await;
        seed_trig(&pool, 4, "LongXBarrow", 51.0, -1.0, 10).await;

        let store = SqlitePointStore::new(pool);
        let ids_for = |name: &str| CandidateFilter {
            name: Some(name.to_string()),
            ..filter()
        };

        let percent = store.candidates(&ids_for("100%")).await.unwrap();
        assert_eq!(percent.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1]);

        let underscore = store.candidates(&ids_for("g_B")).await.unwrap();
        assert_eq!(underscore.iter().map(|t| t.id).collect::<Vec<_>>(), vec![3]);

        assert!(store.candidates(&ids_for("\\")).await.unwrap().is_empty());
        assert_eq!(escape_like(r"50%_a\b"), r"50\%\_a\\b");
    }

    #[tokio::test]
    async fn test_search_over_sqlite_paginates_after_exclusion() {
        let pool = create_in_memory_pool().await.unwrap();
        for id in 1..=30 {
            seed_trig(&pool, id, &format!("Trig {}", id), 51.0 + id as f64 * 0.001, -1.0, 10).await;
        }
        // The user has logged the five nearest markers.
        for id in 1..=5 {
            seed_log(&pool, id, 9).await;
        }

        let store = SqlitePointStore::new(pool);
        let query = TrigSearch {
            center: Some((51.0, -1.0)),
            exclude_logged_by: Some(9),
            limit: 10,
            ..TrigSearch::default()
        };

        let page = search_trigs(&store, &query).await.unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(page.items[0].trig.id, 6);
        assert!(page.has_more);

        let last = search_trigs(
            &store,
            &TrigSearch {
                skip: 20,
                ..query.clone()
            },
        )
        .await
        .unwrap();
        assert_eq!(last.items.len(), 5);
        assert!(!last.has_more);
    }

    #[tokio::test]
    async fn test_save_trig_updates_fields() {
        let pool = create_in_memory_pool().await.unwrap();
        seed_trig(&pool, 1, "Old Name", 51.0, -1.0, 10).await;

        let mut trig = find_trig(&pool, 1).await.unwrap().unwrap();
        trig.name = "New Name".to_string();
        trig.status_id = 70;
        assert!(save_trig(&pool, &trig).await.unwrap());

        let reloaded = find_trig(&pool, 1).await.unwrap().unwrap();
        assert_eq!(reloaded.name, "New Name");
        assert_eq!(reloaded.status_id, 70);
    }
}
