use async_trait::async_trait;

use crate::db::DbPool;
use crate::location_search::PostcodeLookup;
use crate::postcode::PostcodeCandidate;
use crate::search::BoundingBox;

#[derive(sqlx::FromRow)]
struct PostcodeRow {
    code: String,
    lat: f64,
    lon: f64,
}

impl From<PostcodeRow> for PostcodeCandidate {
    fn from(row: PostcodeRow) -> Self {
        PostcodeCandidate {
            code: row.code,
            lat: row.lat,
            lon: row.lon,
        }
    }
}

/// Stores a postcode under its normalized code, replacing any previous position.
pub async fn upsert_postcode(pool: &DbPool, code: &str, lat: f64, lon: f64) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO postcodes (code, lat, lon) VALUES (?, ?, ?)
         ON CONFLICT(code) DO UPDATE SET lat = excluded.lat, lon = excluded.lon",
    )
    .bind(code)
    .bind(lat)
    .bind(lon)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_postcode(pool: &DbPool, code: &str) -> Result<Option<PostcodeCandidate>, sqlx::Error> {
    let row = sqlx::query_as::<_, PostcodeRow>("SELECT code, lat, lon FROM postcodes WHERE code = ?")
        .bind(code)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Into::into))
}

pub async fn postcodes_in_bounds(
    pool: &DbPool,
    bounds: &BoundingBox,
) -> Result<Vec<PostcodeCandidate>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PostcodeRow>(
        "SELECT code, lat, lon FROM postcodes
         WHERE lat BETWEEN ? AND ? AND lon BETWEEN ? AND ?
         ORDER BY code",
    )
    .bind(bounds.min_lat)
    .bind(bounds.max_lat)
    .bind(bounds.min_lon)
    .bind(bounds.max_lon)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

#[derive(Clone)]
pub struct SqlitePostcodeStore {
    pool: DbPool,
}

impl SqlitePostcodeStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostcodeLookup for SqlitePostcodeStore {
    async fn find_postcode(&self, code: &str) -> Result<Option<PostcodeCandidate>, sqlx::Error> {
        find_postcode(&self.pool, code).await
    }

    async fn postcodes_near(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
    ) -> Result<Vec<PostcodeCandidate>, sqlx::Error> {
        postcodes_in_bounds(&self.pool, &BoundingBox::around(lat, lon, radius_km)).await
    }
}
