use async_trait::async_trait;
use chrono::Utc;

use crate::db::{DbPool, License, Photo, PhotoType, Server};

const PHOTO_COLUMNS: &str = "id, log_id, server_id, photo_type, license, filename, filesize, height, width, \
     icon_filename, icon_filesize, icon_height, icon_width, caption, description, origin, status, \
     revision, deleted, ip_addr, created_at, updated_at";

/// Size and pixel dimensions of one encoded blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobDimensions {
    pub size: i64,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub log_id: i64,
    pub server_id: i64,
    pub photo_type: PhotoType,
    pub license: License,
    pub caption: String,
    pub description: String,
    pub ip_addr: String,
    pub full: BlobDimensions,
    pub icon: BlobDimensions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobKeys {
    pub filename: String,
    pub icon_filename: String,
}

/// New blob keys and dimensions written over an existing photo by a rotation.
#[derive(Debug, Clone)]
pub struct PhotoRevision {
    pub keys: BlobKeys,
    pub full: BlobDimensions,
    pub icon: BlobDimensions,
}

/// The marker and user a log belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct LogOwner {
    pub trig_id: i64,
    pub user_id: i64,
}

/// Record-store operations the photo pipeline depends on.
#[async_trait]
pub trait PhotoRecordStore: Send + Sync {
    async fn log_owner(&self, log_id: i64) -> Result<Option<LogOwner>, sqlx::Error>;

    async fn server(&self, server_id: i64) -> Result<Option<Server>, sqlx::Error>;

    /// Inserts a provisional row with empty blob keys and returns its id.
    async fn create_provisional(&self, photo: &NewPhoto) -> Result<i64, sqlx::Error>;

    /// Writes the final keys and promotes a provisional row to committed.
    async fn commit(&self, id: i64, keys: &BlobKeys) -> Result<(), sqlx::Error>;

    /// Hard-deletes a row. Only used to roll back an unfinished upload.
    async fn delete(&self, id: i64) -> Result<(), sqlx::Error>;

    async fn find_committed(&self, id: i64) -> Result<Option<Photo>, sqlx::Error>;

    /// Compare-and-swap on `revision`. Returns false when another writer got
    /// there first.
    async fn apply_revision(
        &self,
        id: i64,
        expected_revision: i64,
        revision: &PhotoRevision,
    ) -> Result<bool, sqlx::Error>;

    async fn soft_delete(&self, id: i64) -> Result<bool, sqlx::Error>;
}

#[derive(Clone)]
pub struct SqlitePhotoStore {
    pool: DbPool,
}

impl SqlitePhotoStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PhotoRecordStore for SqlitePhotoStore {
    async fn log_owner(&self, log_id: i64) -> Result<Option<LogOwner>, sqlx::Error> {
        sqlx::query_as::<_, LogOwner>("SELECT trig_id, user_id FROM logs WHERE id = ?")
            .bind(log_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn server(&self, server_id: i64) -> Result<Option<Server>, sqlx::Error> {
        crate::db::servers::find_server(&self.pool, server_id).await
    }

    async fn create_provisional(&self, photo: &NewPhoto) -> Result<i64, sqlx::Error> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO photos (log_id, server_id, photo_type, license, filename, filesize, height, width,
             icon_filename, icon_filesize, icon_height, icon_width, caption, description, origin, status,
             revision, deleted, ip_addr, created_at, updated_at)
             VALUES (?, ?, ?, ?, '', ?, ?, ?, '', ?, ?, ?, ?, ?, 'uploaded', 'provisional', 0, FALSE, ?, ?, ?)",
        )
        .bind(photo.log_id)
        .bind(photo.server_id)
        .bind(photo.photo_type)
        .bind(photo.license)
        .bind(photo.full.size)
        .bind(photo.full.height)
        .bind(photo.full.width)
        .bind(photo.icon.size)
        .bind(photo.icon.height)
        .bind(photo.icon.width)
        .bind(&photo.caption)
        .bind(&photo.description)
        .bind(&photo.ip_addr)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn commit(&self, id: i64, keys: &BlobKeys) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            "UPDATE photos SET filename = ?, icon_filename = ?, status = 'committed', updated_at = ?
             WHERE id = ? AND status = 'provisional'",
        )
        .bind(&keys.filename)
        .bind(&keys.icon_filename)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM photos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_committed(&self, id: i64) -> Result<Option<Photo>, sqlx::Error> {
        find_visible_photo(&self.pool, id).await
    }

    async fn apply_revision(
        &self,
        id: i64,
        expected_revision: i64,
        revision: &PhotoRevision,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE photos SET filename = ?, filesize = ?, height = ?, width = ?,
             icon_filename = ?, icon_filesize = ?, icon_height = ?, icon_width = ?,
             origin = 'revised', revision = revision + 1, updated_at = ?
             WHERE id = ? AND revision = ? AND status = 'committed' AND deleted = FALSE",
        )
        .bind(&revision.keys.filename)
        .bind(revision.full.size)
        .bind(revision.full.height)
        .bind(revision.full.width)
        .bind(&revision.keys.icon_filename)
        .bind(revision.icon.size)
        .bind(revision.icon.height)
        .bind(revision.icon.width)
        .bind(Utc::now())
        .bind(id)
        .bind(expected_revision)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn soft_delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE photos SET deleted = TRUE, updated_at = ?
             WHERE id = ? AND status = 'committed' AND deleted = FALSE",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

pub async fn find_visible_photo(pool: &DbPool, id: i64) -> Result<Option<Photo>, sqlx::Error> {
    sqlx::query_as::<_, Photo>(&format!(
        "SELECT {} FROM photos WHERE id = ? AND status = 'committed' AND deleted = FALSE",
        PHOTO_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn list_visible_photos_for_log(
    pool: &DbPool,
    log_id: i64,
) -> Result<Vec<Photo>, sqlx::Error> {
    sqlx::query_as::<_, Photo>(&format!(
        "SELECT {} FROM photos WHERE log_id = ? AND status = 'committed' AND deleted = FALSE ORDER BY id",
        PHOTO_COLUMNS
    ))
    .bind(log_id)
    .fetch_all(pool)
    .await
}

/// Row count regardless of status, used to verify rollbacks.
pub async fn count_all_rows(pool: &DbPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM photos")
        .fetch_one(pool)
        .await
}
