//! Upload, rotation and removal of log photos.
//!
//! Upload runs strictly in order: validate, process, insert a provisional
//! row, write both blobs, commit the row. A failure after the row exists is
//! compensated before the error is returned, so readers never see a row
//! whose blobs are missing. Rotation writes new blobs under revision keys
//! and swaps them into the existing row with a compare-and-swap on its
//! revision counter; the previous blobs stay in the store.

use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::blob_fetch::{BlobFetcher, FetchError};
use crate::cache::{Invalidator, MutationKind, MutationScope};
use crate::db::photos::{
    BlobDimensions, BlobKeys, LogOwner, NewPhoto, PhotoRecordStore, PhotoRevision,
};
use crate::db::{License, Photo, PhotoOrigin, PhotoType, RecordStatus};
use crate::image_processor::{
    rotate_clockwise, EncodedImage, ImageError, ImageProcessor, ProcessedPhoto, RotationAngle,
};
use crate::object_store::{derive_revision_keys, photo_keys, ObjectStoreError, ObjectStoreGateway};

/// The record as committed, built from what the upload already holds.
fn committed_photo(id: i64, photo: NewPhoto, keys: BlobKeys) -> Photo {
    let now = Utc::now();
    Photo {
        id,
        log_id: photo.log_id,
        server_id: photo.server_id,
        photo_type: photo.photo_type,
        license: photo.license,
        filename: keys.filename,
        filesize: photo.full.size,
        height: photo.full.height,
        width: photo.full.width,
        icon_filename: keys.icon_filename,
        icon_filesize: photo.icon.size,
        icon_height: photo.icon.height,
        icon_width: photo.icon.width,
        caption: photo.caption,
        description: photo.description,
        origin: PhotoOrigin::Uploaded,
        status: RecordStatus::Committed,
        revision: 0,
        deleted: false,
        ip_addr: photo.ip_addr,
        created_at: now,
        updated_at: now,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PhotoError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Processing failed: {0}")]
    Processing(String),
    #[error("Upload failed: {0}")]
    UploadFailed(#[from] ObjectStoreError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid rotation angle {0}, expected 90, 180 or 270")]
    InvalidAngle(i64),
    #[error("Photo {0} was changed concurrently")]
    Conflict(i64),
    #[error("Fetching current image failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<ImageError> for PhotoError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::Invalid(reason) => PhotoError::Validation(reason),
            ImageError::Processing(reason) => PhotoError::Processing(reason),
        }
    }
}

/// Caller-supplied fields for a new photo. Dimensions and sizes are never
/// taken from the caller.
#[derive(Debug, Clone)]
pub struct PhotoMetadata {
    pub log_id: i64,
    pub photo_type: PhotoType,
    pub license: License,
    pub caption: String,
    pub description: String,
    pub ip_addr: String,
    pub server_id: Option<i64>,
}

fn dimensions(image: &EncodedImage) -> BlobDimensions {
    BlobDimensions {
        size: image.bytes.len() as i64,
        width: i64::from(image.width),
        height: i64::from(image.height),
    }
}

#[derive(Clone)]
pub struct PhotoPipeline {
    records: Arc<dyn PhotoRecordStore>,
    objects: ObjectStoreGateway,
    fetcher: Arc<dyn BlobFetcher>,
    images: ImageProcessor,
    invalidator: Arc<dyn Invalidator>,
    default_server_id: i64,
}

impl PhotoPipeline {
    pub fn new(
        records: Arc<dyn PhotoRecordStore>,
        objects: ObjectStoreGateway,
        fetcher: Arc<dyn BlobFetcher>,
        images: ImageProcessor,
        invalidator: Arc<dyn Invalidator>,
        default_server_id: i64,
    ) -> Self {
        Self {
            records,
            objects,
            fetcher,
            images,
            invalidator,
            default_server_id,
        }
    }

    async fn run_image_job<F>(&self, job: F) -> Result<ProcessedPhoto, PhotoError>
    where
        F: FnOnce(&ImageProcessor) -> Result<ProcessedPhoto, ImageError> + Send + 'static,
    {
        let images = self.images.clone();
        tokio::task::spawn_blocking(move || job(&images))
            .await
            .map_err(|e| PhotoError::Processing(format!("image task failed: {}", e)))?
            .map_err(PhotoError::from)
    }

    async fn fan_out(&self, owner: Option<LogOwner>, log_id: i64, photo_id: i64) {
        let scope = MutationScope {
            trig_id: owner.map(|o| o.trig_id),
            user_id: owner.map(|o| o.user_id),
            log_id: Some(log_id),
            photo_id: Some(photo_id),
        };
        match self.invalidator.invalidate(MutationKind::Photo, &scope).await {
            Ok(count) => debug!("photo {}: invalidated {} cache keys", photo_id, count),
            Err(e) => warn!("photo {}: cache invalidation failed: {}", photo_id, e),
        }
    }

    /// Stores a new photo for a log and returns the committed record.
    pub async fn ingest(&self, image_bytes: Vec<u8>, metadata: PhotoMetadata) -> Result<Photo, PhotoError> {
        let owner = self
            .records
            .log_owner(metadata.log_id)
            .await?
            .ok_or_else(|| PhotoError::NotFound(format!("log {}", metadata.log_id)))?;
        let server_id = metadata.server_id.unwrap_or(self.default_server_id);
        if self.records.server(server_id).await?.is_none() {
            return Err(PhotoError::NotFound(format!("server {}", server_id)));
        }

        debug!("log {}: validating {} byte upload", metadata.log_id, image_bytes.len());
        let processed = self
            .run_image_job(move |images| {
                let img = images.validate(&image_bytes)?;
                debug!("processing {}x{} image", img.width(), img.height());
                images.process(&img)
            })
            .await?;

        let new_photo = NewPhoto {
            log_id: metadata.log_id,
            server_id,
            photo_type: metadata.photo_type,
            license: metadata.license,
            caption: metadata.caption,
            description: metadata.description,
            ip_addr: metadata.ip_addr,
            full: dimensions(&processed.full),
            icon: dimensions(&processed.thumbnail),
        };
        let id = self.records.create_provisional(&new_photo).await?;
        debug!("photo {}: provisional row created", id);

        let keys = photo_keys(id);
        if let Err(e) = self
            .objects
            .put_pair(&keys, &processed.full.bytes, &processed.thumbnail.bytes)
            .await
        {
            warn!("photo {}: blob upload failed, rolling back: {}", id, e);
            if let Err(cleanup) = self.records.delete(id).await {
                error!("photo {}: failed to remove provisional row: {}", id, cleanup);
            }
            return Err(PhotoError::UploadFailed(e));
        }
        debug!("photo {}: blobs stored as {} and {}", id, keys.filename, keys.icon_filename);

        if let Err(e) = self.records.commit(id, &keys).await {
            warn!("photo {}: commit failed, removing blobs and row: {}", id, e);
            if let Err(cleanup) = self.objects.delete_pair(&keys).await {
                error!("photo {}: failed to remove orphaned blobs: {}", id, cleanup);
            }
            if let Err(cleanup) = self.records.delete(id).await {
                error!("photo {}: failed to remove provisional row: {}", id, cleanup);
            }
            return Err(PhotoError::Database(e));
        }

        info!(
            "Committed photo {} for log {} ({}x{})",
            id, metadata.log_id, processed.full.width, processed.full.height
        );

        self.fan_out(Some(owner), metadata.log_id, id).await;

        // The upload is durable from here on; a failed re-read must not
        // invite the client to upload it again.
        match self.records.find_committed(id).await {
            Ok(Some(photo)) => Ok(photo),
            Ok(None) => {
                warn!("photo {}: committed row not visible on re-read", id);
                Ok(committed_photo(id, new_photo, keys))
            }
            Err(e) => {
                warn!("photo {}: re-read after commit failed: {}", id, e);
                Ok(committed_photo(id, new_photo, keys))
            }
        }
    }

    /// Rotates a committed photo clockwise, keeping its id.
    pub async fn rotate(&self, photo_id: i64, angle_degrees: i64) -> Result<Photo, PhotoError> {
        let angle =
            RotationAngle::from_degrees(angle_degrees).ok_or(PhotoError::InvalidAngle(angle_degrees))?;

        let photo = self
            .records
            .find_committed(photo_id)
            .await?
            .ok_or_else(|| PhotoError::NotFound(format!("photo {}", photo_id)))?;
        let server = self
            .records
            .server(photo.server_id)
            .await?
            .ok_or_else(|| PhotoError::NotFound(format!("server {}", photo.server_id)))?;

        let url = server.object_url(&photo.filename);
        debug!("photo {}: fetching {}", photo_id, url);
        let current = self.fetcher.get(&url).await?;

        let processed = self
            .run_image_job(move |images| {
                // The stored blob is our own output; failing to read it back
                // is a processing failure, not bad input.
                let img = images
                    .validate(&current)
                    .map_err(|e| ImageError::Processing(e.to_string()))?;
                images.process(&rotate_clockwise(&img, angle))
            })
            .await?;

        let keys = derive_revision_keys(&BlobKeys {
            filename: photo.filename.clone(),
            icon_filename: photo.icon_filename.clone(),
        });
        self.objects
            .put_pair(&keys, &processed.full.bytes, &processed.thumbnail.bytes)
            .await?;
        debug!("photo {}: revision blobs stored as {}", photo_id, keys.filename);

        let revision = PhotoRevision {
            keys: keys.clone(),
            full: dimensions(&processed.full),
            icon: dimensions(&processed.thumbnail),
        };
        let applied = match self
            .records
            .apply_revision(photo_id, photo.revision, &revision)
            .await
        {
            Ok(applied) => applied,
            Err(e) => {
                self.discard_revision_blobs(photo_id, &keys).await;
                return Err(PhotoError::Database(e));
            }
        };
        if !applied {
            warn!(
                "photo {}: revision {} superseded by a concurrent change",
                photo_id, photo.revision
            );
            self.discard_revision_blobs(photo_id, &keys).await;
            return Err(PhotoError::Conflict(photo_id));
        }

        info!(
            "Rotated photo {} by {} degrees ({} -> {})",
            photo_id,
            angle.degrees(),
            photo.filename,
            keys.filename
        );

        let owner = self.records.log_owner(photo.log_id).await.unwrap_or_else(|e| {
            warn!("photo {}: owner lookup for invalidation failed: {}", photo_id, e);
            None
        });
        self.fan_out(owner, photo.log_id, photo_id).await;

        self.records
            .find_committed(photo_id)
            .await?
            .ok_or_else(|| PhotoError::NotFound(format!("photo {}", photo_id)))
    }

    async fn discard_revision_blobs(&self, photo_id: i64, keys: &BlobKeys) {
        if let Err(e) = self.objects.delete_pair(keys).await {
            error!("photo {}: failed to remove unused revision blobs: {}", photo_id, e);
        }
    }

    /// Hides a photo from every read path. Its blobs are kept.
    pub async fn delete(&self, photo_id: i64) -> Result<(), PhotoError> {
        let photo = self
            .records
            .find_committed(photo_id)
            .await?
            .ok_or_else(|| PhotoError::NotFound(format!("photo {}", photo_id)))?;

        if !self.records.soft_delete(photo_id).await? {
            return Err(PhotoError::NotFound(format!("photo {}", photo_id)));
        }
        info!("Deleted photo {} from log {}", photo_id, photo.log_id);

        let owner = self.records.log_owner(photo.log_id).await.unwrap_or_else(|e| {
            warn!("photo {}: owner lookup for invalidation failed: {}", photo_id, e);
            None
        });
        self.fan_out(owner, photo.log_id, photo_id).await;
        Ok(())
    }
}
