#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use trigpointing::blob_fetch::{BlobFetcher, FetchError};
use trigpointing::cache::{CacheInvalidator, CacheNamespace, MemoryCacheStore, ResponseCache};
use trigpointing::config::PhotoConfig;
use trigpointing::db::logs::{self, NewLog};
use trigpointing::db::photos::SqlitePhotoStore;
use trigpointing::db::postcodes::SqlitePostcodeStore;
use trigpointing::db::{create_in_memory_pool, servers, trigs, DbPool, Trig};
use trigpointing::image_processor::ImageProcessor;
use trigpointing::log_service::LogService;
use trigpointing::object_store::{MemoryObjectStore, ObjectStoreGateway};
use trigpointing::photo_pipeline::PhotoPipeline;
use trigpointing::routes::AppContext;
use trigpointing::trig_service::TrigService;

pub const MEDIA_URL: &str = "http://media.test/";

/// Resolves media URLs against the in-memory object store.
pub struct StoreFetcher(pub MemoryObjectStore);

#[async_trait]
impl BlobFetcher for StoreFetcher {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let key = url.trim_start_matches(MEDIA_URL);
        self.0.get(key).ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 60]));
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, ImageFormat::Jpeg)
        .unwrap();
    buffer.into_inner()
}

pub fn trig(id: i64, name: &str, lat: f64, lon: f64) -> Trig {
    Trig {
        id,
        waypoint: format!("TP{:04}", id),
        name: name.to_string(),
        county: "Dorset".to_string(),
        physical_type: "Pillar".to_string(),
        status_id: 10,
        wgs_lat: lat,
        wgs_long: lon,
        osgb_gridref: String::new(),
        osgb_eastings: None,
        osgb_northings: None,
    }
}

pub async fn insert_trig(pool: &DbPool, id: i64, name: &str, lat: f64, lon: f64) {
    trigs::insert_trig(pool, &trig(id, name, lat, lon)).await.unwrap();
}

pub async fn insert_log(pool: &DbPool, trig_id: i64, user_id: i64) -> i64 {
    logs::create_log(
        pool,
        &NewLog {
            trig_id,
            user_id,
            visit_date: None,
            comment: "Found it".to_string(),
            condition: "G".to_string(),
        },
    )
    .await
    .unwrap()
    .id
}

pub struct TestApp {
    pub pool: DbPool,
    pub objects: MemoryObjectStore,
    pub cache: MemoryCacheStore,
    pub namespace: CacheNamespace,
    pub ctx: AppContext,
}

impl TestApp {
    pub async fn new(environment: &str) -> Self {
        let pool = create_in_memory_pool().await.unwrap();
        servers::upsert_server(&pool, 1, MEDIA_URL).await.unwrap();

        let objects = MemoryObjectStore::new();
        let cache = MemoryCacheStore::new();
        let namespace = CacheNamespace::new("trigpointing", environment).unwrap();
        let invalidator = Arc::new(CacheInvalidator::new(
            Arc::new(cache.clone()),
            namespace.clone(),
        ));
        let photos = PhotoConfig::default();

        let pipeline = PhotoPipeline::new(
            Arc::new(SqlitePhotoStore::new(pool.clone())),
            ObjectStoreGateway::new(Arc::new(objects.clone()), 1),
            Arc::new(StoreFetcher(objects.clone())),
            ImageProcessor::new(&photos),
            invalidator.clone(),
            photos.default_server_id,
        );

        let ctx = AppContext {
            db_pool: pool.clone(),
            pipeline,
            log_service: LogService::new(pool.clone(), invalidator.clone()),
            trig_service: TrigService::new(pool.clone(), invalidator),
            postcodes: Arc::new(SqlitePostcodeStore::new(pool.clone())),
            response_cache: ResponseCache::new(Arc::new(cache.clone()), namespace.clone()),
            max_upload_bytes: photos.max_upload_bytes as u64,
            media_path: PathBuf::from("."),
        };

        Self {
            pool,
            objects,
            cache,
            namespace,
            ctx,
        }
    }
}
