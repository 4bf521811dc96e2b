use log::{error, info};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use trigpointing::blob_fetch::HttpBlobFetcher;
use trigpointing::cache::{CacheInvalidator, CacheNamespace, CacheStore, MemoryCacheStore, ResponseCache};
use trigpointing::config::Config;
use trigpointing::db::photos::SqlitePhotoStore;
use trigpointing::db::postcodes::SqlitePostcodeStore;
use trigpointing::db::{self, servers};
use trigpointing::image_processor::ImageProcessor;
use trigpointing::log_service::LogService;
use trigpointing::object_store::{FsObjectStore, ObjectStoreGateway};
use trigpointing::photo_pipeline::PhotoPipeline;
use trigpointing::routes::{build_routes, AppContext};
use trigpointing::trig_service::TrigService;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = Config::from_env()?;
    let port = config.port;

    info!("Starting trigpointing server on port {}", port);
    info!("Database: {}", config.db_path);
    info!("Media path: {}", config.media_path);
    info!(
        "Cache namespace: {}:{}",
        config.cache.app_name, config.cache.environment
    );

    if !is_port_available(port) {
        error!("Port {} is already in use", port);
        return Err(format!("Port {} is already in use", port).into());
    }

    let ctx = initialize_services(&config).await?;
    let routes = build_routes(ctx);

    info!(
        "Server started successfully, listening on http://{}:{}",
        config.host, port
    );

    let host: std::net::IpAddr = config.host.parse()?;
    warp::serve(routes).run((host, port)).await;

    Ok(())
}

fn is_port_available(port: u16) -> bool {
    TcpListener::bind(("0.0.0.0", port)).is_ok()
}

async fn initialize_services(config: &Config) -> Result<AppContext, Box<dyn std::error::Error>> {
    let db_pool = db::create_db_pool(&config.db_path).await?;
    info!("Database initialized successfully");

    servers::upsert_server(
        &db_pool,
        config.photos.default_server_id,
        &config.media_base_url,
    )
    .await?;

    let object_store = FsObjectStore::new(&config.media_path)?;
    info!("Object store rooted at {}", object_store.root().display());

    let cache_store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
    let namespace = CacheNamespace::new(&config.cache.app_name, &config.cache.environment)?;
    let invalidator = Arc::new(CacheInvalidator::new(cache_store.clone(), namespace.clone()));
    let response_cache = ResponseCache::new(cache_store, namespace);

    let fetcher = HttpBlobFetcher::new(
        Duration::from_secs(config.fetch_timeout_secs),
        config.photos.max_upload_bytes as u64,
    );

    let pipeline = PhotoPipeline::new(
        Arc::new(SqlitePhotoStore::new(db_pool.clone())),
        ObjectStoreGateway::new(Arc::new(object_store), config.object_store_attempts),
        Arc::new(fetcher),
        ImageProcessor::new(&config.photos),
        invalidator.clone(),
        config.photos.default_server_id,
    );
    info!("Photo pipeline initialized");

    Ok(AppContext {
        db_pool: db_pool.clone(),
        pipeline,
        log_service: LogService::new(db_pool.clone(), invalidator.clone()),
        trig_service: TrigService::new(db_pool.clone(), invalidator),
        postcodes: Arc::new(SqlitePostcodeStore::new(db_pool)),
        response_cache,
        max_upload_bytes: config.photos.max_upload_bytes as u64,
        media_path: PathBuf::from(&config.media_path),
    })
}
