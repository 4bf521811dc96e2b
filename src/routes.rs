use std::path::PathBuf;
use std::sync::Arc;

use warp::Filter;

use crate::cache::ResponseCache;
use crate::db::DbPool;
use crate::location_search::PostcodeLookup;
use crate::log_service::LogService;
use crate::photo_pipeline::PhotoPipeline;
use crate::trig_service::TrigService;
use crate::warp_handlers;
use crate::warp_helpers::{
    cors, handle_rejection, with_db, with_log_service, with_pipeline, with_postcodes,
    with_response_cache, with_trig_service,
};

/// Everything the HTTP layer hands to its handlers.
#[derive(Clone)]
pub struct AppContext {
    pub db_pool: DbPool,
    pub pipeline: PhotoPipeline,
    pub log_service: LogService,
    pub trig_service: TrigService,
    pub postcodes: Arc<dyn PostcodeLookup>,
    pub response_cache: ResponseCache,
    pub max_upload_bytes: u64,
    pub media_path: PathBuf,
}

pub fn build_routes(
    ctx: AppContext,
) -> impl Filter<Extract = impl warp::Reply, Error = std::convert::Infallible> + Clone {
    build_health_routes(ctx.db_pool.clone())
        .or(build_trig_routes(&ctx))
        .or(build_location_routes(ctx.postcodes.clone()))
        .or(build_stats_routes(ctx.db_pool.clone(), ctx.response_cache.clone()))
        .or(build_log_routes(ctx.log_service.clone()))
        .or(build_photo_routes(ctx.pipeline.clone(), ctx.max_upload_bytes))
        .or(build_media_routes(ctx.media_path.clone()))
        .with(cors())
        .with(warp::log("trigpointing"))
        .recover(handle_rejection)
}

fn build_health_routes(
    db_pool: DbPool,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(warp_handlers::health_check);

    let ready = warp::path("ready")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_db(db_pool))
        .and_then(warp_handlers::ready_check);

    health.or(ready)
}

fn build_trig_routes(
    ctx: &AppContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let search = warp::path("v1")
        .and(warp::path("trigs"))
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<warp_handlers::TrigSearchQuery>())
        .and(with_db(ctx.db_pool.clone()))
        .and(with_postcodes(ctx.postcodes.clone()))
        .and(with_response_cache(ctx.response_cache.clone()))
        .and_then(warp_handlers::search_trigs_handler);

    let get = warp::path("v1")
        .and(warp::path("trigs"))
        .and(warp::path::param::<i64>())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_trig_service(ctx.trig_service.clone()))
        .and(with_response_cache(ctx.response_cache.clone()))
        .and_then(warp_handlers::get_trig);

    let update = warp::path("v1")
        .and(warp::path("trigs"))
        .and(warp::path::param::<i64>())
        .and(warp::path::end())
        .and(warp::patch())
        .and(warp::body::json::<crate::trig_service::TrigUpdate>())
        .and(with_trig_service(ctx.trig_service.clone()))
        .and_then(warp_handlers::update_trig);

    search.or(get).or(update)
}

fn build_location_routes(
    postcodes: Arc<dyn PostcodeLookup>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("v1")
        .and(warp::path("locations"))
        .and(warp::path("search"))
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<warp_handlers::LocationQuery>())
        .and(with_postcodes(postcodes))
        .and_then(warp_handlers::search_location)
}

fn build_stats_routes(
    db_pool: DbPool,
    response_cache: ResponseCache,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("v1")
        .and(warp::path("stats"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_db(db_pool))
        .and(with_response_cache(response_cache))
        .and_then(warp_handlers::get_site_stats)
}

fn build_log_routes(
    log_service: LogService,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let create = warp::path("v1")
        .and(warp::path("logs"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json::<crate::db::logs::NewLog>())
        .and(with_log_service(log_service.clone()))
        .and_then(warp_handlers::create_log);

    let update = warp::path("v1")
        .and(warp::path("logs"))
        .and(warp::path::param::<i64>())
        .and(warp::path::end())
        .and(warp::patch())
        .and(warp::body::json::<crate::db::logs::LogUpdate>())
        .and(with_log_service(log_service.clone()))
        .and_then(warp_handlers::update_log);

    let delete = warp::path("v1")
        .and(warp::path("logs"))
        .and(warp::path::param::<i64>())
        .and(warp::path::end())
        .and(warp::delete())
        .and(with_log_service(log_service))
        .and_then(warp_handlers::delete_log);

    create.or(update).or(delete)
}

fn build_photo_routes(
    pipeline: PhotoPipeline,
    max_upload_bytes: u64,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let upload = warp::path("v1")
        .and(warp::path("photos"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::query::<warp_handlers::UploadQuery>())
        .and(warp::addr::remote())
        .and(warp::body::content_length_limit(max_upload_bytes))
        .and(warp::body::bytes())
        .and(with_pipeline(pipeline.clone()))
        .and_then(warp_handlers::upload_photo);

    let rotate = warp::path("v1")
        .and(warp::path("photos"))
        .and(warp::path::param::<i64>())
        .and(warp::path("rotate"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json::<warp_handlers::RotateRequest>())
        .and(with_pipeline(pipeline.clone()))
        .and_then(warp_handlers::rotate_photo);

    let delete = warp::path("v1")
        .and(warp::path("photos"))
        .and(warp::path::param::<i64>())
        .and(warp::path::end())
        .and(warp::delete())
        .and(with_pipeline(pipeline))
        .and_then(warp_handlers::delete_photo);

    upload.or(rotate).or(delete)
}

fn build_media_routes(
    media_path: PathBuf,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("media").and(warp::get()).and(warp::fs::dir(media_path))
}
