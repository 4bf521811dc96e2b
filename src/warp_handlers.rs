use crate::cache::response::{site_stats_key, trig_detail_key, trig_list_key};
use crate::cache::ResponseCache;
use crate::db::logs::{LogUpdate, NewLog};
use crate::db::stats::site_stats;
use crate::db::trigs::SqlitePointStore;
use crate::db::{DbPool, License, PhotoType};
use crate::location_search::{resolve_location, PostcodeLookup};
use crate::log_service::LogService;
use crate::photo_pipeline::{PhotoError, PhotoMetadata, PhotoPipeline};
use crate::search::{search_trigs, RankedTrig, SearchPage, SortKey, TrigSearch, DEFAULT_PAGE_SIZE};
use crate::trig_service::{TrigService, TrigUpdate};
use crate::warp_helpers::{
    database_rejection, location_rejection, photo_rejection, search_rejection,
    service_rejection, ValidationError,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{reject, Rejection, Reply};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TrigSearchQuery {
    pub q: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub max_km: Option<f64>,
    pub name: Option<String>,
    pub county: Option<String>,
    pub physical_type: Option<String>,
    pub exclude_logged_by: Option<i64>,
    pub order: Option<String>,
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub log_id: i64,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub photo_type: Option<String>,
    pub license: Option<String>,
    pub server_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RotateRequest {
    pub angle: i64,
}

#[derive(Debug, Serialize)]
pub struct TrigSearchResponse {
    pub items: Vec<RankedTrig>,
    pub total: usize,
    pub skip: u32,
    pub limit: u32,
    pub has_more: bool,
    pub next_skip: Option<u32>,
    pub previous_skip: Option<u32>,
}

impl From<SearchPage<RankedTrig>> for TrigSearchResponse {
    fn from(page: SearchPage<RankedTrig>) -> Self {
        let next_skip = page.next_skip();
        let previous_skip = page.previous_skip();
        Self {
            items: page.items,
            total: page.total,
            skip: page.skip,
            limit: page.limit,
            has_more: page.has_more,
            next_skip,
            previous_skip,
        }
    }
}

fn validation(message: impl Into<String>) -> Rejection {
    reject::custom(ValidationError {
        message: message.into(),
    })
}

fn json_bytes(body: Vec<u8>) -> impl Reply {
    warp::reply::with_header(body, "content-type", "application/json")
}

fn to_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, Rejection> {
    serde_json::to_vec(value).map_err(|e| {
        log::error!("Failed to serialize response: {}", e);
        reject::custom(crate::warp_helpers::DatabaseError {
            message: "Failed to serialize response".to_string(),
        })
    })
}

/// Runs a pipeline call on its own task so it reaches a terminal state even
/// if the client goes away.
async fn run_detached<T, F>(operation: F) -> Result<T, Rejection>
where
    T: Send + 'static,
    F: std::future::Future<Output = Result<T, PhotoError>> + Send + 'static,
{
    tokio::spawn(operation)
        .await
        .map_err(|e| {
            log::error!("Photo task failed: {}", e);
            database_rejection(e)
        })?
        .map_err(photo_rejection)
}

pub async fn health_check() -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

pub async fn ready_check(db_pool: DbPool) -> Result<impl Reply, Rejection> {
    match sqlx::query("SELECT 1").execute(&db_pool).await {
        Ok(_) => Ok(warp::reply::json(&json!({
            "status": "ready",
            "database": "connected",
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))),
        Err(e) => {
            log::error!("Database connection failed: {}", e);
            Err(reject::custom(crate::warp_helpers::DatabaseError {
                message: "Database connection failed".to_string(),
            }))
        }
    }
}

async fn build_search(
    query: &TrigSearchQuery,
    postcodes: &dyn PostcodeLookup,
) -> Result<TrigSearch, Rejection> {
    let center = match (&query.q, query.lat, query.lon) {
        (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
            return Err(validation("use either q or lat/lon, not both"));
        }
        (Some(text), None, None) => {
            let location = resolve_location(text, postcodes)
                .await
                .map_err(location_rejection)?;
            Some((location.lat, location.lon))
        }
        (None, Some(lat), Some(lon)) => Some((lat, lon)),
        (None, Some(_), None) | (None, None, Some(_)) => {
            return Err(validation("lat and lon must be given together"));
        }
        (None, None, None) => None,
    };

    let order = query
        .order
        .as_deref()
        .map(str::parse::<SortKey>)
        .transpose()
        .map_err(search_rejection)?;

    Ok(TrigSearch {
        center,
        max_km: query.max_km,
        name: query.name.clone(),
        county: query.county.clone(),
        physical_type: query.physical_type.clone(),
        exclude_logged_by: query.exclude_logged_by,
        order,
        skip: query.skip.unwrap_or(0),
        limit: query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    })
}

pub async fn search_trigs_handler(
    query: TrigSearchQuery,
    db_pool: DbPool,
    postcodes: Arc<dyn PostcodeLookup>,
    response_cache: ResponseCache,
) -> Result<impl Reply, Rejection> {
    let cache_key = trig_list_key(&serde_json::to_string(&query).unwrap_or_default());
    if let Some(cached) = response_cache.get(&cache_key).await {
        return Ok(json_bytes(cached));
    }

    let search = build_search(&query, postcodes.as_ref()).await?;
    let store = SqlitePointStore::new(db_pool);
    let page = search_trigs(&store, &search).await.map_err(search_rejection)?;

    let body = to_json_bytes(&TrigSearchResponse::from(page))?;
    response_cache.put(&cache_key, body.clone()).await;
    Ok(json_bytes(body))
}

pub async fn get_trig(
    id: i64,
    trig_service: TrigService,
    response_cache: ResponseCache,
) -> Result<impl Reply, Rejection> {
    let cache_key = trig_detail_key(id);
    if let Some(cached) = response_cache.get(&cache_key).await {
        return Ok(json_bytes(cached));
    }

    let trig = trig_service.find_trig(id).await.map_err(service_rejection)?;
    let body = to_json_bytes(&trig)?;
    response_cache.put(&cache_key, body.clone()).await;
    Ok(json_bytes(body))
}

pub async fn update_trig(
    id: i64,
    update: TrigUpdate,
    trig_service: TrigService,
) -> Result<impl Reply, Rejection> {
    let trig = trig_service
        .update_trig(id, update)
        .await
        .map_err(service_rejection)?;
    Ok(warp::reply::json(&trig))
}

pub async fn search_location(
    query: LocationQuery,
    postcodes: Arc<dyn PostcodeLookup>,
) -> Result<impl Reply, Rejection> {
    let location = resolve_location(&query.q, postcodes.as_ref())
        .await
        .map_err(location_rejection)?;
    Ok(warp::reply::json(&location))
}

pub async fn get_site_stats(
    db_pool: DbPool,
    response_cache: ResponseCache,
) -> Result<impl Reply, Rejection> {
    let cache_key = site_stats_key();
    if let Some(cached) = response_cache.get(&cache_key).await {
        return Ok(json_bytes(cached));
    }

    let stats = site_stats(&db_pool).await.map_err(database_rejection)?;
    let body = to_json_bytes(&stats)?;
    response_cache.put(&cache_key, body.clone()).await;
    Ok(json_bytes(body))
}

pub async fn create_log(new_log: NewLog, log_service: LogService) -> Result<impl Reply, Rejection> {
    let log = log_service
        .create_log(new_log)
        .await
        .map_err(service_rejection)?;
    Ok(warp::reply::with_status(
        warp::reply::json(&log),
        StatusCode::CREATED,
    ))
}

pub async fn update_log(
    id: i64,
    update: LogUpdate,
    log_service: LogService,
) -> Result<impl Reply, Rejection> {
    let log = log_service
        .update_log(id, update)
        .await
        .map_err(service_rejection)?;
    Ok(warp::reply::json(&log))
}

pub async fn delete_log(id: i64, log_service: LogService) -> Result<impl Reply, Rejection> {
    let deleted = log_service.delete_log(id).await.map_err(service_rejection)?;
    Ok(warp::reply::json(&json!({
        "deleted": deleted.log.id,
        "photos": deleted.photo_ids,
    })))
}

fn parse_photo_type(text: Option<&str>) -> Result<PhotoType, Rejection> {
    match text {
        None => Ok(PhotoType::Other),
        Some(text) => text
            .parse()
            .map_err(|_| validation(format!("unknown photo type '{}'", text))),
    }
}

fn parse_license(text: Option<&str>) -> Result<License, Rejection> {
    match text {
        None => Ok(License::CreativeCommons),
        Some(text) => text
            .parse()
            .map_err(|_| validation(format!("unknown license '{}'", text))),
    }
}

pub async fn upload_photo(
    query: UploadQuery,
    remote: Option<SocketAddr>,
    body: Bytes,
    pipeline: PhotoPipeline,
) -> Result<impl Reply, Rejection> {
    let metadata = PhotoMetadata {
        log_id: query.log_id,
        photo_type: parse_photo_type(query.photo_type.as_deref())?,
        license: parse_license(query.license.as_deref())?,
        caption: query.caption,
        description: query.description,
        ip_addr: remote.map(|addr| addr.ip().to_string()).unwrap_or_default(),
        server_id: query.server_id,
    };
    let bytes = body.to_vec();

    let photo = run_detached(async move { pipeline.ingest(bytes, metadata).await }).await?;
    Ok(warp::reply::with_status(
        warp::reply::json(&photo),
        StatusCode::CREATED,
    ))
}

pub async fn rotate_photo(
    id: i64,
    request: RotateRequest,
    pipeline: PhotoPipeline,
) -> Result<impl Reply, Rejection> {
    let photo = run_detached(async move { pipeline.rotate(id, request.angle).await }).await?;
    Ok(warp::reply::json(&photo))
}

pub async fn delete_photo(id: i64, pipeline: PhotoPipeline) -> Result<impl Reply, Rejection> {
    run_detached(async move { pipeline.delete(id).await }).await?;
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "deleted": id })),
        StatusCode::OK,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoPostcodes;

    #[async_trait::async_trait]
    impl PostcodeLookup for NoPostcodes {
        async fn find_postcode(
            &self,
            _code: &str,
        ) -> Result<Option<crate::postcode::PostcodeCandidate>, sqlx::Error> {
            Ok(None)
        }

        async fn postcodes_near(
            &self,
            _lat: f64,
            _lon: f64,
            _radius_km: f64,
        ) -> Result<Vec<crate::postcode::PostcodeCandidate>, sqlx::Error> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_build_search_resolves_grid_reference() {
        let search = build_search(
            &TrigSearchQuery {
                q: Some("SU 12 34".to_string()),
                order: Some("name".to_string()),
                ..TrigSearchQuery::default()
            },
            &NoPostcodes,
        )
        .await
        .unwrap();
        assert!(search.center.is_some());
        assert_eq!(search.order, Some(SortKey::Name));
        assert_eq!(search.limit, DEFAULT_PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_build_search_rejects_mixed_inputs() {
        let mixed = TrigSearchQuery {
            q: Some("SU 12 34".to_string()),
            lat: Some(51.0),
            ..TrigSearchQuery::default()
        };
        assert!(build_search(&mixed, &NoPostcodes).await.is_err());

        let half = TrigSearchQuery {
            lon: Some(-1.0),
            ..TrigSearchQuery::default()
        };
        assert!(build_search(&half, &NoPostcodes).await.is_err());

        let bad_order = TrigSearchQuery {
            order: Some("height".to_string()),
            ..TrigSearchQuery::default()
        };
        assert!(build_search(&bad_order, &NoPostcodes).await.is_err());
    }

    #[test]
    fn test_photo_type_and_license_defaults() {
        assert_eq!(parse_photo_type(None).unwrap(), PhotoType::Other);
        assert_eq!(
            parse_photo_type(Some("flush_bracket")).unwrap(),
            PhotoType::FlushBracket
        );
        assert!(parse_photo_type(Some("selfie")).is_err());
        assert_eq!(parse_license(None).unwrap(), License::CreativeCommons);
        assert!(parse_license(Some("gpl")).is_err());
    }
}
