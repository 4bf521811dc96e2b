use crate::cache::ResponseCache;
use crate::db::DbPool;
use crate::location_search::{LocationError, PostcodeLookup};
use crate::log_service::{LogService, ServiceError};
use crate::photo_pipeline::{PhotoError, PhotoPipeline};
use crate::search::SearchError;
use crate::trig_service::TrigService;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;

use warp::http::StatusCode;
use warp::{reject, Filter, Rejection, Reply};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    pub timestamp: String,
}

#[derive(Debug)]
pub struct DatabaseError {
    pub message: String,
}

impl reject::Reject for DatabaseError {}

#[derive(Debug)]
pub struct NotFoundError {
    pub message: String,
}

impl reject::Reject for NotFoundError {}

#[derive(Debug)]
pub struct ValidationError {
    pub message: String,
}

impl reject::Reject for ValidationError {}

#[derive(Debug)]
pub struct ProcessingError {
    pub message: String,
}

impl reject::Reject for ProcessingError {}

/// A storage or fetch dependency failed.
#[derive(Debug)]
pub struct UpstreamError {
    pub message: String,
}

impl reject::Reject for UpstreamError {}

#[derive(Debug)]
pub struct ConflictError {
    pub message: String,
}

impl reject::Reject for ConflictError {}

pub fn database_rejection(err: impl std::fmt::Display) -> Rejection {
    log::error!("Database error: {}", err);
    reject::custom(DatabaseError {
        message: "Database error".to_string(),
    })
}

pub fn photo_rejection(err: PhotoError) -> Rejection {
    let message = err.to_string();
    match err {
        PhotoError::Validation(_) => reject::custom(ValidationError { message }),
        PhotoError::Processing(_) => reject::custom(ProcessingError { message }),
        PhotoError::UploadFailed(_) | PhotoError::Fetch(_) => {
            log::warn!("{}", message);
            reject::custom(UpstreamError { message })
        }
        PhotoError::NotFound(_) => reject::custom(NotFoundError { message }),
        PhotoError::InvalidAngle(_) | PhotoError::Conflict(_) => {
            reject::custom(ConflictError { message })
        }
        PhotoError::Database(e) => database_rejection(e),
    }
}

pub fn service_rejection(err: ServiceError) -> Rejection {
    let message = err.to_string();
    match err {
        ServiceError::Validation(_) | ServiceError::Geo(_) => {
            reject::custom(ValidationError { message })
        }
        ServiceError::NotFound(_) => reject::custom(NotFoundError { message }),
        ServiceError::Database(e) => database_rejection(e),
    }
}

pub fn search_rejection(err: SearchError) -> Rejection {
    match err {
        SearchError::Validation(message) => reject::custom(ValidationError { message }),
        SearchError::Database(e) => database_rejection(e),
    }
}

pub fn location_rejection(err: LocationError) -> Rejection {
    let message = err.to_string();
    match err {
        LocationError::Unrecognized(_) | LocationError::Geo(_) => {
            reject::custom(ValidationError { message })
        }
        LocationError::UnknownPostcode(_) => reject::custom(NotFoundError { message }),
        LocationError::Database(e) => database_rejection(e),
    }
}

pub fn with_db(db_pool: DbPool) -> impl Filter<Extract = (DbPool,), Error = Infallible> + Clone {
    warp::any().map(move || db_pool.clone())
}

pub fn with_pipeline(
    pipeline: PhotoPipeline,
) -> impl Filter<Extract = (PhotoPipeline,), Error = Infallible> + Clone {
    warp::any().map(move || pipeline.clone())
}

pub fn with_log_service(
    log_service: LogService,
) -> impl Filter<Extract = (LogService,), Error = Infallible> + Clone {
    warp::any().map(move || log_service.clone())
}

pub fn with_trig_service(
    trig_service: TrigService,
) -> impl Filter<Extract = (TrigService,), Error = Infallible> + Clone {
    warp::any().map(move || trig_service.clone())
}

pub fn with_postcodes(
    postcodes: Arc<dyn PostcodeLookup>,
) -> impl Filter<Extract = (Arc<dyn PostcodeLookup>,), Error = Infallible> + Clone {
    warp::any().map(move || postcodes.clone())
}

pub fn with_response_cache(
    response_cache: ResponseCache,
) -> impl Filter<Extract = (ResponseCache,), Error = Infallible> + Clone {
    warp::any().map(move || response_cache.clone())
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let message;
    let timestamp = chrono::Utc::now().to_rfc3339();

    if err.is_not_found() {
        code = StatusCode::NOT_FOUND;
        message = "Not Found".to_string();
    } else if let Some(database_error) = err.find::<DatabaseError>() {
        code = StatusCode::INTERNAL_SERVER_ERROR;
        message = database_error.message.clone();
    } else if let Some(not_found) = err.find::<NotFoundError>() {
        code = StatusCode::NOT_FOUND;
        message = not_found.message.clone();
    } else if let Some(validation_error) = err.find::<ValidationError>() {
        code = StatusCode::BAD_REQUEST;
        message = validation_error.message.clone();
    } else if let Some(processing_error) = err.find::<ProcessingError>() {
        code = StatusCode::UNPROCESSABLE_ENTITY;
        message = processing_error.message.clone();
    } else if let Some(upstream_error) = err.find::<UpstreamError>() {
        code = StatusCode::BAD_GATEWAY;
        message = upstream_error.message.clone();
    } else if let Some(conflict) = err.find::<ConflictError>() {
        code = StatusCode::CONFLICT;
        message = conflict.message.clone();
    } else if let Some(invalid_query) = err.find::<warp::reject::InvalidQuery>() {
        code = StatusCode::BAD_REQUEST;
        message = invalid_query.to_string();
    } else if let Some(body_error) = err.find::<warp::body::BodyDeserializeError>() {
        code = StatusCode::BAD_REQUEST;
        message = body_error.to_string();
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        code = StatusCode::PAYLOAD_TOO_LARGE;
        message = "Payload too large".to_string();
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        code = StatusCode::LENGTH_REQUIRED;
        message = "Content-Length required".to_string();
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        code = StatusCode::UNSUPPORTED_MEDIA_TYPE;
        message = "Unsupported media type".to_string();
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = StatusCode::METHOD_NOT_ALLOWED;
        message = "Method not allowed".to_string();
    } else {
        log::error!("Unhandled rejection: {:?}", err);
        code = StatusCode::INTERNAL_SERVER_ERROR;
        message = "Internal server error".to_string();
    }

    let error_response = ErrorResponse {
        error: message,
        code: code.as_u16(),
        timestamp,
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&error_response),
        code,
    ))
}

pub fn cors() -> warp::cors::Builder {
    warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type", "authorization"])
        .allow_methods(vec!["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
}
