pub mod blob_fetch;
pub mod cache;
pub mod config;
pub mod coordinates;
pub mod db;
pub mod grid_reference;
pub mod image_processor;
pub mod location_search;
pub mod log_service;
pub mod object_store;
pub mod photo_pipeline;
pub mod postcode;
pub mod routes;
pub mod search;
pub mod trig_service;
pub mod warp_handlers;
pub mod warp_helpers;
