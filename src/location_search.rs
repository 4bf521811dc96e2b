use async_trait::async_trait;
use serde::Serialize;

use crate::coordinates::{format_lat_lon, parse_lat_lon_text, GeoError};
use crate::grid_reference::parse_grid_reference;
use crate::postcode::{find_nearest_postcode, normalize_postcode, PostcodeCandidate};

/// Radius searched when labelling a position with its nearest postcode.
pub const NEAREST_POSTCODE_RADIUS_KM: f64 = 5.0;

#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    #[error("Unrecognized location: {0}")]
    Unrecognized(String),
    #[error("Unknown postcode: {0}")]
    UnknownPostcode(String),
    #[error(transparent)]
    Geo(#[from] GeoError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait PostcodeLookup: Send + Sync {
    async fn find_postcode(&self, code: &str) -> Result<Option<PostcodeCandidate>, sqlx::Error>;

    /// Postcodes whose position lies within `radius_km` of the point, in
    /// storage order.
    async fn postcodes_near(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
    ) -> Result<Vec<PostcodeCandidate>, sqlx::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    GridReference,
    LatLon,
    Postcode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedLocation {
    pub kind: LocationKind,
    pub lat: f64,
    pub lon: f64,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nearest_postcode: Option<String>,
}

/// Resolves free text to a position. Grid references are tried first, then
/// lat/lon text, then postcodes.
pub async fn resolve_location(
    query: &str,
    postcodes: &dyn PostcodeLookup,
) -> Result<ResolvedLocation, LocationError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(LocationError::Unrecognized(query.to_string()));
    }

    if let Ok(position) = parse_grid_reference(query) {
        let nearest_postcode = nearest_postcode(postcodes, position.lat, position.lon).await?;
        return Ok(ResolvedLocation {
            kind: LocationKind::GridReference,
            lat: position.lat,
            lon: position.lon,
            label: position.normalized,
            nearest_postcode,
        });
    }

    match parse_lat_lon_text(query) {
        Ok((lat, lon)) => {
            let nearest_postcode = nearest_postcode(postcodes, lat, lon).await?;
            return Ok(ResolvedLocation {
                kind: LocationKind::LatLon,
                lat,
                lon,
                label: format_lat_lon(lat, lon),
                nearest_postcode,
            });
        }
        Err(err @ GeoError::OutOfRegion { .. }) => return Err(err.into()),
        Err(_) => {}
    }

    let code = normalize_postcode(query)
        .map_err(|_| LocationError::Unrecognized(query.to_string()))?;
    let found = postcodes
        .find_postcode(&code)
        .await?
        .ok_or_else(|| LocationError::UnknownPostcode(code.clone()))?;

    Ok(ResolvedLocation {
        kind: LocationKind::Postcode,
        lat: found.lat,
        lon: found.lon,
        label: found.code.clone(),
        nearest_postcode: Some(found.code),
    })
}

pub async fn nearest_postcode(
    postcodes: &dyn PostcodeLookup,
    lat: f64,
    lon: f64,
) -> Result<Option<String>, sqlx::Error> {
    let candidates = postcodes
        .postcodes_near(lat, lon, NEAREST_POSTCODE_RADIUS_KM)
        .await?;
    Ok(find_nearest_postcode(lat, lon, &candidates).map(str::to_string))
}
