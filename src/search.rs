//! Distance-ranked marker search.
//!
//! The point store applies the cheap relational filters (name, county,
//! physical type, retirement, "already logged by") and an optional bounding
//! box. Everything that depends on the exact distance happens here:
//! haversine distance, the `max_km` cut-off, ordering and pagination.
//! Pagination always runs last, so page boundaries are computed over the
//! fully filtered set.

use async_trait::async_trait;
use serde::Serialize;
use std::cmp::Ordering;
use std::str::FromStr;

use crate::coordinates::haversine_distance_m;
use crate::db::Trig;

/// Markers with a status above this value are retired (destroyed, moved,
/// unconfirmed) and left out of search results.
pub const RETIRED_STATUS_THRESHOLD: i64 = 60;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

// Slightly under the haversine length of a degree of latitude (111.195 km),
// so bounding boxes err on the large side.
const KM_PER_DEGREE: f64 = 111.0;
const BOUNDING_BOX_MARGIN: f64 = 1.1;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Invalid search: {0}")]
    Validation(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Id,
    Name,
    Distance,
}

impl FromStr for SortKey {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(SortKey::Id),
            "name" => Ok(SortKey::Name),
            "distance" => Ok(SortKey::Distance),
            other => Err(SearchError::Validation(format!(
                "unknown sort key '{}', expected id, name or distance",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrigSearch {
    pub center: Option<(f64, f64)>,
    pub max_km: Option<f64>,
    pub name: Option<String>,
    pub county: Option<String>,
    pub physical_type: Option<String>,
    pub exclude_logged_by: Option<i64>,
    pub order: Option<SortKey>,
    pub skip: u32,
    pub limit: u32,
}

impl Default for TrigSearch {
    fn default() -> Self {
        Self {
            center: None,
            max_km: None,
            name: None,
            county: None,
            physical_type: None,
            exclude_logged_by: None,
            order: None,
            skip: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl TrigSearch {
    /// Rejects inconsistent combinations before any distance is computed.
    pub fn validate(&self) -> Result<(), SearchError> {
        let invalid = |msg: &str| Err(SearchError::Validation(msg.to_string()));

        if !(1..=MAX_PAGE_SIZE).contains(&self.limit) {
            return Err(SearchError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        if let Some((lat, lon)) = self.center {
            if !lat.is_finite() || !lon.is_finite() || lat.abs() > 90.0 || lon.abs() > 180.0 {
                return invalid("center is not a valid lat/lon");
            }
        }

        match (self.center, self.max_km) {
            (None, Some(_)) => return invalid("max_km requires a center point"),
            (_, Some(km)) if !km.is_finite() || km <= 0.0 => {
                return invalid("max_km must be a positive number")
            }
            _ => {}
        }

        if self.order == Some(SortKey::Distance) && self.center.is_none() {
            return invalid("ordering by distance requires a center point");
        }

        Ok(())
    }

    pub fn effective_order(&self) -> SortKey {
        match (self.order, self.center) {
            (Some(order), _) => order,
            (None, Some(_)) => SortKey::Distance,
            (None, None) => SortKey::Id,
        }
    }

    fn candidate_filter(&self) -> CandidateFilter {
        CandidateFilter {
            name: self.name.clone(),
            county: self.county.clone(),
            physical_type: self.physical_type.clone(),
            exclude_logged_by: self.exclude_logged_by,
            bounds: match (self.center, self.max_km) {
                (Some((lat, lon)), Some(km)) => Some(BoundingBox::around(lat, lon, km)),
                _ => None,
            },
            max_status: RETIRED_STATUS_THRESHOLD,
        }
    }
}

/// Lat/lon rectangle guaranteed to contain every point within the radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn around(lat: f64, lon: f64, radius_km: f64) -> Self {
        let lat_delta = radius_km / KM_PER_DEGREE * BOUNDING_BOX_MARGIN;
        let min_lat = (lat - lat_delta).max(-90.0);
        let max_lat = (lat + lat_delta).min(90.0);

        // Longitude degrees shrink towards the poles; use the band's worst case.
        let widest = min_lat.abs().max(max_lat.abs()).to_radians().cos().max(0.01);
        let lon_delta = (radius_km / (KM_PER_DEGREE * widest) * BOUNDING_BOX_MARGIN).min(180.0);

        let (min_lon, max_lon) = (lon - lon_delta, lon + lon_delta);

        // A band touching a pole, or a span across the antimeridian, cannot be
        // one longitude interval; widen to every longitude and let the
        // distance check do the filtering.
        if min_lat <= -90.0 || max_lat >= 90.0 || min_lon < -180.0 || max_lon > 180.0 {
            return Self {
                min_lat,
                max_lat,
                min_lon: -180.0,
                max_lon: 180.0,
            };
        }

        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

/// Filters pushed down to the point store.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFilter {
    pub name: Option<String>,
    pub county: Option<String>,
    pub physical_type: Option<String>,
    pub exclude_logged_by: Option<i64>,
    pub bounds: Option<BoundingBox>,
    pub max_status: i64,
}

/// Source of candidate markers, returned in natural row order (id ascending).
#[async_trait]
pub trait PointStore: Send + Sync {
    async fn candidates(&self, filter: &CandidateFilter) -> Result<Vec<Trig>, SearchError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedTrig {
    #[serde(flatten)]
    pub trig: Trig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchPage<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub skip: u32,
    pub limit: u32,
    pub has_more: bool,
}

impl<T> SearchPage<T> {
    pub fn next_skip(&self) -> Option<u32> {
        self.has_more.then(|| self.skip + self.items.len() as u32)
    }

    pub fn previous_skip(&self) -> Option<u32> {
        (self.skip > 0).then(|| self.skip.saturating_sub(self.limit))
    }
}

pub fn paginate<T>(items: Vec<T>, skip: u32, limit: u32) -> SearchPage<T> {
    let total = items.len();
    let page: Vec<T> = items
        .into_iter()
        .skip(skip as usize)
        .take(limit as usize)
        .collect();
    let has_more = (skip as usize) + page.len() < total;

    SearchPage {
        items: page,
        total,
        skip,
        limit,
        has_more,
    }
}

/// Attaches distances, drops markers beyond `max_km` and orders the rest.
/// Sorting is stable, so equal keys keep the store's row order.
pub fn rank(candidates: Vec<Trig>, query: &TrigSearch) -> Vec<RankedTrig> {
    let mut ranked: Vec<RankedTrig> = candidates
        .into_iter()
        .map(|trig| {
            let distance_km = query.center.map(|(lat, lon)| {
                haversine_distance_m(lat, lon, trig.wgs_lat, trig.wgs_long) / 1000.0
            });
            RankedTrig { trig, distance_km }
        })
        .filter(|ranked| match (ranked.distance_km, query.max_km) {
            (Some(distance), Some(max_km)) => distance <= max_km,
            _ => true,
        })
        .collect();

    match query.effective_order() {
        SortKey::Id => ranked.sort_by_key(|r| r.trig.id),
        SortKey::Name => ranked.sort_by_cached_key(|r| r.trig.name.to_lowercase()),
        SortKey::Distance => ranked.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(Ordering::Equal)
        }),
    }

    ranked
}

pub async fn search_trigs(
    store: &dyn PointStore,
    query: &TrigSearch,
) -> Result<SearchPage<RankedTrig>, SearchError> {
    query.validate()?;

    let candidates = store.candidates(&query.candidate_filter()).await?;
    let ranked = rank(candidates, query);

    log::debug!(
        "Trig search matched {} markers (skip {}, limit {})",
        ranked.len(),
        query.skip,
        query.limit
    );

    Ok(paginate(ranked, query.skip, query.limit))
}
