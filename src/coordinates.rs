//! WGS84 coordinate helpers: the OSGB approximation, free-text lat/lon parsing
//! and great-circle distance.

use std::fmt;

/// Mean earth radius used by every distance calculation in the service.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Operating region of the service. Coordinates outside it are rejected even
/// when they are well-formed.
pub const MIN_LAT: f64 = 49.0;
pub const MAX_LAT: f64 = 61.0;
pub const MIN_LON: f64 = -8.0;
pub const MAX_LON: f64 = 2.0;

// OSGB36 true origin: 49°N 2°W sits at E 400 000, N -100 000.
const ORIGIN_LAT: f64 = 49.0;
const ORIGIN_LON: f64 = -2.0;
const ORIGIN_EASTINGS: f64 = 400_000.0;
const ORIGIN_NORTHINGS: f64 = -100_000.0;
const METERS_PER_DEGREE_LAT: f64 = 111_320.0;
// cos(54°), a representative latitude for Great Britain.
const UK_LATITUDE_COSINE: f64 = 0.587_785_252_292_473_1;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoError {
    #[error("Invalid grid reference: {0}")]
    InvalidGridReference(String),
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
    #[error("Coordinates ({lat}, {lon}) are outside the supported region")]
    OutOfRegion { lat: f64, lon: f64 },
    #[error("Invalid postcode: {0}")]
    InvalidPostcode(String),
}

/// Converts OSGB36 eastings/northings to an approximate WGS84 (lat, lon).
///
/// This is a linear approximation anchored at the grid's true origin with
/// constant per-metre scale factors. It is not a geodetic transform: errors
/// grow to a few kilometres towards the edges of the grid. Stored marker
/// positions were produced with the same formula, so it must not be swapped
/// for a precise projection on its own.
pub fn osgb_to_wgs84(eastings: f64, northings: f64) -> (f64, f64) {
    let lat = ORIGIN_LAT + (northings - ORIGIN_NORTHINGS) / METERS_PER_DEGREE_LAT;
    let lon = ORIGIN_LON
        + (eastings - ORIGIN_EASTINGS) / (METERS_PER_DEGREE_LAT * UK_LATITUDE_COSINE);
    (lat, lon)
}

/// Great-circle distance in metres between two WGS84 points.
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * a.sqrt().min(1.0).asin()
}

pub fn is_within_region(lat: f64, lon: f64) -> bool {
    (MIN_LAT..=MAX_LAT).contains(&lat) && (MIN_LON..=MAX_LON).contains(&lon)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Lat,
    Lon,
}

#[derive(Debug)]
struct Component {
    value: f64,
    axis: Option<Axis>,
}

fn hemisphere(c: char) -> Option<(Axis, f64)> {
    match c.to_ascii_uppercase() {
        'N' => Some((Axis::Lat, 1.0)),
        'S' => Some((Axis::Lat, -1.0)),
        'E' => Some((Axis::Lon, 1.0)),
        'W' => Some((Axis::Lon, -1.0)),
        _ => None,
    }
}

fn parse_component(token: &str) -> Result<Component, GeoError> {
    let invalid = || GeoError::InvalidCoordinates(token.to_string());

    let (number, axis, sign) = match token.chars().last().and_then(hemisphere) {
        Some((axis, sign)) => (&token[..token.len() - 1], Some(axis), sign),
        None => (token, None, 1.0),
    };

    let value: f64 = number.trim().parse().map_err(|_| invalid())?;
    if !value.is_finite() {
        return Err(invalid());
    }

    Ok(Component {
        value: value * sign,
        axis,
    })
}

/// Parses free text such as `"51.5, -0.12"`, `"51.5N 0.12W"` or
/// `"0.12w,51.5n"` into a (lat, lon) pair inside the operating region.
pub fn parse_lat_lon_text(text: &str) -> Result<(f64, f64), GeoError> {
    let mut tokens: Vec<String> = Vec::new();
    for raw in text.split(|c: char| c == ',' || c.is_whitespace()) {
        if raw.is_empty() {
            continue;
        }
        // A detached hemisphere letter ("51.5 N") belongs to the previous number.
        let is_bare_letter = raw.len() == 1 && raw.chars().next().and_then(hemisphere).is_some();
        match tokens.last_mut() {
            Some(prev) if is_bare_letter => prev.push_str(raw),
            _ => tokens.push(raw.to_string()),
        }
    }

    if tokens.len() != 2 {
        return Err(GeoError::InvalidCoordinates(text.to_string()));
    }

    let first = parse_component(&tokens[0])?;
    let second = parse_component(&tokens[1])?;

    let (lat, lon) = match (first.axis, second.axis) {
        (Some(a), Some(b)) if a == b => {
            return Err(GeoError::InvalidCoordinates(text.to_string()));
        }
        (Some(Axis::Lon), _) | (_, Some(Axis::Lat)) => (second.value, first.value),
        _ => (first.value, second.value),
    };

    if !is_within_region(lat, lon) {
        return Err(GeoError::OutOfRegion { lat, lon });
    }

    Ok((lat, lon))
}

/// A (lat, lon) pair formatted the way `parse_lat_lon_text` reads it back.
pub struct LatLonText(pub f64, pub f64);

impl fmt::Display for LatLonText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.0, self.1)
    }
}

pub fn format_lat_lon(lat: f64, lon: f64) -> String {
    LatLonText(lat, lon).to_string()
}
