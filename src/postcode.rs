use crate::coordinates::{haversine_distance_m, GeoError};

#[derive(Debug, Clone, PartialEq)]
pub struct PostcodeCandidate {
    pub code: String,
    pub lat: f64,
    pub lon: f64,
}

/// Upper-cases a UK postcode and re-inserts the single space before the
/// three-character inward code (`"sw1a1aa"` -> `"SW1A 1AA"`).
pub fn normalize_postcode(text: &str) -> Result<String, GeoError> {
    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if !(5..=7).contains(&compact.len()) || !compact.is_ascii() {
        return Err(GeoError::InvalidPostcode(text.to_string()));
    }

    let (outward, inward) = compact.split_at(compact.len() - 3);
    let inward_bytes = inward.as_bytes();
    let inward_ok = inward_bytes[0].is_ascii_digit()
        && inward_bytes[1].is_ascii_alphabetic()
        && inward_bytes[2].is_ascii_alphabetic();
    let outward_ok = outward
        .as_bytes()
        .first()
        .is_some_and(|b| b.is_ascii_alphabetic())
        && outward.chars().all(|c| c.is_ascii_alphanumeric())
        && outward.chars().any(|c| c.is_ascii_digit());

    if !inward_ok || !outward_ok {
        return Err(GeoError::InvalidPostcode(text.to_string()));
    }

    Ok(format!("{} {}", outward, inward))
}

/// Nearest candidate by haversine distance. Ties go to the earliest candidate.
pub fn find_nearest_postcode(lat: f64, lon: f64, candidates: &[PostcodeCandidate]) -> Option<&str> {
    let mut best: Option<(&PostcodeCandidate, f64)> = None;
    for candidate in candidates {
        let distance = haversine_distance_m(lat, lon, candidate.lat, candidate.lon);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((candidate, distance)),
        }
    }
    best.map(|(candidate, _)| candidate.code.as_str())
}
