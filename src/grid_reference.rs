//! Ordnance Survey national grid references ("SU 12345 67890").

use std::fmt;

use crate::coordinates::{osgb_to_wgs84, GeoError};

/// The 100 km squares of the national grid as (letters, easting, northing) in
/// units of 100 km. Seven columns by thirteen rows cover the whole grid.
pub const GRID_SQUARES: [(&str, u32, u32); 91] = [
    ("HL", 0, 12), ("HM", 1, 12), ("HN", 2, 12), ("HO", 3, 12), ("HP", 4, 12), ("JL", 5, 12), ("JM", 6, 12),
    ("HQ", 0, 11), ("HR", 1, 11), ("HS", 2, 11), ("HT", 3, 11), ("HU", 4, 11), ("JQ", 5, 11), ("JR", 6, 11),
    ("HV", 0, 10), ("HW", 1, 10), ("HX", 2, 10), ("HY", 3, 10), ("HZ", 4, 10), ("JV", 5, 10), ("JW", 6, 10),
    ("NA", 0, 9), ("NB", 1, 9), ("NC", 2, 9), ("ND", 3, 9), ("NE", 4, 9), ("OA", 5, 9), ("OB", 6, 9),
    ("NF", 0, 8), ("NG", 1, 8), ("NH", 2, 8), ("NJ", 3, 8), ("NK", 4, 8), ("OF", 5, 8), ("OG", 6, 8),
    ("NL", 0, 7), ("NM", 1, 7), ("NN", 2, 7), ("NO", 3, 7), ("NP", 4, 7), ("OL", 5, 7), ("OM", 6, 7),
    ("NQ", 0, 6), ("NR", 1, 6), ("NS", 2, 6), ("NT", 3, 6), ("NU", 4, 6), ("OQ", 5, 6), ("OR", 6, 6),
    ("NV", 0, 5), ("NW", 1, 5), ("NX", 2, 5), ("NY", 3, 5), ("NZ", 4, 5), ("OV", 5, 5), ("OW", 6, 5),
    ("SA", 0, 4), ("SB", 1, 4), ("SC", 2, 4), ("SD", 3, 4), ("SE", 4, 4), ("TA", 5, 4), ("TB", 6, 4),
    ("SF", 0, 3), ("SG", 1, 3), ("SH", 2, 3), ("SJ", 3, 3), ("SK", 4, 3), ("TF", 5, 3), ("TG", 6, 3),
    ("SL", 0, 2), ("SM", 1, 2), ("SN", 2, 2), ("SO", 3, 2), ("SP", 4, 2), ("TL", 5, 2), ("TM", 6, 2),
    ("SQ", 0, 1), ("SR", 1, 1), ("SS", 2, 1), ("ST", 3, 1), ("SU", 4, 1), ("TQ", 5, 1), ("TR", 6, 1),
    ("SV", 0, 0), ("SW", 1, 0), ("SX", 2, 0), ("SY", 3, 0), ("SZ", 4, 0), ("TV", 5, 0), ("TW", 6, 0),
];

const SQUARE_SIZE_METERS: u32 = 100_000;
const MIN_DIGITS: usize = 2;
const MAX_DIGITS: usize = 10;

/// A parsed grid reference with its full eastings/northings and the WGS84
/// position they approximate.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPosition {
    pub lat: f64,
    pub lon: f64,
    pub eastings: u32,
    pub northings: u32,
    pub normalized: String,
}

// Only constructed once the square is known to exist.
struct GridReference {
    eastings: u32,
    northings: u32,
}

impl fmt::Display for GridReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letters = square_letters(
            self.eastings / SQUARE_SIZE_METERS,
            self.northings / SQUARE_SIZE_METERS,
        )
        .ok_or(fmt::Error)?;
        write!(
            f,
            "{} {:05} {:05}",
            letters,
            self.eastings % SQUARE_SIZE_METERS,
            self.northings % SQUARE_SIZE_METERS
        )
    }
}

fn square_offset(letters: &str) -> Option<(u32, u32)> {
    GRID_SQUARES
        .iter()
        .find(|(square, _, _)| *square == letters)
        .map(|(_, e, n)| (*e, *n))
}

fn square_letters(easting_index: u32, northing_index: u32) -> Option<&'static str> {
    GRID_SQUARES
        .iter()
        .find(|(_, e, n)| *e == easting_index && *n == northing_index)
        .map(|(square, _, _)| *square)
}

// "123" at precision 3 means 12300 m into the square.
fn pad_to_meters(digits: &str) -> Result<u32, GeoError> {
    let padded = format!("{:0<5}", digits);
    padded
        .parse()
        .map_err(|_| GeoError::InvalidGridReference(digits.to_string()))
}

pub fn parse_grid_reference(text: &str) -> Result<GridPosition, GeoError> {
    let invalid = || GeoError::InvalidGridReference(text.to_string());

    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if compact.len() < 2 || !compact.is_char_boundary(2) {
        return Err(invalid());
    }
    let (letters, digits) = compact.split_at(2);

    let (square_e, square_n) = square_offset(letters).ok_or_else(invalid)?;

    if !digits.chars().all(|c| c.is_ascii_digit())
        || digits.len() % 2 != 0
        || !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len())
    {
        return Err(invalid());
    }

    let (east_digits, north_digits) = digits.split_at(digits.len() / 2);
    let eastings = square_e * SQUARE_SIZE_METERS + pad_to_meters(east_digits)?;
    let northings = square_n * SQUARE_SIZE_METERS + pad_to_meters(north_digits)?;

    let (lat, lon) = osgb_to_wgs84(eastings as f64, northings as f64);

    Ok(GridPosition {
        lat,
        lon,
        eastings,
        northings,
        normalized: format_grid_reference(eastings, northings).ok_or_else(invalid)?,
    })
}

/// Formats eastings/northings at 1 m precision, or `None` when they fall
/// outside the national grid.
pub fn format_grid_reference(eastings: u32, northings: u32) -> Option<String> {
    square_letters(
        eastings / SQUARE_SIZE_METERS,
        northings / SQUARE_SIZE_METERS,
    )?;
    Some(
        GridReference {
            eastings,
            northings,
        }
        .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_complete_and_unique() {
        let mut letters: Vec<&str> = GRID_SQUARES.iter().map(|(l, _, _)| *l).collect();
        letters.sort();
        letters.dedup();
        assert_eq!(letters.len(), 91);

        for e in 0..7 {
            for n in 0..13 {
                assert!(square_letters(e, n).is_some(), "missing square {},{}", e, n);
            }
        }
    }

    #[test]
    fn test_parse_full_precision() {
        let pos = parse_grid_reference("TQ 30080 80400").unwrap();
        assert_eq!(pos.eastings, 530_080);
        assert_eq!(pos.northings, 180_400);
        assert_eq!(pos.normalized, "TQ 30080 80400");
        assert!((51.0..52.0).contains(&pos.lat));
    }

    #[test]
    fn test_parse_pads_low_precision() {
        let pos = parse_grid_reference("su1234").unwrap();
        assert_eq!(pos.eastings, 412_000);
        assert_eq!(pos.northings, 134_000);
        assert_eq!(pos.normalized, "SU 12000 34000");

        let coarse = parse_grid_reference("NN16").unwrap();
        assert_eq!(coarse.eastings, 210_000);
        assert_eq!(coarse.northings, 760_000);
    }

    #[test]
    fn test_parse_ten_digit_reference() {
        let pos = parse_grid_reference("NN1665771250").unwrap();
        assert_eq!(pos.eastings, 216_657);
        assert_eq!(pos.northings, 771_250);
    }

    #[test]
    fn test_rejects_unknown_prefix_and_odd_digits() {
        assert!(parse_grid_reference("XX 1234").is_err());
        assert!(parse_grid_reference("IA 1234").is_err());
        assert!(parse_grid_reference("TQ 123").is_err());
        assert!(parse_grid_reference("TQ").is_err());
        assert!(parse_grid_reference("TQ 123456789012").is_err());
        assert!(parse_grid_reference("TQ 12a4").is_err());
        assert!(parse_grid_reference("").is_err());
        assert!(parse_grid_reference("T").is_err());
    }

    #[test]
    fn test_normalized_form_is_stable() {
        for (letters, _, _) in GRID_SQUARES.iter() {
            let text = format!("{}12345 67890", letters);
            let first = parse_grid_reference(&text).unwrap();
            let second = parse_grid_reference(&first.normalized).unwrap();
            assert_eq!(first.normalized, second.normalized);
            assert_eq!(first.eastings, second.eastings);
            assert_eq!(first.northings, second.northings);
        }
    }

    #[test]
    fn test_format_outside_grid() {
        assert_eq!(format_grid_reference(700_000, 0), None);
        assert_eq!(
            format_grid_reference(412_345, 167_890).as_deref(),
            Some("SU 12345 67890")
        );
    }
}
