//! Geohash spatial keys.
//!
//! Keys are standard base32 geohashes: longitude and latitude bits are
//! interleaved (longitude first) and packed five bits per character. A key of
//! precision `p` is always the prefix of the key of precision `p + 1` for the
//! same point, so a longer shared prefix means a smaller shared cell.
//!
//! These keys only partition hazards for indexed retrieval. Correlation
//! decisions use exact geometry from [`crate::proximity`].

use crate::error::CoreError;
use crate::models::Point;
use crate::spatial::EARTH_RADIUS_M;

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

pub const MAX_PRECISION: usize = 12;

/// Bounding box of a geohash cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoCell {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl GeoCell {
    fn world() -> Self {
        Self {
            lat_min: -90.0,
            lat_max: 90.0,
            lon_min: -180.0,
            lon_max: 180.0,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.lat_min + self.lat_max) / 2.0,
            (self.lon_min + self.lon_max) / 2.0,
        )
    }

    pub fn contains(&self, point: &Point) -> bool {
        (self.lat_min..=self.lat_max).contains(&point.lat)
            && (self.lon_min..=self.lon_max).contains(&point.lon)
    }
}

fn check_precision(precision: usize) -> Result<(), CoreError> {
    if (1..=MAX_PRECISION).contains(&precision) {
        Ok(())
    } else {
        Err(CoreError::InvalidPrecision(precision))
    }
}

/// Encode a coordinate as a geohash of `precision` characters.
pub fn encode(lat: f64, lon: f64, precision: usize) -> Result<String, CoreError> {
    check_precision(precision)?;
    Point::new(lat, lon).validate()?;

    let mut cell = GeoCell::world();
    let mut key = String::with_capacity(precision);
    let mut even_bit = true;

    for _ in 0..precision {
        let mut index = 0usize;
        for _ in 0..5 {
            index <<= 1;
            if even_bit {
                let mid = (cell.lon_min + cell.lon_max) / 2.0;
                if lon >= mid {
                    index |= 1;
                    cell.lon_min = mid;
                } else {
                    cell.lon_max = mid;
                }
            } else {
                let mid = (cell.lat_min + cell.lat_max) / 2.0;
                if lat >= mid {
                    index |= 1;
                    cell.lat_min = mid;
                } else {
                    cell.lat_max = mid;
                }
            }
            even_bit = !even_bit;
        }
        key.push(BASE32[index] as char);
    }

    Ok(key)
}

/// Decode a geohash to the bounds of its cell.
pub fn decode_bounds(key: &str) -> Result<GeoCell, CoreError> {
    if key.is_empty() || key.len() > MAX_PRECISION {
        return Err(CoreError::InvalidGeohash(key.to_string()));
    }

    let mut cell = GeoCell::world();
    let mut even_bit = true;

    for ch in key.bytes() {
        let index = BASE32
            .iter()
            .position(|&c| c == ch.to_ascii_lowercase())
            .ok_or_else(|| CoreError::InvalidGeohash(key.to_string()))?;

        for shift in (0..5).rev() {
            let bit = (index >> shift) & 1;
            if even_bit {
                let mid = (cell.lon_min + cell.lon_max) / 2.0;
                if bit == 1 {
                    cell.lon_min = mid;
                } else {
                    cell.lon_max = mid;
                }
            } else {
                let mid = (cell.lat_min + cell.lat_max) / 2.0;
                if bit == 1 {
                    cell.lat_min = mid;
                } else {
                    cell.lat_max = mid;
                }
            }
            even_bit = !even_bit;
        }
    }

    Ok(cell)
}

/// Decode a geohash to its cell centre. Lossy: this is the representative
/// coordinate of the cell, not the point that was encoded.
pub fn decode(key: &str) -> Result<Point, CoreError> {
    decode_bounds(key).map(|cell| cell.center())
}

/// Approximate `(width_m, height_m)` of a cell at the equator.
pub fn cell_size_m(precision: usize) -> Result<(f64, f64), CoreError> {
    check_precision(precision)?;
    let total_bits = precision * 5;
    let lon_bits = total_bits.div_ceil(2) as i32;
    let lat_bits = (total_bits / 2) as i32;
    let meters_per_deg = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
    let width = 360.0 / 2f64.powi(lon_bits) * meters_per_deg;
    let height = 180.0 / 2f64.powi(lat_bits) * meters_per_deg;
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_known_geohashes() {
        assert_eq!(encode(57.64911, 10.40744, 11).unwrap(), "u4pruydqqvj");
        assert_eq!(encode(42.6, -5.6, 5).unwrap(), "ezs42");
    }

    #[test]
    fn encode_is_deterministic() {
        let a = encode(51.5074, -0.1278, 7).unwrap();
        let b = encode(51.5074, -0.1278, 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn higher_precision_extends_the_key() {
        let mut previous = String::new();
        for precision in 1..=MAX_PRECISION {
            let key = encode(53.4808, -2.2426, precision).unwrap();
            assert_eq!(key.len(), precision);
            assert!(key.starts_with(&previous));
            previous = key;
        }
    }

    #[test]
    fn nearby_points_share_longer_prefix_than_distant_points() {
        let london = encode(51.5074, -0.1278, 8).unwrap();
        let westminster = encode(51.4995, -0.1248, 8).unwrap();
        let edinburgh = encode(55.9533, -3.1883, 8).unwrap();

        let shared = |a: &str, b: &str| a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count();
        assert!(shared(&london, &westminster) > shared(&london, &edinburgh));
    }

    #[test]
    fn decode_returns_cell_center_not_input() {
        let key = encode(51.55, -0.05, 4).unwrap();
        let cell = decode_bounds(&key).unwrap();
        let center = decode(&key).unwrap();

        assert!(cell.contains(&Point::new(51.55, -0.05)));
        assert!(cell.contains(&center));
        assert_ne!(center, Point::new(51.55, -0.05));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(encode(0.0, 0.0, 0), Err(CoreError::InvalidPrecision(0)));
        assert_eq!(encode(0.0, 0.0, 13), Err(CoreError::InvalidPrecision(13)));
        assert!(matches!(
            encode(95.0, 0.0, 5),
            Err(CoreError::InvalidCoordinate { .. })
        ));
        assert!(matches!(decode("abc"), Err(CoreError::InvalidGeohash(_))));
        assert!(decode("").is_err());
    }

    #[test]
    fn cell_size_shrinks_with_precision() {
        let (w4, h4) = cell_size_m(4).unwrap();
        let (w5, h5) = cell_size_m(5).unwrap();
        assert!(w5 < w4 && h5 < h4);
        // precision 4 is roughly 39km x 19.5km
        assert!((w4 - 39_000.0).abs() < 1_000.0);
    }
}
