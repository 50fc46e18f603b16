//! Error types for core validation and key encoding.

use thiserror::Error;

/// Errors raised by the pure core library.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A route needs at least two points to form a segment.
    #[error("malformed route: expected at least 2 points, got {points}")]
    MalformedRoute { points: usize },

    /// Latitude or longitude outside the valid range (or not finite).
    #[error("invalid coordinate: lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    /// Geohash precision outside 1..=12.
    #[error("invalid geohash precision: {0} (expected 1..=12)")]
    InvalidPrecision(usize),

    /// Geohash string containing characters outside the base32 alphabet.
    #[error("invalid geohash: {0:?}")]
    InvalidGeohash(String),
}
