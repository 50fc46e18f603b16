//! Great-circle math shared by route measurement and proximity matching.
//!
//! Everything here uses one spherical Earth model so that a distance reported
//! at route submission and a distance used for matching always agree.

use crate::models::Point;

/// Mean Earth radius used by every distance in the system.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Calculate distance between two points in meters using Haversine formula.
///
/// # Arguments
/// * `lat1`, `lon1` - First point coordinates in decimal degrees
/// * `lat2`, `lon2` - Second point coordinates in decimal degrees
///
/// # Returns
/// Distance in meters
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Great-circle distance between two points in meters.
pub fn distance_m(a: &Point, b: &Point) -> f64 {
    haversine_distance(a.lat, a.lon, b.lat, b.lon)
}

/// Sum of great-circle distances between consecutive points.
///
/// Empty and single-point inputs have length 0.
pub fn route_distance_m(points: &[Point]) -> f64 {
    points.windows(2).map(|pair| distance_m(&pair[0], &pair[1])).sum()
}

/// Initial bearing from `from` to `to` in radians (0 = north, π/2 = east).
pub fn bearing(from: &Point, to: &Point) -> f64 {
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let delta_lambda = (to.lon - from.lon).to_radians();

    let x = delta_lambda.sin() * phi2.cos();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    x.atan2(y)
}

/// Offset a position by distance and bearing.
///
/// # Arguments
/// * `origin` - Starting position
/// * `distance_m` - Distance in meters
/// * `bearing_rad` - Bearing in radians (0 = north, π/2 = east)
pub fn offset_by_bearing(origin: &Point, distance_m: f64, bearing_rad: f64) -> Point {
    if distance_m.abs() <= f64::EPSILON {
        return *origin;
    }

    let lat1 = origin.lat.to_radians();
    let lon1 = origin.lon.to_radians();
    let angular_distance = distance_m / EARTH_RADIUS_M;

    let sin_lat1 = lat1.sin();
    let cos_lat1 = lat1.cos();
    let sin_ad = angular_distance.sin();
    let cos_ad = angular_distance.cos();

    let sin_lat2 = sin_lat1 * cos_ad + cos_lat1 * sin_ad * bearing_rad.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();

    let y = bearing_rad.sin() * sin_ad * cos_lat1;
    let x = cos_ad - sin_lat1 * sin_lat2;
    let mut lon2 = lon1 + y.atan2(x);
    lon2 =
        (lon2 + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI) - std::f64::consts::PI;

    Point::new(lat2.to_degrees(), lon2.to_degrees())
}

/// Point at `fraction` (0..=1) of the way along the great circle from `a` to `b`.
pub fn intermediate_point(a: &Point, b: &Point, fraction: f64) -> Point {
    let distance = distance_m(a, b);
    offset_by_bearing(a, distance * fraction, bearing(a, b))
}

/// Signed distance in meters from `point` to the great circle through
/// `start` and `end` (positive = right of the path).
pub fn cross_track_distance_m(point: &Point, start: &Point, end: &Point) -> f64 {
    let d13 = distance_m(start, point) / EARTH_RADIUS_M;
    let theta13 = bearing(start, point);
    let theta12 = bearing(start, end);
    (d13.sin() * (theta13 - theta12).sin()).clamp(-1.0, 1.0).asin() * EARTH_RADIUS_M
}

/// Minimum great-circle distance from `point` to the segment `start`..`end`.
///
/// Uses the cross-track distance when the perpendicular foot lands inside the
/// segment, otherwise the distance to the nearer endpoint.
pub fn distance_to_segment_m(point: &Point, start: &Point, end: &Point) -> f64 {
    let segment_len = distance_m(start, end);
    let to_start = distance_m(start, point);
    if segment_len < 1e-3 {
        return to_start;
    }
    let to_end = distance_m(end, point);

    let theta13 = bearing(start, point);
    let theta12 = bearing(start, end);
    if (theta13 - theta12).cos() < 0.0 {
        // foot falls behind the start vertex
        return to_start;
    }

    let d13 = to_start / EARTH_RADIUS_M;
    let dxt = (d13.sin() * (theta13 - theta12).sin()).clamp(-1.0, 1.0).asin();
    let cos_dxt = dxt.cos();
    let along = if cos_dxt.abs() < f64::EPSILON {
        0.0
    } else {
        (d13.cos() / cos_dxt).clamp(-1.0, 1.0).acos() * EARTH_RADIUS_M
    };

    if along > segment_len {
        return to_end;
    }

    (dxt.abs() * EARTH_RADIUS_M).min(to_start).min(to_end)
}
