//! Point-to-route proximity matching.

use crate::models::Point;
use crate::spatial::distance_to_segment_m;

/// Default distance within which a hazard alerts a route (50 km).
pub const DEFAULT_PROXIMITY_THRESHOLD_M: f64 = 50_000.0;

/// Absorbs floating-point noise so a point lying on a segment matches a zero threshold.
const DISTANCE_TOLERANCE_M: f64 = 1e-3;

/// Returns true if `target` lies within `threshold_m` of any segment of the route.
///
/// Segments are checked in order and the scan stops at the first match; the
/// closest segment is not searched for. Routes with fewer than two points
/// have no segments and never match, so callers must validate routes first.
pub fn is_point_near_route(route_points: &[Point], target: &Point, threshold_m: f64) -> bool {
    route_points.windows(2).any(|segment| {
        distance_to_segment_m(target, &segment[0], &segment[1]) <= threshold_m + DISTANCE_TOLERANCE_M
    })
}

/// Minimum distance from `target` to the route, or `None` for routes without segments.
pub fn distance_to_route_m(route_points: &[Point], target: &Point) -> Option<f64> {
    route_points
        .windows(2)
        .map(|segment| distance_to_segment_m(target, &segment[0], &segment[1]))
        .min_by(f64::total_cmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{bearing, distance_m, intermediate_point, offset_by_bearing};
    use std::f64::consts::FRAC_PI_2;

    fn london_route() -> Vec<Point> {
        vec![Point::new(51.5, -0.1), Point::new(51.6, 0.0)]
    }

    #[test]
    fn midpoint_matches_any_non_negative_threshold() {
        let route = london_route();
        let mid = intermediate_point(&route[0], &route[1], 0.5);
        for threshold in [0.0, 1.0, 1_000.0, DEFAULT_PROXIMITY_THRESHOLD_M] {
            assert!(is_point_near_route(&route, &mid, threshold), "threshold {threshold}");
        }
    }

    #[test]
    fn hazard_near_midpoint_matches_default_threshold() {
        let route = london_route();
        assert!(is_point_near_route(
            &route,
            &Point::new(51.55, -0.05),
            DEFAULT_PROXIMITY_THRESHOLD_M
        ));
    }

    #[test]
    fn distant_hazard_does_not_match() {
        let route = london_route();
        // Edinburgh is ~530km away from every vertex and segment.
        let edinburgh = Point::new(55.9533, -3.1883);
        assert!(!is_point_near_route(&route, &edinburgh, DEFAULT_PROXIMITY_THRESHOLD_M));
    }

    #[test]
    fn perpendicular_offset_respects_threshold() {
        let start = Point::new(52.0, -2.0);
        let end = Point::new(52.0, 0.0);
        let route = vec![start, end];
        let mid = intermediate_point(&start, &end, 0.5);
        let left = bearing(&mid, &end) - FRAC_PI_2;

        let inside = offset_by_bearing(&mid, 49_000.0, left);
        let outside = offset_by_bearing(&mid, 51_000.0, left);

        assert!(is_point_near_route(&route, &inside, 50_000.0));
        assert!(!is_point_near_route(&route, &outside, 50_000.0));
    }

    #[test]
    fn matches_on_later_segment() {
        let route = vec![
            Point::new(50.0, -5.0),
            Point::new(50.0, -4.0),
            Point::new(53.0, -4.0),
        ];
        let near_second_leg = Point::new(52.0, -3.9);
        assert!(is_point_near_route(&route, &near_second_leg, 10_000.0));
        assert!(!is_point_near_route(&route[..2], &near_second_leg, 10_000.0));
    }

    #[test]
    fn point_beyond_segment_end_measures_to_vertex() {
        let route = vec![Point::new(52.0, -2.0), Point::new(52.0, -1.0)];
        let beyond = Point::new(52.0, -0.5);
        let to_end = distance_m(&beyond, &route[1]);
        assert!(is_point_near_route(&route, &beyond, to_end + 1.0));
        assert!(!is_point_near_route(&route, &beyond, to_end - 100.0));
    }

    #[test]
    fn routes_without_segments_never_match() {
        let single = vec![Point::new(51.5, -0.1)];
        assert!(!is_point_near_route(&single, &Point::new(51.5, -0.1), 1_000.0));
        assert_eq!(distance_to_route_m(&single, &Point::new(51.5, -0.1)), None);
    }

    #[test]
    fn distance_to_route_picks_closest_segment() {
        let route = vec![
            Point::new(50.0, -5.0),
            Point::new(50.0, -4.0),
            Point::new(53.0, -4.0),
        ];
        let vertex = Point::new(50.0, -4.0);
        let dist = distance_to_route_m(&route, &vertex).unwrap();
        assert!(dist < 1.0);
    }
}
