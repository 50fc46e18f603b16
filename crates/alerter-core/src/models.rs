//! Core data models for the airspace alerter.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::CoreError;
use crate::geokey;
use crate::spatial::route_distance_m;

/// Hazards expire one hour after creation.
pub const HAZARD_TTL_SECS: i64 = 60 * 60;
/// Routes expire seven days after submission.
pub const ROUTE_TTL_SECS: i64 = 60 * 60 * 24 * 7;

/// A geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Reject non-finite or out-of-range coordinates.
    pub fn validate(&self) -> Result<(), CoreError> {
        let lat_ok = self.lat.is_finite() && (-90.0..=90.0).contains(&self.lat);
        let lon_ok = self.lon.is_finite() && (-180.0..=180.0).contains(&self.lon);
        if lat_ok && lon_ok {
            Ok(())
        } else {
            Err(CoreError::InvalidCoordinate {
                lat: self.lat,
                lon: self.lon,
            })
        }
    }
}

/// Rectangular region in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    /// Approximate bounds of the United Kingdom.
    pub const UK: BoundingBox = BoundingBox {
        lat_min: 49.9,
        lat_max: 58.7,
        lon_min: -8.2,
        lon_max: 1.8,
    };

    pub fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Result<Self, CoreError> {
        Point::new(lat_min, lon_min).validate()?;
        Point::new(lat_max, lon_max).validate()?;
        if lat_min > lat_max || lon_min > lon_max {
            return Err(CoreError::InvalidCoordinate {
                lat: lat_min,
                lon: lon_min,
            });
        }
        Ok(Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        })
    }

    pub fn contains(&self, point: &Point) -> bool {
        (self.lat_min..=self.lat_max).contains(&point.lat)
            && (self.lon_min..=self.lon_max).contains(&point.lon)
    }
}

/// A submitted flight route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    /// Ordered route vertices (at least two).
    pub points: Vec<Point>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Route {
    /// Build a new route with a fresh time-ordered id.
    ///
    /// Fails with [`CoreError::MalformedRoute`] for fewer than two points, or
    /// [`CoreError::InvalidCoordinate`] if any vertex is out of range.
    pub fn new(points: Vec<Point>, now: DateTime<Utc>) -> Result<Self, CoreError> {
        validate_route_points(&points)?;
        Ok(Self {
            id: Uuid::now_v7().to_string(),
            points,
            created_at: now,
            expires_at: now + Duration::seconds(ROUTE_TTL_SECS),
        })
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Great-circle length of the route in meters.
    pub fn distance_m(&self) -> f64 {
        route_distance_m(&self.points)
    }
}

/// Check that a point sequence forms a usable route.
pub fn validate_route_points(points: &[Point]) -> Result<(), CoreError> {
    if points.len() < 2 {
        return Err(CoreError::MalformedRoute {
            points: points.len(),
        });
    }
    points.iter().try_for_each(Point::validate)
}

/// Kind of simulated airspace hazard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HazardKind {
    #[serde(rename = "Airspace Alert", alias = "AirspaceAlert")]
    AirspaceAlert,
    #[serde(rename = "Thunderstorm")]
    Thunderstorm,
    #[serde(rename = "Bird Activity", alias = "BirdActivity")]
    BirdActivity,
    #[serde(rename = "Drone Activity", alias = "DroneActivity")]
    DroneActivity,
}

impl HazardKind {
    /// The fixed enumeration the simulator samples from.
    pub const ALL: [HazardKind; 4] = [
        HazardKind::AirspaceAlert,
        HazardKind::Thunderstorm,
        HazardKind::BirdActivity,
        HazardKind::DroneActivity,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            HazardKind::AirspaceAlert => "Airspace Alert",
            HazardKind::Thunderstorm => "Thunderstorm",
            HazardKind::BirdActivity => "Bird Activity",
            HazardKind::DroneActivity => "Drone Activity",
        }
    }

    /// Parse either the display label or the variant name.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| {
            kind.label() == value || kind.label().replace(' ', "") == value
        })
    }
}

impl fmt::Display for HazardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A point hazard with a coarse spatial key and a one-hour lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hazard {
    pub id: String,
    pub kind: HazardKind,
    pub location: Point,
    /// Geohash of `location` at the configured index precision.
    pub spatial_key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Hazard {
    pub fn new(
        kind: HazardKind,
        location: Point,
        key_precision: usize,
        now: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        let spatial_key = geokey::encode(location.lat, location.lon, key_precision)?;
        Ok(Self {
            id: Uuid::now_v7().to_string(),
            kind,
            location,
            spatial_key,
            created_at: now,
            expires_at: now + Duration::seconds(HAZARD_TTL_SECS),
        })
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Normalized event emitted by the correlation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "EventEnvelope", from = "EventEnvelope")]
pub enum CorrelationEvent {
    Hazard {
        hazard_id: String,
        kind: HazardKind,
        location: Point,
    },
    Alert {
        hazard_id: String,
        route_id: String,
        kind: HazardKind,
        location: Point,
    },
}

impl CorrelationEvent {
    pub fn hazard(hazard: &Hazard) -> Self {
        CorrelationEvent::Hazard {
            hazard_id: hazard.id.clone(),
            kind: hazard.kind,
            location: hazard.location,
        }
    }

    pub fn alert(hazard: &Hazard, route: &Route) -> Self {
        CorrelationEvent::Alert {
            hazard_id: hazard.id.clone(),
            route_id: route.id.clone(),
            kind: hazard.kind,
            location: hazard.location,
        }
    }

    pub fn hazard_id(&self) -> &str {
        match self {
            CorrelationEvent::Hazard { hazard_id, .. }
            | CorrelationEvent::Alert { hazard_id, .. } => hazard_id,
        }
    }

    pub fn route_id(&self) -> Option<&str> {
        match self {
            CorrelationEvent::Hazard { .. } => None,
            CorrelationEvent::Alert { route_id, .. } => Some(route_id),
        }
    }

    /// Identity used for redelivery dedupe: `(hazard_id, None)` for the hazard
    /// itself, `(hazard_id, Some(route_id))` for an alert.
    pub fn dedupe_key(&self) -> (String, Option<String>) {
        (
            self.hazard_id().to_string(),
            self.route_id().map(str::to_string),
        )
    }

    pub fn is_alert(&self) -> bool {
        matches!(self, CorrelationEvent::Alert { .. })
    }
}

/// Wire shape of [`CorrelationEvent`]: `{"type": "...", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventEnvelope {
    Hazard(HazardPayload),
    Alert(AlertPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HazardPayload {
    pub hazard_id: String,
    #[serde(rename = "type")]
    pub kind: HazardKind,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    pub hazard_id: String,
    pub route_id: String,
    #[serde(rename = "type")]
    pub kind: HazardKind,
    pub lat: f64,
    pub lon: f64,
}

impl From<CorrelationEvent> for EventEnvelope {
    fn from(event: CorrelationEvent) -> Self {
        match event {
            CorrelationEvent::Hazard {
                hazard_id,
                kind,
                location,
            } => EventEnvelope::Hazard(HazardPayload {
                hazard_id,
                kind,
                lat: location.lat,
                lon: location.lon,
            }),
            CorrelationEvent::Alert {
                hazard_id,
                route_id,
                kind,
                location,
            } => EventEnvelope::Alert(AlertPayload {
                hazard_id,
                route_id,
                kind,
                lat: location.lat,
                lon: location.lon,
            }),
        }
    }
}

impl From<EventEnvelope> for CorrelationEvent {
    fn from(envelope: EventEnvelope) -> Self {
        match envelope {
            EventEnvelope::Hazard(p) => CorrelationEvent::Hazard {
                hazard_id: p.hazard_id,
                kind: p.kind,
                location: Point::new(p.lat, p.lon),
            },
            EventEnvelope::Alert(p) => CorrelationEvent::Alert {
                hazard_id: p.hazard_id,
                route_id: p.route_id,
                kind: p.kind,
                location: Point::new(p.lat, p.lon),
            },
        }
    }
}

// ========== API MODELS ==========

/// Response to a route submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRouteResponse {
    pub route_id: String,
    /// Sum of great-circle distances between consecutive points, in meters.
    pub route_distance: f64,
}

/// Response to a hazard simulation trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResponse {
    pub message: String,
    pub hazard_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn route_requires_two_points() {
        let now = Utc::now();
        let err = Route::new(vec![Point::new(51.5, -0.1)], now).unwrap_err();
        assert_eq!(err, CoreError::MalformedRoute { points: 1 });
        assert!(Route::new(Vec::new(), now).is_err());
    }

    #[test]
    fn route_rejects_out_of_range_points() {
        let now = Utc::now();
        let err = Route::new(vec![Point::new(91.0, 0.0), Point::new(0.0, 0.0)], now);
        assert!(matches!(err, Err(CoreError::InvalidCoordinate { .. })));
    }

    #[test]
    fn route_expires_after_seven_days() {
        let now = Utc::now();
        let route = Route::new(vec![Point::new(51.5, -0.1), Point::new(51.6, 0.0)], now).unwrap();
        assert!(route.is_active(now + Duration::days(6)));
        assert!(!route.is_active(now + Duration::days(7)));
    }

    #[test]
    fn hazard_carries_spatial_key_and_one_hour_expiry() {
        let now = Utc::now();
        let hazard = Hazard::new(HazardKind::Thunderstorm, Point::new(51.55, -0.05), 4, now).unwrap();
        assert_eq!(hazard.spatial_key.len(), 4);
        assert_eq!(hazard.expires_at - hazard.created_at, Duration::hours(1));
    }

    #[test]
    fn hazard_kind_parses_labels_and_variant_names() {
        assert_eq!(HazardKind::parse("Bird Activity"), Some(HazardKind::BirdActivity));
        assert_eq!(HazardKind::parse("DroneActivity"), Some(HazardKind::DroneActivity));
        assert_eq!(HazardKind::parse("Volcano"), None);
    }

    #[test]
    fn alert_event_serializes_to_wire_shape() {
        let event = CorrelationEvent::Alert {
            hazard_id: "h1".into(),
            route_id: "r1".into(),
            kind: HazardKind::AirspaceAlert,
            location: Point::new(51.55, -0.05),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "Alert",
                "data": {
                    "hazardId": "h1",
                    "routeId": "r1",
                    "type": "Airspace Alert",
                    "lat": 51.55,
                    "lon": -0.05
                }
            })
        );
    }

    #[test]
    fn hazard_event_parses_from_wire_shape() {
        let raw = json!({
            "type": "Hazard",
            "data": {"hazardId": "h2", "type": "Thunderstorm", "lat": 52.0, "lon": 1.0}
        });
        let event: CorrelationEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.dedupe_key(), ("h2".to_string(), None));
        assert!(!event.is_alert());
    }
}
