//! Persisted item shapes for hazards and routes.
//!
//! Both stores keep items in a single-table layout: a partition key (`PK`),
//! a sort key (`SK`), and for hazards a secondary index keyed by a coarse
//! geohash (`GSI1PK`/`GSI1SK`). `ttl` is epoch seconds, `timestamp` epoch
//! milliseconds.

use alerter_core::{geokey, Hazard, HazardKind, Point, Route, HAZARD_TTL_SECS, ROUTE_TTL_SECS};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const HAZARD_PARTITION: &str = "HAZARD";
pub const ROUTE_PARTITION: &str = "ROUTE";

pub fn hazard_sort_key(id: &str) -> String {
    format!("HAZARD#{}", id)
}

pub fn route_sort_key(id: &str) -> String {
    format!("ROUTE#{}", id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardRecord {
    #[serde(rename = "PK")]
    pub pk: String,
    #[serde(rename = "SK")]
    pub sk: String,
    #[serde(rename = "GSI1PK")]
    pub gsi1pk: String,
    #[serde(rename = "GSI1SK")]
    pub gsi1sk: String,
    #[serde(rename = "type")]
    pub kind: HazardKind,
    pub lat: f64,
    pub lon: f64,
    /// Geohash at the finer partition precision.
    pub geohash: String,
    pub timestamp: i64,
    pub ttl: i64,
}

impl HazardRecord {
    pub fn from_hazard(hazard: &Hazard, partition_precision: usize) -> Result<Self, StoreError> {
        let geohash = geokey::encode(hazard.location.lat, hazard.location.lon, partition_precision)
            .map_err(|err| StoreError::CorruptRecord {
                key: hazard_sort_key(&hazard.id),
                reason: err.to_string(),
            })?;
        Ok(Self {
            pk: HAZARD_PARTITION.to_string(),
            sk: hazard_sort_key(&hazard.id),
            gsi1pk: hazard.spatial_key.clone(),
            gsi1sk: hazard_sort_key(&hazard.id),
            kind: hazard.kind,
            lat: hazard.location.lat,
            lon: hazard.location.lon,
            geohash,
            timestamp: hazard.created_at.timestamp_millis(),
            ttl: hazard.created_at.timestamp() + HAZARD_TTL_SECS,
        })
    }

    pub fn into_hazard(self) -> Result<Hazard, StoreError> {
        let id = strip_sort_key(&self.sk, "HAZARD#")?;
        let created_at = millis_to_datetime(&self.sk, self.timestamp)?;
        Ok(Hazard {
            id,
            kind: self.kind,
            location: Point::new(self.lat, self.lon),
            spatial_key: self.gsi1pk,
            created_at,
            expires_at: created_at + Duration::seconds(HAZARD_TTL_SECS),
        })
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.ttl > now.timestamp()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRecord {
    #[serde(rename = "PK")]
    pub pk: String,
    #[serde(rename = "SK")]
    pub sk: String,
    #[serde(rename = "routePoints")]
    pub route_points: Vec<Point>,
    pub timestamp: i64,
    pub ttl: i64,
}

impl RouteRecord {
    pub fn from_route(route: &Route) -> Self {
        Self {
            pk: ROUTE_PARTITION.to_string(),
            sk: route_sort_key(&route.id),
            route_points: route.points.clone(),
            timestamp: route.created_at.timestamp_millis(),
            ttl: route.created_at.timestamp() + ROUTE_TTL_SECS,
        }
    }

    pub fn into_route(self) -> Result<Route, StoreError> {
        let id = strip_sort_key(&self.sk, "ROUTE#")?;
        let created_at = millis_to_datetime(&self.sk, self.timestamp)?;
        Ok(Route {
            id,
            points: self.route_points,
            created_at,
            expires_at: created_at + Duration::seconds(ROUTE_TTL_SECS),
        })
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.ttl > now.timestamp()
    }
}

fn strip_sort_key(sk: &str, prefix: &str) -> Result<String, StoreError> {
    sk.strip_prefix(prefix)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StoreError::CorruptRecord {
            key: sk.to_string(),
            reason: format!("sort key does not start with {}", prefix),
        })
}

fn millis_to_datetime(key: &str, millis: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StoreError::CorruptRecord {
            key: key.to_string(),
            reason: format!("invalid timestamp {}", millis),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerter_core::HazardKind;

    #[test]
    fn hazard_record_has_expected_keys() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let hazard = Hazard::new(HazardKind::BirdActivity, Point::new(51.55, -0.05), 4, now).unwrap();

        let record = HazardRecord::from_hazard(&hazard, 5).unwrap();
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["PK"], "HAZARD");
        assert_eq!(json["SK"], format!("HAZARD#{}", hazard.id));
        assert_eq!(json["GSI1SK"], json["SK"]);
        assert_eq!(json["GSI1PK"].as_str().unwrap().len(), 4);
        assert_eq!(json["geohash"].as_str().unwrap().len(), 5);
        assert!(json["geohash"]
            .as_str()
            .unwrap()
            .starts_with(json["GSI1PK"].as_str().unwrap()));
        assert_eq!(json["type"], "Bird Activity");
        assert_eq!(json["timestamp"], now.timestamp_millis());
        assert_eq!(json["ttl"], now.timestamp() + 3600);

        let restored = record.into_hazard().unwrap();
        assert_eq!(restored, hazard);
    }

    #[test]
    fn route_record_expires_after_a_week() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let route = Route::new(vec![Point::new(51.5, -0.1), Point::new(51.6, 0.0)], now).unwrap();

        let record = RouteRecord::from_route(&route);
        assert_eq!(record.ttl, now.timestamp() + 604_800);
        assert!(record.is_live(now + Duration::days(6)));
        assert!(!record.is_live(now + Duration::days(7)));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["routePoints"][1]["lat"], 51.6);
    }

    #[test]
    fn rejects_foreign_sort_key() {
        let record = RouteRecord {
            pk: ROUTE_PARTITION.to_string(),
            sk: "HAZARD#abc".to_string(),
            route_points: vec![],
            timestamp: 0,
            ttl: 0,
        };
        assert!(matches!(
            record.into_route(),
            Err(StoreError::CorruptRecord { .. })
        ));
    }
}
