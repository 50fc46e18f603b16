//! In-memory store using DashMap.

use std::cmp::Reverse;
use std::sync::atomic::{AtomicU32, Ordering};

use alerter_core::{Hazard, Route};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::records::{HazardRecord, RouteRecord};
use super::{ExpiringStore, HazardStore, RouteStore};
use crate::change_tap::{ChangeTap, InsertedRecord};
use crate::error::StoreError;

/// Hazards and routes keyed by sort key.
pub struct MemoryStore {
    hazards: DashMap<String, HazardRecord>,
    routes: DashMap<String, RouteRecord>,
    tap: ChangeTap,
    partition_precision: usize,
    route_query_failures: AtomicU32,
    hazard_put_failures: AtomicU32,
}

impl MemoryStore {
    pub fn new(tap: ChangeTap, partition_precision: usize) -> Self {
        Self {
            hazards: DashMap::new(),
            routes: DashMap::new(),
            tap,
            partition_precision,
            route_query_failures: AtomicU32::new(0),
            hazard_put_failures: AtomicU32::new(0),
        }
    }

    /// Make the next `count` route listings fail as unavailable.
    #[cfg(any(test, feature = "test-util"))]
    pub fn inject_route_query_failures(&self, count: u32) {
        self.route_query_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` hazard puts fail as unavailable.
    #[cfg(any(test, feature = "test-util"))]
    pub fn inject_hazard_put_failures(&self, count: u32) {
        self.hazard_put_failures.store(count, Ordering::SeqCst);
    }

    pub fn hazard_count(&self) -> usize {
        self.hazards.len()
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl RouteStore for MemoryStore {
    async fn put_route(&self, route: &Route) -> Result<(), StoreError> {
        let record = RouteRecord::from_route(route);
        self.routes.insert(record.sk.clone(), record);
        self.tap.append(InsertedRecord::Route(route.clone()));
        Ok(())
    }

    async fn list_active_routes(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Route>, StoreError> {
        if take_failure(&self.route_query_failures) {
            return Err(StoreError::Unavailable("injected route query failure".into()));
        }

        let mut records: Vec<RouteRecord> = self
            .routes
            .iter()
            .filter(|entry| entry.value().is_live(now))
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|record| Reverse((record.timestamp, record.sk.clone())));

        records
            .into_iter()
            .take(limit)
            .map(RouteRecord::into_route)
            .collect()
    }
}

#[async_trait]
impl HazardStore for MemoryStore {
    async fn put_hazard(&self, hazard: &Hazard) -> Result<(), StoreError> {
        if take_failure(&self.hazard_put_failures) {
            return Err(StoreError::Unavailable("injected hazard put failure".into()));
        }

        let record = HazardRecord::from_hazard(hazard, self.partition_precision)?;
        self.hazards.insert(record.sk.clone(), record);
        self.tap.append(InsertedRecord::Hazard(hazard.clone()));
        Ok(())
    }

    async fn list_active_hazards(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Hazard>, StoreError> {
        newest_hazards(
            self.hazards
                .iter()
                .filter(|entry| entry.value().is_live(now))
                .map(|entry| entry.value().clone())
                .collect(),
            limit,
        )
    }

    async fn query_hazards_by_cell(
        &self,
        spatial_key: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Hazard>, StoreError> {
        newest_hazards(
            self.hazards
                .iter()
                .filter(|entry| entry.value().gsi1pk == spatial_key && entry.value().is_live(now))
                .map(|entry| entry.value().clone())
                .collect(),
            limit,
        )
    }
}

fn newest_hazards(mut records: Vec<HazardRecord>, limit: usize) -> Result<Vec<Hazard>, StoreError> {
    records.sort_by_key(|record| Reverse((record.timestamp, record.sk.clone())));
    records
        .into_iter()
        .take(limit)
        .map(HazardRecord::into_hazard)
        .collect()
}

#[async_trait]
impl ExpiringStore for MemoryStore {
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.hazards.len() + self.routes.len();
        self.hazards.retain(|_, record| record.is_live(now));
        self.routes.retain(|_, record| record.is_live(now));
        let after = self.hazards.len() + self.routes.len();
        Ok(before.saturating_sub(after) as u64)
    }
}
