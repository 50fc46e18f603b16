//! Narrow storage contract for routes and hazards.
//!
//! Two implementations share the same record layout: [`MemoryStore`]
//! (DashMap) and [`SqliteStore`] (sqlx). Every successful put appends the
//! inserted record to the store's [`ChangeTap`](crate::change_tap::ChangeTap).
//! Reads never return expired records.

mod memory;
pub mod records;
mod sqlite;

use alerter_core::{Hazard, Route};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

pub use memory::MemoryStore;
pub use sqlite::{init_database, init_in_memory, SqliteStore};

#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn put_route(&self, route: &Route) -> Result<(), StoreError>;

    /// Active routes, newest first, at most `limit`.
    async fn list_active_routes(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Route>, StoreError>;
}

#[async_trait]
pub trait HazardStore: Send + Sync {
    async fn put_hazard(&self, hazard: &Hazard) -> Result<(), StoreError>;

    /// Active hazards, newest first, at most `limit`.
    async fn list_active_hazards(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Hazard>, StoreError>;

    /// Active hazards whose secondary index key equals `spatial_key`.
    async fn query_hazards_by_cell(
        &self,
        spatial_key: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Hazard>, StoreError>;
}

#[async_trait]
pub trait ExpiringStore: Send + Sync {
    /// Delete records whose ttl has passed. Returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
