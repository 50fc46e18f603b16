//! SQLite-backed store.

use std::path::Path;

use alerter_core::{Hazard, Route};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use tracing::{info, warn};

use super::records::{HazardRecord, RouteRecord, HAZARD_PARTITION, ROUTE_PARTITION};
use super::{ExpiringStore, HazardStore, RouteStore};
use crate::change_tap::{ChangeTap, InsertedRecord};
use crate::error::StoreError;

/// Initialize the SQLite database.
///
/// Creates the database file if it doesn't exist, runs migrations,
/// and returns a connection pool.
pub async fn init_database(db_path: &str, max_connections: u32) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path);
    info!("Connecting to database: {}", db_path);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect(&db_url)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// Open a private in-memory database on a single connection.
pub async fn init_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let migration_sql = include_str!("../../migrations/001_init.sql");

    info!("Running database migrations...");

    for statement in migration_sql.split(';') {
        let statement: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }

        if let Err(e) = sqlx::query(statement).execute(pool).await {
            if e.to_string().contains("already exists") {
                continue;
            }
            if statement.to_uppercase().starts_with("CREATE") {
                anyhow::bail!("Migration failed on CREATE statement: {}", e);
            }
            warn!("Migration statement failed: {}", e);
        }
    }

    info!("Database migrations complete");
    Ok(())
}

pub struct SqliteStore {
    pool: SqlitePool,
    tap: ChangeTap,
    partition_precision: usize,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, tap: ChangeTap, partition_precision: usize) -> Self {
        Self {
            pool,
            tap,
            partition_precision,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn put_item(
        &self,
        pk: &str,
        sk: &str,
        gsi: Option<(&str, &str)>,
        ttl: i64,
        created_at: i64,
        body: String,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO items (pk, sk, gsi1pk, gsi1sk, ttl, created_at, body)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(pk)
        .bind(sk)
        .bind(gsi.map(|(gsi1pk, _)| gsi1pk))
        .bind(gsi.map(|(_, gsi1sk)| gsi1sk))
        .bind(ttl)
        .bind(created_at)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn hazard_rows(
        &self,
        spatial_key: Option<&str>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Hazard>, StoreError> {
        let rows = match spatial_key {
            Some(key) => {
                sqlx::query(
                    "SELECT sk, body FROM items
                     WHERE gsi1pk = ? AND pk = ? AND ttl > ?
                     ORDER BY created_at DESC, sk DESC LIMIT ?",
                )
                .bind(key)
                .bind(HAZARD_PARTITION)
                .bind(now.timestamp())
                .bind(sql_limit(limit))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT sk, body FROM items
                     WHERE pk = ? AND ttl > ?
                     ORDER BY created_at DESC, sk DESC LIMIT ?",
                )
                .bind(HAZARD_PARTITION)
                .bind(now.timestamp())
                .bind(sql_limit(limit))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter()
            .map(|row| decode_body::<HazardRecord>(row)?.into_hazard())
            .collect()
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn decode_body<T: serde::de::DeserializeOwned>(row: &sqlx::sqlite::SqliteRow) -> Result<T, StoreError> {
    let sk: String = row.try_get("sk")?;
    let body: String = row.try_get("body")?;
    serde_json::from_str(&body).map_err(|err| StoreError::CorruptRecord {
        key: sk,
        reason: err.to_string(),
    })
}

#[async_trait]
impl RouteStore for SqliteStore {
    async fn put_route(&self, route: &Route) -> Result<(), StoreError> {
        let record = RouteRecord::from_route(route);
        let body = serde_json::to_string(&record)?;
        self.put_item(&record.pk, &record.sk, None, record.ttl, record.timestamp, body)
            .await?;
        self.tap.append(InsertedRecord::Route(route.clone()));
        Ok(())
    }

    async fn list_active_routes(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Route>, StoreError> {
        let rows = sqlx::query(
            "SELECT sk, body FROM items
             WHERE pk = ? AND ttl > ?
             ORDER BY created_at DESC, sk DESC LIMIT ?",
        )
        .bind(ROUTE_PARTITION)
        .bind(now.timestamp())
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| decode_body::<RouteRecord>(row)?.into_route())
            .collect()
    }
}

#[async_trait]
impl HazardStore for SqliteStore {
    async fn put_hazard(&self, hazard: &Hazard) -> Result<(), StoreError> {
        let record = HazardRecord::from_hazard(hazard, self.partition_precision)?;
        let body = serde_json::to_string(&record)?;
        self.put_item(
            &record.pk,
            &record.sk,
            Some((&record.gsi1pk, &record.gsi1sk)),
            record.ttl,
            record.timestamp,
            body,
        )
        .await?;
        self.tap.append(InsertedRecord::Hazard(hazard.clone()));
        Ok(())
    }

    async fn list_active_hazards(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Hazard>, StoreError> {
        self.hazard_rows(None, now, limit).await
    }

    async fn query_hazards_by_cell(
        &self,
        spatial_key: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Hazard>, StoreError> {
        self.hazard_rows(Some(spatial_key), now, limit).await
    }
}

#[async_trait]
impl ExpiringStore for SqliteStore {
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM items WHERE ttl <= ?")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerter_core::{HazardKind, Point};
    use chrono::Duration;

    async fn store() -> (SqliteStore, ChangeTap) {
        let pool = init_in_memory().await.expect("init db");
        let tap = ChangeTap::default();
        (SqliteStore::new(pool, tap.clone(), 5), tap)
    }

    fn route_at(now: DateTime<Utc>) -> Route {
        Route::new(vec![Point::new(51.5, -0.1), Point::new(51.6, 0.0)], now).unwrap()
    }

    #[tokio::test]
    async fn stores_and_lists_routes() {
        let (store, tap) = store().await;
        let now = Utc::now();
        let older = route_at(now - Duration::hours(1));
        let newer = route_at(now);
        store.put_route(&older).await.unwrap();
        store.put_route(&newer).await.unwrap();
        store.put_route(&route_at(now - Duration::days(8))).await.unwrap();

        let listed = store.list_active_routes(now, 10).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![newer.id.as_str(), older.id.as_str()]);
        assert_eq!(listed[0].points, newer.points);
        assert_eq!(tap.pending_len(), 3);
    }

    #[tokio::test]
    async fn hazards_are_indexed_by_cell() {
        let (store, _tap) = store().await;
        let now = Utc::now();
        let hazard = Hazard::new(HazardKind::AirspaceAlert, Point::new(51.55, -0.05), 4, now).unwrap();
        let far = Hazard::new(HazardKind::AirspaceAlert, Point::new(57.0, -4.0), 4, now).unwrap();
        store.put_hazard(&hazard).await.unwrap();
        store.put_hazard(&far).await.unwrap();

        let found = store
            .query_hazards_by_cell(&hazard.spatial_key, now, 10)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, hazard.id);
        assert_eq!(found[0].kind, HazardKind::AirspaceAlert);

        let later = now + Duration::hours(2);
        assert!(store.list_active_hazards(later, 10).await.unwrap().is_empty());
        assert_eq!(store.purge_expired(later).await.unwrap(), 2);
    }
}
