//! Server configuration from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use alerter_core::{BoundingBox, CorrelationRules, DEFAULT_PROXIMITY_THRESHOLD_M};

use crate::backoff::RetryPolicy;

/// Which backing store implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub store_backend: StoreBackend,
    pub database_path: String,
    pub database_max_connections: u32,
    /// Geohash precision of the finer per-record key
    pub partition_key_hash_precision: usize,
    /// Geohash precision of the hazard secondary index key
    pub gsi_hash_precision: usize,
    pub proximity_threshold_m: f64,
    /// Maximum active routes evaluated per hazard
    pub route_page_size: usize,
    pub simulation_window: Duration,
    pub simulation_delay_min: Duration,
    pub simulation_delay_max: Duration,
    pub simulation_bounds: BoundingBox,
    pub alerts_channel: String,
    pub correlation_concurrency: usize,
    pub change_tap_max_deliveries: u32,
    pub store_retry: RetryPolicy,
    pub broadcast_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            store_backend: StoreBackend::Memory,
            database_path: "data/alerter.db".to_string(),
            database_max_connections: 5,
            partition_key_hash_precision: 5,
            gsi_hash_precision: 4,
            proximity_threshold_m: DEFAULT_PROXIMITY_THRESHOLD_M,
            route_page_size: 50,
            simulation_window: Duration::from_secs(60),
            simulation_delay_min: Duration::from_secs(2),
            simulation_delay_max: Duration::from_secs(7),
            simulation_bounds: BoundingBox::UK,
            alerts_channel: "alerts".to_string(),
            correlation_concurrency: 8,
            change_tap_max_deliveries: 5,
            store_retry: RetryPolicy::default(),
            broadcast_capacity: 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let store_backend = match env::var("ALERTER_STORE").ok().as_deref() {
            Some("sqlite") => StoreBackend::Sqlite,
            Some("memory") | None => StoreBackend::Memory,
            Some(other) => {
                tracing::warn!("Unknown ALERTER_STORE '{}', using in-memory store", other);
                StoreBackend::Memory
            }
        };
        let simulation_bounds = env::var("SIMULATION_BOUNDS")
            .ok()
            .and_then(|raw| match parse_bounds(&raw) {
                Some(bounds) => Some(bounds),
                None => {
                    tracing::warn!("Ignoring invalid SIMULATION_BOUNDS '{}'", raw);
                    None
                }
            })
            .unwrap_or(defaults.simulation_bounds);

        Self {
            server_port: env_parse("ALERTER_PORT", defaults.server_port),
            store_backend,
            database_path: env::var("ALERTER_DATABASE_PATH").unwrap_or(defaults.database_path),
            database_max_connections: env_parse(
                "ALERTER_DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            partition_key_hash_precision: env_parse(
                "PARTITION_KEY_HASH_PRECISION",
                defaults.partition_key_hash_precision,
            ),
            gsi_hash_precision: env_parse("GSI_HASH_PRECISION", defaults.gsi_hash_precision),
            proximity_threshold_m: env_parse("PROXIMITY_THRESHOLD_M", defaults.proximity_threshold_m),
            route_page_size: env_parse("ROUTE_PAGE_SIZE", defaults.route_page_size),
            simulation_window: Duration::from_secs(env_parse("SIMULATION_WINDOW_SECS", 60)),
            simulation_delay_min: env_secs("SIMULATION_DELAY_MIN_SECS", defaults.simulation_delay_min),
            simulation_delay_max: env_secs("SIMULATION_DELAY_MAX_SECS", defaults.simulation_delay_max),
            simulation_bounds,
            alerts_channel: env::var("ALERTS_CHANNEL").unwrap_or(defaults.alerts_channel),
            correlation_concurrency: env_parse(
                "CORRELATION_CONCURRENCY",
                defaults.correlation_concurrency,
            ),
            change_tap_max_deliveries: env_parse(
                "CHANGE_TAP_MAX_DELIVERIES",
                defaults.change_tap_max_deliveries,
            ),
            store_retry: RetryPolicy {
                attempts: env_parse("STORE_RETRY_ATTEMPTS", defaults.store_retry.attempts),
                base: Duration::from_millis(env_parse("STORE_RETRY_BASE_MS", 100)),
                max: Duration::from_millis(env_parse("STORE_RETRY_MAX_MS", 2000)),
            },
            broadcast_capacity: env_parse("BROADCAST_CAPACITY", defaults.broadcast_capacity),
        }
    }

    pub fn correlation_rules(&self) -> CorrelationRules {
        CorrelationRules {
            proximity_threshold_m: self.proximity_threshold_m,
            route_page_size: self.route_page_size,
            gsi_hash_precision: self.gsi_hash_precision,
            partition_key_hash_precision: self.partition_key_hash_precision,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}='{}'", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    let secs: f64 = env_parse(key, default.as_secs_f64());
    Duration::try_from_secs_f64(secs).unwrap_or_else(|_| {
        tracing::warn!("Ignoring out-of-range {}={}", key, secs);
        default
    })
}

/// Parse `latMin,latMax,lonMin,lonMax`.
pub fn parse_bounds(raw: &str) -> Option<BoundingBox> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|part| part.trim().parse().ok())
        .collect::<Option<_>>()?;
    match parts.as_slice() {
        [lat_min, lat_max, lon_min, lon_max] => {
            BoundingBox::new(*lat_min, *lat_max, *lon_min, *lon_max).ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.gsi_hash_precision, 4);
        assert_eq!(config.partition_key_hash_precision, 5);
        assert_eq!(config.proximity_threshold_m, 50_000.0);
        assert_eq!(config.simulation_window, Duration::from_secs(60));
        assert_eq!(config.alerts_channel, "alerts");
        assert_eq!(config.simulation_bounds, BoundingBox::UK);
    }

    #[test]
    fn parses_bounding_box() {
        let bounds = parse_bounds("50.0, 55.0, -5.0, 0.5").unwrap();
        assert_eq!(bounds.lat_min, 50.0);
        assert_eq!(bounds.lon_max, 0.5);

        assert!(parse_bounds("50,55,-5").is_none());
        assert!(parse_bounds("55,50,-5,0").is_none());
        assert!(parse_bounds("a,b,c,d").is_none());
    }
}
