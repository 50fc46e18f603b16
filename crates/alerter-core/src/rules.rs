//! Correlation rules and thresholds for the alerter.

use serde::{Deserialize, Serialize};

use crate::proximity::DEFAULT_PROXIMITY_THRESHOLD_M;

/// Configuration for hazard keying and route correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationRules {
    /// Distance in meters within which a hazard alerts a route
    pub proximity_threshold_m: f64,
    /// Maximum number of active routes evaluated per hazard (newest first)
    pub route_page_size: usize,
    /// Geohash precision of the hazard secondary index key (`GSI1PK`)
    pub gsi_hash_precision: usize,
    /// Geohash precision of the finer per-record partition key
    pub partition_key_hash_precision: usize,
}

impl Default for CorrelationRules {
    fn default() -> Self {
        Self {
            proximity_threshold_m: DEFAULT_PROXIMITY_THRESHOLD_M,
            route_page_size: 50,
            gsi_hash_precision: 4,
            partition_key_hash_precision: 5,
        }
    }
}
