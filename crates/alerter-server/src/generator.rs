//! Synthetic hazard generation over a bounded time window.

use std::sync::Arc;
use std::time::Duration;

use alerter_core::{BoundingBox, Hazard, HazardKind, Point};
use rand::Rng;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};

use crate::backoff::{retry_transient, RetryPolicy};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::SimulationError;
use crate::store::HazardStore;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    pub window: Duration,
    pub delay_min: Duration,
    pub delay_max: Duration,
    pub bounds: BoundingBox,
    /// Geohash precision of each hazard's spatial key.
    pub key_precision: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SimulationConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            window: config.simulation_window,
            delay_min: config.simulation_delay_min,
            delay_max: config.simulation_delay_max,
            bounds: config.simulation_bounds,
            key_precision: config.gsi_hash_precision,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    /// Hazards actually persisted.
    pub hazard_count: usize,
    pub failed_count: usize,
}

pub struct HazardGenerator<R> {
    config: SimulationConfig,
    store: Arc<dyn HazardStore>,
    rng: R,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl<R: Rng + Send> HazardGenerator<R> {
    pub fn new(
        config: SimulationConfig,
        store: Arc<dyn HazardStore>,
        rng: R,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            config,
            store,
            rng,
            clock,
            retry,
        }
    }

    /// Uniformly random point inside the configured bounding box.
    pub fn random_location(&mut self) -> Point {
        let bounds = self.config.bounds;
        Point::new(
            self.rng.random_range(bounds.lat_min..=bounds.lat_max),
            self.rng.random_range(bounds.lon_min..=bounds.lon_max),
        )
    }

    pub fn random_kind(&mut self) -> HazardKind {
        HazardKind::ALL[self.rng.random_range(0..HazardKind::ALL.len())]
    }

    /// Uniform in `[delay_min, delay_max)`, or exactly `delay_min` when the
    /// range is empty.
    pub fn next_delay(&mut self) -> Duration {
        let min = self.config.delay_min;
        let max = self.config.delay_max;
        if min >= max {
            return min;
        }
        Duration::from_secs_f64(self.rng.random_range(min.as_secs_f64()..max.as_secs_f64()))
    }

    /// Build one random hazard and persist it.
    pub async fn create_hazard(&mut self) -> Result<Hazard, SimulationError> {
        let location = self.random_location();
        let kind = self.random_kind();
        let hazard = Hazard::new(kind, location, self.config.key_precision, self.clock.now())?;

        let store = &self.store;
        retry_transient(self.retry, "put_hazard", || store.put_hazard(&hazard)).await?;
        Ok(hazard)
    }

    /// Generate hazards until the window elapses or `shutdown` fires.
    ///
    /// Never sleeps past the window deadline.
    pub async fn run(mut self, mut shutdown: Option<broadcast::Receiver<()>>) -> SimulationReport {
        let deadline = Instant::now() + self.config.window;
        let mut report = SimulationReport::default();

        tracing::info!(
            "Simulating hazards for {:?} within {:?}",
            self.config.window,
            self.config.bounds
        );

        while Instant::now() < deadline {
            match self.create_hazard().await {
                Ok(hazard) => {
                    report.hazard_count += 1;
                    tracing::debug!(
                        "Created {} hazard {} at ({:.4}, {:.4}) key {}",
                        hazard.kind,
                        hazard.id,
                        hazard.location.lat,
                        hazard.location.lon,
                        hazard.spatial_key
                    );
                }
                Err(err) => {
                    report.failed_count += 1;
                    tracing::warn!("Failed to create hazard: {}", err);
                }
            }

            let delay = self.next_delay();
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining <= delay {
                break;
            }

            match shutdown.as_mut() {
                Some(rx) => {
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = rx.recv() => {
                            tracing::info!("Simulation interrupted by shutdown");
                            break;
                        }
                    }
                }
                None => sleep(delay).await,
            }
        }

        tracing::info!(
            "Simulation finished: {} hazard(s) created, {} failed",
            report.hazard_count,
            report.failed_count
        );
        report
    }
}
