//! Shared application state.

use std::sync::Arc;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::broadcast;

use crate::change_tap::ChangeTap;
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, StoreBackend};
use crate::correlation::{AlertLedger, CorrelationEngine, CorrelationWorker};
use crate::generator::{HazardGenerator, SimulationConfig};
use crate::publisher::BroadcastPublisher;
use crate::store::{self, ExpiringStore, HazardStore, MemoryStore, RouteStore, SqliteStore};

/// Everything the API handlers and background loops share.
pub struct AppState {
    config: Config,
    routes: Arc<dyn RouteStore>,
    hazards: Arc<dyn HazardStore>,
    expiring: Arc<dyn ExpiringStore>,
    tap: ChangeTap,
    publisher: BroadcastPublisher,
    worker: CorrelationWorker,
    clock: Arc<dyn Clock>,
    shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Build state on the backend selected by `config.store_backend`.
    pub async fn from_config(config: Config) -> Result<Self> {
        match config.store_backend {
            StoreBackend::Memory => Ok(Self::in_memory(config)),
            StoreBackend::Sqlite => {
                let tap = ChangeTap::new(config.change_tap_max_deliveries);
                let pool =
                    store::init_database(&config.database_path, config.database_max_connections)
                        .await?;
                let store = Arc::new(SqliteStore::new(
                    pool,
                    tap.clone(),
                    config.partition_key_hash_precision,
                ));
                Ok(Self::from_store(config, store, tap, Arc::new(SystemClock)))
            }
        }
    }

    pub fn in_memory(config: Config) -> Self {
        let tap = ChangeTap::new(config.change_tap_max_deliveries);
        let store = Arc::new(MemoryStore::new(
            tap.clone(),
            config.partition_key_hash_precision,
        ));
        Self::from_store(config, store, tap, Arc::new(SystemClock))
    }

    /// Wire state around one store that serves both routes and hazards.
    ///
    /// `tap` must be the change tap `store` appends to.
    pub fn from_store<S>(config: Config, store: Arc<S>, tap: ChangeTap, clock: Arc<dyn Clock>) -> Self
    where
        S: RouteStore + HazardStore + ExpiringStore + 'static,
    {
        let routes: Arc<dyn RouteStore> = store.clone();
        let hazards: Arc<dyn HazardStore> = store.clone();
        let expiring: Arc<dyn ExpiringStore> = store;

        let publisher = BroadcastPublisher::new(config.broadcast_capacity);
        let engine = CorrelationEngine::new(
            routes.clone(),
            config.correlation_rules(),
            config.store_retry,
            Arc::new(AlertLedger::default()),
        );
        let worker = CorrelationWorker::new(
            engine,
            Arc::new(publisher.clone()),
            clock.clone(),
            config.alerts_channel.clone(),
        );
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            routes,
            hazards,
            expiring,
            tap,
            publisher,
            worker,
            clock,
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn routes(&self) -> &Arc<dyn RouteStore> {
        &self.routes
    }

    pub fn hazards(&self) -> &Arc<dyn HazardStore> {
        &self.hazards
    }

    pub fn expiring(&self) -> &Arc<dyn ExpiringStore> {
        &self.expiring
    }

    pub fn tap(&self) -> &ChangeTap {
        &self.tap
    }

    pub fn publisher(&self) -> &BroadcastPublisher {
        &self.publisher
    }

    pub fn worker(&self) -> &CorrelationWorker {
        &self.worker
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// A hazard generator for one simulation run.
    pub fn hazard_generator(&self) -> HazardGenerator<StdRng> {
        HazardGenerator::new(
            SimulationConfig::from_config(&self.config),
            self.hazards.clone(),
            StdRng::from_os_rng(),
            self.clock.clone(),
            self.config.store_retry,
        )
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal every loop and simulation to stop, then close the change tap.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        self.tap.close();
    }
}
