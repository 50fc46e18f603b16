//! Correlation worker loop.
//!
//! Leases batches from the change tap and correlates each hazard insert on
//! its own task, bounded by a semaphore. Successful notifications are acked;
//! a failed publish is nacked for redelivery. Route inserts are acked
//! without correlation.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::change_tap::{ChangeFilter, ChangeTap, InsertedRecord};
use crate::correlation::CorrelationWorker;
use crate::state::AppState;

pub async fn run_correlation_loop(state: Arc<AppState>, shutdown: broadcast::Receiver<()>) {
    consume(
        state.worker().clone(),
        state.tap().clone(),
        state.config().correlation_concurrency,
        shutdown,
    )
    .await;
}

/// Drive `worker` from `tap` until shutdown or until the tap is closed and
/// drained.
pub async fn consume(
    worker: CorrelationWorker,
    tap: ChangeTap,
    concurrency: usize,
    mut shutdown: broadcast::Receiver<()>,
) {
    let concurrency = concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let filter = ChangeFilter::HazardInserts;
    let mut tasks = JoinSet::new();

    tracing::info!("Correlation loop started (concurrency {})", concurrency);

    'main: loop {
        let batch = tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Correlation loop shutting down");
                break;
            }
            batch = tap.next_batch(concurrency) => batch,
        };
        if batch.is_empty() {
            tracing::info!("Change tap closed, correlation loop exiting");
            break;
        }

        let mut remaining = batch.into_iter();
        while let Some(notification) = remaining.next() {
            if !matches!(shutdown.try_recv(), Err(TryRecvError::Empty)) {
                let mut leased = vec![notification.sequence];
                leased.extend(remaining.by_ref().map(|n| n.sequence));
                tap.release_all(&leased);
                tracing::info!("Correlation loop shutting down");
                break 'main;
            }

            if !filter.accepts(&notification.record) {
                tap.ack(notification.sequence);
                continue;
            }
            let InsertedRecord::Hazard(hazard) = notification.record else {
                tap.ack(notification.sequence);
                continue;
            };

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                tap.release_all(&[notification.sequence]);
                break 'main;
            };

            let worker = worker.clone();
            let tap = tap.clone();
            let sequence = notification.sequence;
            let attempt = notification.delivery_attempt;
            tasks.spawn(async move {
                match worker.handle(&hazard).await {
                    Ok(_) => {
                        tap.ack(sequence);
                    }
                    Err(err) => {
                        tracing::warn!(
                            "Publishing events for hazard {} failed (delivery {}): {}",
                            hazard.id,
                            attempt,
                            err
                        );
                        tap.nack(sequence);
                    }
                }
                drop(permit);
            });
        }

        while let Some(result) = tasks.try_join_next() {
            if let Err(err) = result {
                tracing::error!("Correlation task failed: {}", err);
            }
        }
    }

    while let Some(result) = tasks.join_next().await {
        if let Err(err) = result {
            tracing::error!("Correlation task failed: {}", err);
        }
    }
}
