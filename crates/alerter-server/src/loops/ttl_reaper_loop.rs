//! Expired record reaper.
//!
//! Reads already filter on `ttl`; this loop reclaims the space and trims the
//! alert ledger.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::interval;

use crate::state::AppState;

const LOOP_INTERVAL_SECS: u64 = 60;

pub async fn run_ttl_reaper_loop(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = interval(Duration::from_secs(LOOP_INTERVAL_SECS));

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("TTL reaper loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                reap_once(&state).await;
            }
        }
    }
}

/// Purge expired records and prune the ledger. Returns records purged.
pub async fn reap_once(state: &AppState) -> u64 {
    let purged = match state.expiring().purge_expired(state.clock().now()).await {
        Ok(purged) => purged,
        Err(err) => {
            tracing::warn!("TTL purge failed: {}", err);
            0
        }
    };
    let pruned = state.worker().ledger().prune();

    if purged > 0 || pruned > 0 {
        tracing::debug!(
            "Reaped {} expired record(s), pruned {} ledger entries",
            purged,
            pruned
        );
    }
    purged
}
