//! Hazard to route correlation.
//!
//! For each newly inserted hazard the engine emits one `Hazard` event and
//! one `Alert` per active route within the proximity threshold. Events
//! already recorded in the [`AlertLedger`] are suppressed, so redelivered
//! notifications never alert the same (hazard, route) pair twice.

use std::sync::Arc;
use std::time::{Duration, Instant};

use alerter_core::{
    is_point_near_route, validate_route_points, CorrelationEvent, CorrelationRules, Hazard,
    HAZARD_TTL_SECS,
};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::backoff::{retry_transient, RetryPolicy};
use crate::cache::{prune_cache, CacheEntry};
use crate::clock::Clock;
use crate::error::PublishError;
use crate::publisher::{publish_with_retry, EventPublisher};
use crate::store::RouteStore;

const LEDGER_MAX_ENTRIES: usize = 100_000;

type DedupeKey = (String, Option<String>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LedgerState {
    /// Claimed by a worker whose publish has not finished.
    Pending,
    Published,
}

#[derive(Debug, Clone, Copy)]
struct LedgerEntry {
    state: LedgerState,
    recorded_at: Instant,
}

impl CacheEntry for LedgerEntry {
    fn recorded_at(&self) -> Instant {
        self.recorded_at
    }
}

/// Dedupe keys of events that are being published or have been published.
///
/// A worker claims keys before publishing, so two deliveries of the same
/// hazard racing each other publish each event once.
pub struct AlertLedger {
    entries: DashMap<DedupeKey, LedgerEntry>,
    max_entries: usize,
    max_age: Duration,
}

impl Default for AlertLedger {
    fn default() -> Self {
        Self::new(LEDGER_MAX_ENTRIES, Duration::from_secs(HAZARD_TTL_SECS as u64))
    }
}

impl AlertLedger {
    pub fn new(max_entries: usize, max_age: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            max_age,
        }
    }

    pub fn contains(&self, event: &CorrelationEvent) -> bool {
        self.entries.contains_key(&event.dedupe_key())
    }

    /// Atomically claim the keys of `events` that nobody holds yet.
    ///
    /// Returns the claimed events in their original order. Each one must be
    /// passed to [`commit`](Self::commit) or [`release`](Self::release).
    pub fn claim(&self, events: &[CorrelationEvent]) -> Vec<CorrelationEvent> {
        let recorded_at = Instant::now();
        events
            .iter()
            .filter(|event| match self.entries.entry(event.dedupe_key()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(LedgerEntry {
                        state: LedgerState::Pending,
                        recorded_at,
                    });
                    true
                }
            })
            .cloned()
            .collect()
    }

    /// Record events as published. Call only after the publish succeeded.
    pub fn commit(&self, events: &[CorrelationEvent]) {
        let recorded_at = Instant::now();
        for event in events {
            self.entries.insert(
                event.dedupe_key(),
                LedgerEntry {
                    state: LedgerState::Published,
                    recorded_at,
                },
            );
        }
    }

    /// Drop pending claims after a failed publish so a redelivery can retry.
    pub fn release(&self, events: &[CorrelationEvent]) {
        for event in events {
            self.entries
                .remove_if(&event.dedupe_key(), |_, entry| entry.state == LedgerState::Pending);
        }
    }

    pub fn prune(&self) -> usize {
        prune_cache(&self.entries, self.max_entries, self.max_age)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of correlating one hazard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrelationOutcome {
    /// Events to publish: the `Hazard` event first, then alerts.
    pub events: Vec<CorrelationEvent>,
    pub routes_evaluated: usize,
    pub routes_skipped: usize,
    pub route_load_failed: bool,
}

impl CorrelationOutcome {
    pub fn alert_count(&self) -> usize {
        self.events.iter().filter(|event| event.is_alert()).count()
    }
}

#[derive(Clone)]
pub struct CorrelationEngine {
    routes: Arc<dyn RouteStore>,
    rules: CorrelationRules,
    retry: RetryPolicy,
    ledger: Arc<AlertLedger>,
}

impl CorrelationEngine {
    pub fn new(
        routes: Arc<dyn RouteStore>,
        rules: CorrelationRules,
        retry: RetryPolicy,
        ledger: Arc<AlertLedger>,
    ) -> Self {
        Self {
            routes,
            rules,
            retry,
            ledger,
        }
    }

    pub fn ledger(&self) -> &Arc<AlertLedger> {
        &self.ledger
    }

    /// Correlate a hazard against the routes active at `now`.
    ///
    /// Never fails: a route-load failure yields only the `Hazard` event, and
    /// malformed routes are skipped.
    pub async fn correlate(&self, hazard: &Hazard, now: DateTime<Utc>) -> CorrelationOutcome {
        let mut outcome = CorrelationOutcome::default();

        let hazard_event = CorrelationEvent::hazard(hazard);
        if !self.ledger.contains(&hazard_event) {
            outcome.events.push(hazard_event);
        }

        let page_size = self.rules.route_page_size;
        let routes = retry_transient(self.retry, "list_active_routes", || {
            self.routes.list_active_routes(now, page_size)
        })
        .await;

        let routes = match routes {
            Ok(routes) => routes,
            Err(err) => {
                tracing::warn!(
                    "Partial enrichment failure for hazard {}: route load failed: {}",
                    hazard.id,
                    err
                );
                outcome.route_load_failed = true;
                return outcome;
            }
        };

        for route in &routes {
            if let Err(err) = validate_route_points(&route.points) {
                tracing::warn!("Skipping malformed route {}: {}", route.id, err);
                outcome.routes_skipped += 1;
                continue;
            }
            outcome.routes_evaluated += 1;

            if is_point_near_route(&route.points, &hazard.location, self.rules.proximity_threshold_m) {
                let alert = CorrelationEvent::alert(hazard, route);
                if !self.ledger.contains(&alert) {
                    outcome.events.push(alert);
                }
            }
        }

        outcome
    }
}

/// Correlates a hazard and publishes the resulting events.
#[derive(Clone)]
pub struct CorrelationWorker {
    engine: CorrelationEngine,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    channel: String,
}

impl CorrelationWorker {
    pub fn new(
        engine: CorrelationEngine,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            publisher,
            clock,
            channel: channel.into(),
        }
    }

    pub fn ledger(&self) -> &Arc<AlertLedger> {
        self.engine.ledger()
    }

    /// Correlate and publish. Events are claimed in the ledger before the
    /// publish and released again if it fails.
    pub async fn handle(&self, hazard: &Hazard) -> Result<CorrelationOutcome, PublishError> {
        let mut outcome = self.engine.correlate(hazard, self.clock.now()).await;
        outcome.events = self.engine.ledger.claim(&outcome.events);
        if outcome.events.is_empty() {
            tracing::debug!("Hazard {} already published or in flight", hazard.id);
            return Ok(outcome);
        }

        if let Err(err) =
            publish_with_retry(self.publisher.as_ref(), &self.channel, &outcome.events).await
        {
            self.engine.ledger.release(&outcome.events);
            return Err(err);
        }
        self.engine.ledger.commit(&outcome.events);

        let alerts = outcome.alert_count();
        if alerts > 0 {
            tracing::info!(
                "Hazard {} ({}) alerted {} route(s)",
                hazard.id,
                hazard.kind,
                alerts
            );
        } else {
            tracing::debug!(
                "Hazard {} ({}) near no routes ({} evaluated)",
                hazard.id,
                hazard.kind,
                outcome.routes_evaluated
            );
        }
        Ok(outcome)
    }
}
