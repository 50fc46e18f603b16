//! Ordered, at-least-once feed of store insert notifications.
//!
//! Every successful store put appends one [`ChangeNotification`] carrying the
//! full inserted record. A consumer leases notifications with
//! [`ChangeTap::next_batch`] and must [`ack`](ChangeTap::ack) each one;
//! anything nacked or released goes back to the head of the queue and is
//! delivered again. A notification leased more than `max_deliveries` times is
//! dead-lettered.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use alerter_core::{Hazard, Route};
use tokio::sync::Notify;

/// The record a store insert produced.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertedRecord {
    Hazard(Hazard),
    Route(Route),
}

impl InsertedRecord {
    pub fn id(&self) -> &str {
        match self {
            InsertedRecord::Hazard(hazard) => &hazard.id,
            InsertedRecord::Route(route) => &route.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    pub sequence: u64,
    pub record: InsertedRecord,
    /// 1 on first delivery, incremented on every redelivery.
    pub delivery_attempt: u32,
}

/// Which notifications a consumer acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFilter {
    All,
    HazardInserts,
}

impl ChangeFilter {
    pub fn accepts(&self, record: &InsertedRecord) -> bool {
        match self {
            ChangeFilter::All => true,
            ChangeFilter::HazardInserts => matches!(record, InsertedRecord::Hazard(_)),
        }
    }
}

#[derive(Debug)]
struct Entry {
    sequence: u64,
    record: InsertedRecord,
    deliveries: u32,
}

#[derive(Debug, Default)]
struct TapState {
    next_sequence: u64,
    pending: VecDeque<Entry>,
    in_flight: HashMap<u64, Entry>,
    dead_lettered: u64,
    closed: bool,
}

#[derive(Debug)]
struct TapInner {
    state: Mutex<TapState>,
    notify: Notify,
    max_deliveries: u32,
}

/// Cloneable handle to a single-partition change feed.
#[derive(Debug, Clone)]
pub struct ChangeTap {
    inner: Arc<TapInner>,
}

impl Default for ChangeTap {
    fn default() -> Self {
        Self::new(5)
    }
}

impl ChangeTap {
    pub fn new(max_deliveries: u32) -> Self {
        Self {
            inner: Arc::new(TapInner {
                state: Mutex::new(TapState::default()),
                notify: Notify::new(),
                max_deliveries: max_deliveries.max(1),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TapState> {
        // A panic while holding the lock leaves the queues consistent.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an insert notification. Returns its sequence number, or `None`
    /// if the tap has been closed.
    pub fn append(&self, record: InsertedRecord) -> Option<u64> {
        let sequence = {
            let mut state = self.state();
            if state.closed {
                tracing::debug!("Change tap closed, dropping insert of {}", record.id());
                return None;
            }
            state.next_sequence += 1;
            let sequence = state.next_sequence;
            state.pending.push_back(Entry {
                sequence,
                record,
                deliveries: 0,
            });
            sequence
        };
        self.inner.notify.notify_one();
        Some(sequence)
    }

    /// Lease up to `max` notifications, waiting until at least one is
    /// available. An empty batch means the tap is closed and drained.
    pub async fn next_batch(&self, max: usize) -> Vec<ChangeNotification> {
        let max = max.max(1);
        loop {
            {
                let mut state = self.state();
                let batch = self.lease(&mut state, max);
                if !batch.is_empty() {
                    return batch;
                }
                if state.closed {
                    return Vec::new();
                }
            }
            self.inner.notify.notified().await;
        }
    }

    fn lease(&self, state: &mut TapState, max: usize) -> Vec<ChangeNotification> {
        let mut batch = Vec::new();
        while batch.len() < max {
            let Some(mut entry) = state.pending.pop_front() else {
                break;
            };
            if entry.deliveries >= self.inner.max_deliveries {
                state.dead_lettered += 1;
                tracing::error!(
                    "Dead-lettering change #{} ({}) after {} deliveries",
                    entry.sequence,
                    entry.record.id(),
                    entry.deliveries
                );
                continue;
            }
            entry.deliveries += 1;
            batch.push(ChangeNotification {
                sequence: entry.sequence,
                record: entry.record.clone(),
                delivery_attempt: entry.deliveries,
            });
            state.in_flight.insert(entry.sequence, entry);
        }
        batch
    }

    /// Mark a leased notification as processed.
    pub fn ack(&self, sequence: u64) -> bool {
        self.state().in_flight.remove(&sequence).is_some()
    }

    /// Return a leased notification to the head of the queue for redelivery.
    pub fn nack(&self, sequence: u64) -> bool {
        let requeued = {
            let mut state = self.state();
            match state.in_flight.remove(&sequence) {
                Some(entry) => {
                    state.pending.push_front(entry);
                    true
                }
                None => false,
            }
        };
        if requeued {
            self.inner.notify.notify_one();
        }
        requeued
    }

    /// Return every listed lease to the queue, preserving their order.
    pub fn release_all(&self, leased: &[u64]) {
        let released = {
            let mut state = self.state();
            let mut released = 0;
            for sequence in leased.iter().rev() {
                if let Some(entry) = state.in_flight.remove(sequence) {
                    state.pending.push_front(entry);
                    released += 1;
                }
            }
            released
        };
        if released > 0 {
            tracing::info!("Released {} leased change notification(s)", released);
            self.inner.notify.notify_one();
        }
    }

    /// Stop accepting appends and wake any waiting consumer.
    pub fn close(&self) {
        self.state().closed = true;
        self.inner.notify.notify_waiters();
        self.inner.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Notifications waiting to be leased.
    pub fn pending_len(&self) -> usize {
        self.state().pending.len()
    }

    /// Notifications leased but not yet acked.
    pub fn in_flight_len(&self) -> usize {
        self.state().in_flight.len()
    }

    pub fn dead_lettered(&self) -> u64 {
        self.state().dead_lettered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerter_core::{HazardKind, Point};
    use chrono::Utc;
    use std::time::Duration;

    fn hazard() -> InsertedRecord {
        let hazard = Hazard::new(HazardKind::Thunderstorm, Point::new(51.5, -0.1), 4, Utc::now())
            .unwrap();
        InsertedRecord::Hazard(hazard)
    }

    fn route() -> InsertedRecord {
        let route = Route::new(
            vec![Point::new(51.5, -0.1), Point::new(51.6, 0.0)],
            Utc::now(),
        )
        .unwrap();
        InsertedRecord::Route(route)
    }

    #[tokio::test]
    async fn delivers_in_append_order() {
        let tap = ChangeTap::new(5);
        let first = tap.append(hazard()).unwrap();
        let second = tap.append(route()).unwrap();

        let batch = tap.next_batch(10).await;
        let sequences: Vec<u64> = batch.iter().map(|n| n.sequence).collect();
        assert_eq!(sequences, vec![first, second]);
        assert!(batch.iter().all(|n| n.delivery_attempt == 1));
        assert_eq!(tap.in_flight_len(), 2);

        assert!(tap.ack(first));
        assert!(tap.ack(second));
        assert!(!tap.ack(second));
        assert_eq!(tap.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn nacked_notification_is_redelivered_first() {
        let tap = ChangeTap::new(5);
        let first = tap.append(hazard()).unwrap();
        let batch = tap.next_batch(1).await;
        tap.append(hazard()).unwrap();

        assert!(tap.nack(batch[0].sequence));

        let redelivered = tap.next_batch(1).await;
        assert_eq!(redelivered[0].sequence, first);
        assert_eq!(redelivered[0].delivery_attempt, 2);
    }

    #[tokio::test]
    async fn dead_letters_after_max_deliveries() {
        let tap = ChangeTap::new(2);
        tap.append(hazard()).unwrap();

        for _ in 0..2 {
            let batch = tap.next_batch(1).await;
            tap.nack(batch[0].sequence);
        }

        tap.close();
        assert!(tap.next_batch(1).await.is_empty());
        assert_eq!(tap.dead_lettered(), 1);
    }

    #[tokio::test]
    async fn release_all_preserves_order() {
        let tap = ChangeTap::new(5);
        for _ in 0..3 {
            tap.append(hazard());
        }
        let leased: Vec<u64> = tap.next_batch(3).await.iter().map(|n| n.sequence).collect();

        tap.release_all(&leased);

        let again: Vec<u64> = tap.next_batch(3).await.iter().map(|n| n.sequence).collect();
        assert_eq!(again, leased);
    }

    #[tokio::test]
    async fn close_wakes_waiting_consumer() {
        let tap = ChangeTap::new(5);
        let consumer = tap.clone();
        let handle = tokio::spawn(async move { consumer.next_batch(4).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        tap.close();

        let batch = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("consumer woke")
            .unwrap();
        assert!(batch.is_empty());
        assert!(tap.append(hazard()).is_none());
    }

    #[test]
    fn hazard_filter_skips_routes() {
        assert!(ChangeFilter::HazardInserts.accepts(&hazard()));
        assert!(!ChangeFilter::HazardInserts.accepts(&route()));
        assert!(ChangeFilter::All.accepts(&route()));
    }
}
