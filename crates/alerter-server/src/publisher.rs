//! Fan-out of correlation events to named channels.

use std::sync::Arc;

use alerter_core::CorrelationEvent;
use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::PublishError;

/// A serialized event on its way to channel subscribers.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub channel: Arc<str>,
    pub hazard_id: String,
    pub route_id: Option<String>,
    /// Envelope JSON, shared between subscribers.
    pub payload: Arc<str>,
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish `events` in order. Returns how many were published.
    async fn publish(&self, channel: &str, events: &[CorrelationEvent]) -> Result<usize, PublishError>;
}

/// Publishes onto a tokio broadcast channel read by WebSocket handlers.
#[derive(Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<ChannelMessage>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelMessage> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, channel: &str, events: &[CorrelationEvent]) -> Result<usize, PublishError> {
        let channel: Arc<str> = Arc::from(channel);
        let messages = events
            .iter()
            .map(|event| {
                Ok(ChannelMessage {
                    channel: channel.clone(),
                    hazard_id: event.hazard_id().to_string(),
                    route_id: event.route_id().map(str::to_string),
                    payload: Arc::from(serde_json::to_string(event)?),
                })
            })
            .collect::<Result<Vec<_>, PublishError>>()?;

        let published = messages.len();
        for message in messages {
            // No subscribers is not a failure; the event is simply unobserved.
            let _ = self.tx.send(message);
        }
        Ok(published)
    }
}

/// Whether a subscriber on `subscription` receives a publish on `published`.
///
/// Exact names match; `alerts` and `alerts/*` also match any `alerts/...`.
pub fn channel_matches(subscription: &str, published: &str) -> bool {
    if subscription == published {
        return true;
    }
    let prefix = subscription.strip_suffix("/*").unwrap_or(subscription);
    if prefix == published {
        return true;
    }
    published
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Publish, re-attempting exactly once on failure.
pub async fn publish_with_retry(
    publisher: &dyn EventPublisher,
    channel: &str,
    events: &[CorrelationEvent],
) -> Result<usize, PublishError> {
    match publisher.publish(channel, events).await {
        Ok(count) => Ok(count),
        Err(err) => {
            tracing::warn!("Publish to '{}' failed, retrying once: {}", channel, err);
            publisher.publish(channel, events).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerter_core::{Hazard, HazardKind, Point, Route};
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn events() -> Vec<CorrelationEvent> {
        let now = Utc::now();
        let hazard = Hazard::new(HazardKind::Thunderstorm, Point::new(51.55, -0.05), 4, now).unwrap();
        let route = Route::new(vec![Point::new(51.5, -0.1), Point::new(51.6, 0.0)], now).unwrap();
        vec![
            CorrelationEvent::hazard(&hazard),
            CorrelationEvent::alert(&hazard, &route),
        ]
    }

    #[tokio::test]
    async fn broadcasts_envelopes_in_order() {
        let publisher = BroadcastPublisher::new(16);
        let mut rx = publisher.subscribe();
        let events = events();

        let count = publisher.publish("alerts", &events).await.unwrap();
        assert_eq!(count, 2);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(&*first.channel, "alerts");
        assert!(first.route_id.is_none());
        assert_eq!(second.route_id.as_deref(), events[1].route_id());

        let parsed: CorrelationEvent = serde_json::from_str(&second.payload).unwrap();
        assert_eq!(parsed, events[1]);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_succeeds() {
        let publisher = BroadcastPublisher::new(4);
        assert_eq!(publisher.subscriber_count(), 0);
        assert_eq!(publisher.publish("alerts", &events()).await.unwrap(), 2);
    }

    #[test]
    fn matches_channel_names() {
        assert!(channel_matches("alerts", "alerts"));
        assert!(channel_matches("alerts", "alerts/route-1"));
        assert!(channel_matches("alerts/*", "alerts/route-1"));
        assert!(channel_matches("alerts/*", "alerts"));
        assert!(!channel_matches("alerts", "alertsx"));
        assert!(!channel_matches("alerts/route-1", "alerts"));
        assert!(!channel_matches("hazards", "alerts"));
    }

    struct FlakyPublisher {
        failures: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl EventPublisher for FlakyPublisher {
        async fn publish(&self, _channel: &str, events: &[CorrelationEvent]) -> Result<usize, PublishError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(PublishError::Unavailable("broker busy".into()));
            }
            Ok(events.len())
        }
    }

    #[tokio::test]
    async fn retries_publish_exactly_once() {
        let publisher = FlakyPublisher {
            failures: AtomicU32::new(1),
            calls: AtomicU32::new(0),
        };
        assert_eq!(publish_with_retry(&publisher, "alerts", &events()).await.unwrap(), 2);
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 2);

        let publisher = FlakyPublisher {
            failures: AtomicU32::new(2),
            calls: AtomicU32::new(0),
        };
        assert!(publish_with_retry(&publisher, "alerts", &events()).await.is_err());
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 2);
    }
}
