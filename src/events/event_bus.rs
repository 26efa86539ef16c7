//! Event bus for broadcasting state deltas to subscribers
//!
//! Uses a tokio broadcast channel. Publishers never block: a slow
//! subscriber lags and loses events instead of applying backpressure.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::events::{Event, EventMessage};

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 1024;

/// Event bus fanning deltas out to all subscribers
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventMessage>,
    subscriber_count: Arc<AtomicUsize>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscriber_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish an event to all subscribers. Never blocks.
    pub fn publish(&self, event: Event) {
        let message = EventMessage::new(event);
        let event_type = message.event.event_type();
        let charge_point_id = message.event.charge_point_id().to_string();

        match self.sender.send(message) {
            Ok(count) => {
                debug!(
                    event_type,
                    charge_point_id = charge_point_id.as_str(),
                    subscribers = count,
                    "Event published"
                );
            }
            Err(_) => {
                // No subscribers - normal when no dashboard clients are connected
                debug!(
                    event_type,
                    charge_point_id = charge_point_id.as_str(),
                    "Event published (no subscribers)"
                );
            }
        }
    }

    /// Subscribe to receive events from this point on.
    pub fn subscribe(&self) -> EventSubscriber {
        let receiver = self.sender.subscribe();
        self.subscriber_count.fetch_add(1, Ordering::SeqCst);
        let count = self.subscriber_count.load(Ordering::SeqCst);
        info!(total = count, "New event subscriber");

        EventSubscriber {
            receiver,
            subscriber_count: self.subscriber_count.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of the bus
pub struct EventSubscriber {
    receiver: broadcast::Receiver<EventMessage>,
    subscriber_count: Arc<AtomicUsize>,
}

impl EventSubscriber {
    /// Receive the next event. Lagging skips the lost events and keeps
    /// going; `None` means the bus is gone.
    pub async fn recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(missed = count, "Subscriber lagged, events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return None;
                }
            }
        }
    }
}

impl Drop for EventSubscriber {
    fn drop(&mut self) {
        self.subscriber_count.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shared event bus type
pub type SharedEventBus = Arc<EventBus>;

/// Create a shared event bus
pub fn create_event_bus() -> SharedEventBus {
    Arc::new(EventBus::new())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::events::events::StationUpdate;

    fn station_event(id: &str) -> Event {
        Event::StationUpdate(StationUpdate {
            charge_point_id: id.to_string(),
            status: "Available".to_string(),
            error_code: None,
            registered: true,
            connected: true,
            last_heartbeat: None,
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = EventBus::new();
        let mut subscriber = bus.subscribe();

        bus.publish(station_event("CP001"));

        let received = tokio::time::timeout(std::time::Duration::from_millis(100), subscriber.recv())
            .await
            .expect("Timeout")
            .expect("No message");

        assert_eq!(received.event.event_type(), "station_update");
        assert_eq!(received.event.charge_point_id(), "CP001");
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let bus = EventBus::new();
        let mut subscriber = bus.subscribe();

        bus.publish(station_event("CP001"));
        bus.publish(station_event("CP002"));

        assert_eq!(subscriber.recv().await.unwrap().event.charge_point_id(), "CP001");
        assert_eq!(subscriber.recv().await.unwrap().event.charge_point_id(), "CP002");
    }

    #[test]
    fn subscriber_count_tracks_drops() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);

        let sub1 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(sub1);
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub2);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn lagged_subscriber_drops_but_recovers() {
        let bus = EventBus::with_capacity(2);
        let mut subscriber = bus.subscribe();

        for _ in 0..5 {
            bus.publish(station_event("CP001"));
        }
        bus.publish(station_event("CP-LAST"));

        // The subscriber lost the oldest events but still receives the tail.
        let received = subscriber.recv().await.unwrap();
        assert_eq!(received.event.event_type(), "station_update");
    }
}
