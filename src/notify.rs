use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, Topic};

const CHANNEL_CAPACITY: usize = 256;

/// Per-tenant fan-out of committed events, one broadcast channel per topic.
#[derive(Default)]
pub struct NotifyHub {
    channels: DashMap<Topic, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event committed on `topic` from now on.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish to the event's topic. No-op if nobody ever subscribed.
    pub fn send(&self, event: &Event) {
        if let Some(sender) = self.channels.get(&event.topic()) {
            let _ = sender.send(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[tokio::test]
    async fn events_route_by_topic() {
        let hub = NotifyHub::new();
        let mut tables = hub.subscribe(Topic::Tables);
        let mut reservations = hub.subscribe(Topic::Reservations);

        let event = Event::TableDeactivated { id: Ulid::new() };
        hub.send(&event);

        assert_eq!(tables.recv().await.unwrap(), event);
        assert!(reservations.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(&Event::ReservationCancelled { id: Ulid::new(), at: 0 });
    }
}
