use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Per-room broadcast of applied booking events. External notifiers (mail,
/// live calendar refresh) subscribe here; nothing is delivered from the core.
pub struct ChangeFeed {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to one room. Creates the channel if needed.
    pub fn subscribe(&self, room_id: Ulid) -> broadcast::Receiver<Event> {
        self.channels
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening. Channels whose receivers are all gone
    /// are dropped.
    pub fn send(&self, event: &Event) {
        let room_id = event.room_id();
        let closed = match self.channels.get(&room_id) {
            Some(sender) => sender.send(event.clone()).is_err() && sender.receiver_count() == 0,
            None => false,
        };
        if closed {
            self.channels.remove_if(&room_id, |_, s| s.receiver_count() == 0);
        }
    }

    pub fn subscriber_rooms(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let feed = ChangeFeed::new();
        let rid = Ulid::new();
        let mut rx = feed.subscribe(rid);

        let event = Event::RoomRetired { id: rid };
        feed.send(&event);

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn other_rooms_are_not_delivered() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe(Ulid::new());
        feed.send(&Event::RoomRetired { id: Ulid::new() });
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn send_without_subscribers_is_noop() {
        let feed = ChangeFeed::new();
        feed.send(&Event::RoomRetired { id: Ulid::new() });
        assert_eq!(feed.subscriber_rooms(), 0);
    }

    #[test]
    fn dropped_subscribers_release_channel() {
        let feed = ChangeFeed::new();
        let rid = Ulid::new();
        drop(feed.subscribe(rid));
        assert_eq!(feed.subscriber_rooms(), 1);
        feed.send(&Event::RoomRetired { id: rid });
        assert_eq!(feed.subscriber_rooms(), 0);
    }
}
