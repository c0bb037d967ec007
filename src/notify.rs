use tokio::sync::broadcast;

use crate::model::SpotUpdate;

const CHANNEL_CAPACITY: usize = 256;

/// Fan-out hub for availability changes. One logical channel; subscribers are
/// process-local and the set is rebuilt from scratch on restart. Delivery is
/// best effort — a lagging or disconnected subscriber simply misses events.
///
/// The hub is handed to the engine and sweeper as a value so nothing reaches
/// for a global.
pub struct NotifyHub {
    channel: String,
    tx: broadcast::Sender<SpotUpdate>,
}

impl NotifyHub {
    pub fn new(channel: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            channel: channel.into(),
            tx,
        }
    }

    /// The logical channel name (`parking_updates` unless configured).
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SpotUpdate> {
        self.tx.subscribe()
    }

    /// Publish an availability change. No-op if nobody is listening.
    pub fn send(&self, update: SpotUpdate) {
        let _ = self.tx.send(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new("parking_updates");
        let mut rx = hub.subscribe();

        let update = SpotUpdate {
            spot_id: Ulid::new(),
            available_spots: 7,
        };
        hub.send(update.clone());

        assert_eq!(rx.recv().await.unwrap(), update);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new("parking_updates");
        hub.send(SpotUpdate {
            spot_id: Ulid::new(),
            available_spots: 0,
        });
    }

    #[tokio::test]
    async fn all_subscribers_receive() {
        let hub = NotifyHub::new("parking_updates");
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        let update = SpotUpdate {
            spot_id: Ulid::new(),
            available_spots: 3,
        };
        hub.send(update.clone());

        assert_eq!(a.recv().await.unwrap(), update);
        assert_eq!(b.recv().await.unwrap(), update);
    }

    #[test]
    fn payload_shape_matches_the_wire_contract() {
        let update = SpotUpdate {
            spot_id: Ulid::new(),
            available_spots: 4,
        };
        let json = serde_json::to_value(&update).unwrap();
        assert!(json.get("spotId").is_some());
        assert_eq!(json["availableSpots"], 4);
    }
}
