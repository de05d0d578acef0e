//! Progress bus
//!
//! In-process publish/subscribe fanning task updates out to WebSocket
//! subscribers. Delivery is best-effort: every subscriber owns a bounded
//! channel, and a subscriber whose buffer is full or whose receiver is gone
//! is evicted rather than allowed to block the rest. Updates for one task
//! are published from its single coordinator loop and each channel is FIFO,
//! so per-task ordering survives the fan-out; nothing is guaranteed across
//! tasks. Late joiners see only future updates.

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Buffered updates per subscriber before it counts as slow
const SUBSCRIBER_BUFFER: usize = 64;

/// One task update as published to clients
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    /// Message discriminator, always `"progress"`
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub task_id: String,
    pub percentage: i64,
    #[serde(rename = "statusText")]
    pub status_text: String,
    pub finished: bool,
    pub preview: Option<String>,
    pub results: Vec<String>,
}

impl ProgressUpdate {
    pub fn new(
        task_id: String,
        percentage: i64,
        status_text: String,
        finished: bool,
        preview: Option<String>,
        results: Vec<String>,
    ) -> Self {
        Self {
            kind: "progress",
            task_id,
            percentage,
            status_text,
            finished,
            preview,
            results,
        }
    }
}

struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<ProgressUpdate>,
}

/// Best-effort progress fan-out
pub struct ProgressBus {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Register a subscriber; the returned id is used to unsubscribe
    pub fn subscribe(&self) -> (Uuid, mpsc::Receiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = Uuid::new_v4();
        self.subscribers.write().push(Subscriber { id, tx });
        tracing::debug!(subscriber = %id, "progress subscriber joined");
        (id, rx)
    }

    /// Remove a subscriber and release its channel
    pub fn unsubscribe(&self, id: Uuid) {
        self.subscribers.write().retain(|sub| sub.id != id);
        tracing::debug!(subscriber = %id, "progress subscriber left");
    }

    /// Deliver an update to every live subscriber, dropping the slow and the
    /// broken ones.
    pub fn publish(&self, update: ProgressUpdate) {
        let snapshot: Vec<(Uuid, mpsc::Sender<ProgressUpdate>)> = self
            .subscribers
            .read()
            .iter()
            .map(|sub| (sub.id, sub.tx.clone()))
            .collect();

        let mut evicted = Vec::new();
        for (id, tx) in snapshot {
            if tx.try_send(update.clone()).is_err() {
                evicted.push(id);
            }
        }
        if !evicted.is_empty() {
            self.subscribers
                .write()
                .retain(|sub| !evicted.contains(&sub.id));
            for id in evicted {
                tracing::debug!(subscriber = %id, "dropped slow or closed progress subscriber");
            }
        }
    }

    /// Current subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(task_id: &str, percentage: i64) -> ProgressUpdate {
        ProgressUpdate::new(
            task_id.to_string(),
            percentage,
            String::new(),
            false,
            None,
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn updates_arrive_in_publish_order() {
        let bus = ProgressBus::new();
        let (_id, mut rx) = bus.subscribe();
        for p in [10, 20, 30] {
            bus.publish(update("t", p));
        }
        assert_eq!(rx.recv().await.unwrap().percentage, 10);
        assert_eq!(rx.recv().await.unwrap().percentage, 20);
        assert_eq!(rx.recv().await.unwrap().percentage, 30);
    }

    #[tokio::test]
    async fn late_joiner_sees_only_future_updates() {
        let bus = ProgressBus::new();
        bus.publish(update("t", 10));
        let (_id, mut rx) = bus.subscribe();
        bus.publish(update("t", 20));
        assert_eq!(rx.recv().await.unwrap().percentage, 20);
    }

    #[tokio::test]
    async fn slow_subscriber_is_evicted_without_blocking_others() {
        let bus = ProgressBus::new();
        let (_slow_id, slow_rx) = bus.subscribe();
        let (_fast_id, mut fast_rx) = bus.subscribe();

        // The slow peer never drains; the fast one keeps up. Publishing past
        // the buffer evicts only the slow one.
        let mut fast_received = 0;
        for p in 0..(SUBSCRIBER_BUFFER as i64 + 2) {
            bus.publish(update("t", p));
            if fast_rx.try_recv().is_ok() {
                fast_received += 1;
            }
        }
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(fast_received, SUBSCRIBER_BUFFER as i64 + 2);

        drop(slow_rx);
        bus.publish(update("t", 99));
        assert_eq!(fast_rx.recv().await.unwrap().percentage, 99);
    }

    #[tokio::test]
    async fn closed_subscriber_is_evicted_on_next_publish() {
        let bus = ProgressBus::new();
        let (_id, rx) = bus.subscribe();
        drop(rx);
        bus.publish(update("t", 1));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn update_serializes_to_wire_shape() {
        let json = serde_json::to_value(update("123-1", 40)).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["task_id"], "123-1");
        assert_eq!(json["percentage"], 40);
        assert!(json.get("statusText").is_some());
        assert!(json.get("finished").is_some());
    }
}
