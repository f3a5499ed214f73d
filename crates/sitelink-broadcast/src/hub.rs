//! Single-writer-many-reader pose hub.
//!
//! Uses [`tokio::sync::broadcast`] under the hood: `publish` hands the event
//! to the channel and returns immediately, every subscriber owns its own
//! receiver, and a subscriber that falls behind loses the oldest buffered
//! events (`RecvError::Lagged`) at its own edge instead of stalling the hub.
//!
//! This is a live-state stream, not an event log: there is no queuing or
//! retry for a disconnected subscriber, and events published while nobody is
//! listening are simply gone. Per-subscriber delivery keeps publish order;
//! there is no ordering guarantee across actors.

use sitelink_types::{ModelPoint, PoseEvent, SourceType};
use tokio::sync::broadcast;
use tracing::trace;

/// Buffered events per subscriber before the oldest are dropped for a slow
/// receiver.
pub const DEFAULT_CAPACITY: usize = 256;

/// Process-wide pose fan-out hub. Clone it cheaply – all clones share the
/// same underlying channel.
///
/// Built once at startup and handed by `Arc`/clone to the ingest and
/// connection-handling code; subscriptions are rebuilt from scratch after a
/// restart.
#[derive(Clone, Debug)]
pub struct PoseHub {
    sender: broadcast::Sender<PoseEvent>,
}

impl PoseHub {
    /// Create a hub with the given per-subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish `event` to every currently connected subscriber.
    ///
    /// Best-effort and fire-and-forget: returns the number of receivers the
    /// event was handed to. Publishing with zero subscribers is a normal
    /// no-op, not an error.
    pub fn publish(&self, event: PoseEvent) -> usize {
        let receivers = self.sender.send(event).unwrap_or(0);
        trace!(receivers, "pose published");
        receivers
    }

    /// Register a new subscriber.
    ///
    /// Dropping the returned receiver is the disconnect; dropping twice is
    /// trivially idempotent.
    pub fn subscribe(&self) -> PoseReceiver {
        PoseReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of currently connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// The synthetic pose sent to a freshly connected subscriber so it has an
    /// initial render state before any real sensor report arrives.
    ///
    /// The position matches the default worker spawn the viewer fleet was
    /// calibrated against.
    pub fn initial_pose() -> PoseEvent {
        PoseEvent::new(
            "worker_1".to_string(),
            "/models/worker.glb".to_string(),
            ModelPoint {
                x: -4544.3,
                y: 8019.0,
                z: 1000.0,
            },
            180.0,
            SourceType::Model,
            None,
        )
    }
}

impl Default for PoseHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A subscriber's end of the hub.
pub struct PoseReceiver {
    receiver: broadcast::Receiver<PoseEvent>,
}

impl PoseReceiver {
    /// Wait for the next pose event.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(RecvError::Lagged(n))` – this subscriber fell behind and `n`
    ///   events were dropped for it. The caller decides whether to continue.
    /// * `Err(RecvError::Closed)` – the hub has shut down.
    pub async fn recv(&mut self) -> Result<PoseEvent, broadcast::error::RecvError> {
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    fn make_event(actor_id: &str, x: f64) -> PoseEvent {
        PoseEvent::new(
            actor_id.to_string(),
            "/models/worker.glb".to_string(),
            ModelPoint { x, y: 0.0, z: 0.0 },
            0.0,
            SourceType::Model,
            None,
        )
    }

    #[tokio::test]
    async fn publish_and_receive() {
        let hub = PoseHub::default();
        let mut rx = hub.subscribe();

        let delivered = hub.publish(make_event("worker_1", 1.0));
        assert_eq!(delivered, 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.actor_id, "worker_1");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let hub = PoseHub::default();
        let mut rx1 = hub.subscribe();
        let mut rx2 = hub.subscribe();

        assert_eq!(hub.publish(make_event("truck_5", 2.0)), 2);

        assert_eq!(rx1.recv().await.unwrap().actor_id, "truck_5");
        assert_eq!(rx2.recv().await.unwrap().actor_id, "truck_5");
    }

    #[test]
    fn publish_with_zero_subscribers_is_a_noop() {
        let hub = PoseHub::default();
        // No receivers connected; this must not error or panic.
        assert_eq!(hub.publish(make_event("worker_1", 0.0)), 0);
    }

    #[tokio::test]
    async fn per_subscriber_delivery_preserves_publish_order() {
        let hub = PoseHub::default();
        let mut rx = hub.subscribe();

        for i in 0..10 {
            hub.publish(make_event("worker_1", i as f64));
        }
        for i in 0..10 {
            let event = rx.recv().await.unwrap();
            assert!((event.x - i as f64).abs() < 1e-12, "event {i} out of order");
        }
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let hub = PoseHub::new(8);
        let mut slow = hub.subscribe();

        // Flood far past the buffer while the subscriber sleeps.
        for i in 0..1000 {
            hub.publish(make_event("worker_1", i as f64));
        }

        match slow.recv().await {
            Err(RecvError::Lagged(n)) => assert!(n > 0),
            other => panic!("expected Lagged, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn subscriber_count_tracks_drops() {
        let hub = PoseHub::default();
        assert_eq!(hub.subscriber_count(), 0);

        let rx1 = hub.subscribe();
        let rx2 = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        drop(rx1);
        assert_eq!(hub.subscriber_count(), 1);
        drop(rx2);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn initial_pose_matches_default_spawn() {
        let pose = PoseHub::initial_pose();
        assert_eq!(pose.actor_id, "worker_1");
        assert_eq!(pose.model_asset_ref, "/models/worker.glb");
        assert!((pose.x - -4544.3).abs() < 1e-12);
        assert!((pose.y - 8019.0).abs() < 1e-12);
        assert!((pose.z - 1000.0).abs() < 1e-12);
        assert!((pose.rotation_deg - 180.0).abs() < 1e-12);
    }
}
