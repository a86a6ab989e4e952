//! Single-consumer fan-out of accepted pixels to every registered connection.

use std::sync::Arc;

use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::state::{canvas::Pixel, hub::ConnectionHub};

/// Producer side of the shared broadcast queue.
///
/// Enqueueing never waits: the queue is unbounded and drained by one task, which keeps
/// every connection on the same global order.
#[derive(Clone)]
pub struct BroadcastEngine {
    tx: mpsc::UnboundedSender<Pixel>,
}

/// Outcome of delivering one pixel to the current connection set.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOutReport {
    /// Connections whose channel accepted the pixel.
    pub delivered: usize,
    /// Connections unregistered because their channel was closed or full.
    pub dropped: usize,
}

impl BroadcastEngine {
    /// Start the fan-out task. It stops once every engine handle has been dropped.
    pub fn spawn(hub: Arc<ConnectionHub>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(hub, rx));
        (Self { tx }, task)
    }

    /// Append an accepted pixel to the broadcast queue. Returns `false` if the fan-out task
    /// is gone.
    pub fn enqueue(&self, pixel: Pixel) -> bool {
        self.tx.send(pixel).is_ok()
    }
}

async fn run(hub: Arc<ConnectionHub>, mut rx: mpsc::UnboundedReceiver<Pixel>) {
    while let Some(pixel) = rx.recv().await {
        let report = fan_out(&hub, &pixel).await;
        debug!(
            x = pixel.x,
            y = pixel.y,
            delivered = report.delivered,
            dropped = report.dropped,
            "broadcast pixel"
        );
    }
    info!("broadcast queue closed; fan-out task exiting");
}

/// Push `pixel` into every registered delivery channel.
///
/// A connection whose channel is closed, or full because it stopped draining, is
/// unregistered; the others are unaffected.
pub async fn fan_out(hub: &ConnectionHub, pixel: &Pixel) -> FanOutReport {
    let mut report = FanOutReport::default();

    for (id, tx) in hub.snapshot().await {
        match tx.try_send(pixel.clone()) {
            Ok(()) => report.delivered += 1,
            Err(TrySendError::Full(_)) => {
                let identity = hub.identity_of(id).await;
                warn!(
                    connection = %id,
                    identity = ?identity.as_ref().map(|i| i.as_str()),
                    "delivery channel full; dropping stalled connection"
                );
                hub.unregister(id).await;
                report.dropped += 1;
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection = %id, "delivery channel closed; unregistering");
                hub.unregister(id).await;
                report.dropped += 1;
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::canvas::{ClientIdentity, ConnectionId};

    fn pixel(x: u32, color: &str) -> Pixel {
        Pixel {
            x,
            y: 1,
            color: color.into(),
            origin_id: Some("tester".into()),
        }
    }

    #[tokio::test]
    async fn every_connection_receives_pixels_in_enqueue_order() {
        let hub = Arc::new(ConnectionHub::new(16));
        let mut receivers = Vec::new();
        for n in 0..3 {
            receivers.push(
                hub.register(ConnectionId::new(), ClientIdentity::new(format!("10.0.0.{n}")))
                    .await,
            );
        }

        let (engine, _task) = BroadcastEngine::spawn(hub.clone());
        let sent: Vec<Pixel> = (0..5).map(|x| pixel(x, "#123456")).collect();
        for p in &sent {
            assert!(engine.enqueue(p.clone()));
        }

        for rx in receivers.iter_mut() {
            let mut got = Vec::new();
            for _ in 0..sent.len() {
                got.push(rx.recv().await.unwrap());
            }
            assert_eq!(got, sent);
        }
    }

    #[tokio::test]
    async fn closed_channel_is_isolated_and_unregistered() {
        let hub = ConnectionHub::new(4);
        let gone = ConnectionId::new();
        let alive = ConnectionId::new();
        let gone_rx = hub.register(gone, ClientIdentity::new("a")).await;
        let mut alive_rx = hub.register(alive, ClientIdentity::new("b")).await;
        drop(gone_rx);

        let report = fan_out(&hub, &pixel(2, "#FF0000")).await;

        assert_eq!(
            report,
            FanOutReport {
                delivered: 1,
                dropped: 1
            }
        );
        assert_eq!(alive_rx.recv().await, Some(pixel(2, "#FF0000")));
        assert_eq!(hub.len().await, 1);
        assert!(hub.identity_of(gone).await.is_none());
    }

    #[tokio::test]
    async fn stalled_connection_is_dropped_without_blocking_others() {
        let hub = ConnectionHub::new(1);
        let stalled = ConnectionId::new();
        let mut stalled_rx = hub.register(stalled, ClientIdentity::new("slow")).await;
        let mut fast_rx = hub.register(ConnectionId::new(), ClientIdentity::new("fast")).await;

        let first = fan_out(&hub, &pixel(0, "#000000")).await;
        assert_eq!(first.delivered, 2);
        assert_eq!(fast_rx.recv().await, Some(pixel(0, "#000000")));

        let second = fan_out(&hub, &pixel(1, "#FFFFFF")).await;
        assert_eq!(second.delivered, 1);
        assert_eq!(second.dropped, 1);
        assert_eq!(fast_rx.recv().await, Some(pixel(1, "#FFFFFF")));

        // The stalled connection still drains what it had, then sees its channel closed.
        assert_eq!(stalled_rx.recv().await, Some(pixel(0, "#000000")));
        assert_eq!(stalled_rx.recv().await, None);
    }

    #[tokio::test]
    async fn enqueue_fails_once_the_engine_task_is_gone() {
        let hub = Arc::new(ConnectionHub::new(1));
        let (engine, task) = BroadcastEngine::spawn(hub);
        task.abort();
        let _ = task.await;
        assert!(!engine.enqueue(pixel(0, "#000000")));
    }
}
