use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::trace;

use crate::event::ParamUpdate;

/// In-process multicast fan-out between the gateway and its consumers.
///
/// Each subscriber owns a private unbounded FIFO queue, so publishers never
/// block; a pathologically slow subscriber trades memory for that guarantee,
/// which is acceptable at this design's scale (a handful of in-process
/// consumers). There is no replay: a subscription created after a publish
/// never sees it, so callers must subscribe before triggering the REST prime.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

#[derive(Default)]
struct BusInner {
    next_sequence: u64,
    subscribers: Vec<mpsc::UnboundedSender<ParamUpdate>>,
}

/// Handle yielding published updates forever, in publish order.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<ParamUpdate>,
}

impl Subscription {
    /// Wait for the next update. Returns `None` only once every bus clone
    /// has been dropped.
    pub async fn next(&mut self) -> Option<ParamUpdate> {
        self.rx.recv().await
    }

    /// Non-blocking drain, used by tests and diagnostics.
    pub fn try_next(&mut self) -> Option<ParamUpdate> {
        self.rx.try_recv().ok()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh, empty subscription.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        inner.subscribers.push(tx);
        Subscription { rx }
    }

    /// Deliver `update` to every current subscriber, stamping one global
    /// sequence number shared by all of them. Subscribe and publish hold the
    /// same lock, so a racing subscriber either sees an update or predates it.
    pub fn publish(&self, mut update: ParamUpdate) {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        inner.next_sequence += 1;
        update.sequence = inner.next_sequence;
        trace!(sequence = update.sequence, address = %update.address, "publish");
        inner
            .subscribers
            .retain(|tx| tx.send(update.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("bus lock poisoned").subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::ParamAddress;
    use crate::event::ParamValue;

    fn update(addr: &str, v: f64) -> ParamUpdate {
        ParamUpdate::new(
            "D1",
            ParamAddress::parse(addr).unwrap(),
            Some(ParamValue::Number(v)),
        )
    }

    #[tokio::test]
    async fn per_subscriber_fifo_with_shared_sequence() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(update("P4.v1", 1.0));
        bus.publish(update("P4.v2", 2.0));
        bus.publish(update("P4.v3", 3.0));

        for sub in [&mut a, &mut b] {
            let seqs: Vec<u64> = (0..3).map(|_| sub.try_next().unwrap().sequence).collect();
            assert_eq!(seqs, vec![1, 2, 3]);
            assert!(sub.try_next().is_none());
        }
    }

    #[tokio::test]
    async fn late_subscriber_sees_nothing_published_before() {
        let bus = EventBus::new();
        bus.publish(update("P4.v1", 1.0));
        bus.publish(update("P4.v2", 2.0));

        let mut late = bus.subscribe();
        assert!(late.try_next().is_none());

        bus.publish(update("P4.v3", 3.0));
        let got = late.try_next().unwrap();
        assert_eq!(got.address.to_string(), "P4.v3");
        // Sequence is global: the third publish carries 3 even for a fresh subscriber.
        assert_eq!(got.sequence, 3);
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let _b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(a);
        bus.publish(update("P4.v1", 1.0));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn next_wakes_on_publish() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        let publisher = bus.clone();
        let handle = tokio::spawn(async move {
            publisher.publish(update("P4.v9", 9.0));
        });

        let got = sub.next().await.unwrap();
        assert_eq!(got.address.to_string(), "P4.v9");
        handle.await.unwrap();
    }
}
