//! In-process sensor event stream with explicit subscriptions.
//!
//! Publishers push raw samples keyed by sensor name; every live
//! subscription for that sensor receives its own copy over an unbounded
//! channel. Removing a subscription drops its sender, so the receiving
//! side sees the channel close once queued samples are drained.

use crate::sensor::types::Sample;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Identifies one installed subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving end handed to the subscriber.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    sensor: String,
    receiver: UnboundedReceiver<Sample>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn sensor(&self) -> &str {
        &self.sensor
    }

    /// Wait for the next sample. Returns `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Sample> {
        self.receiver.recv().await
    }

    /// Take a queued sample without waiting.
    pub fn try_recv(&mut self) -> Option<Sample> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Default)]
struct BusInner {
    routes: Mutex<HashMap<String, Vec<(SubscriptionId, UnboundedSender<Sample>)>>>,
    next_id: AtomicU64,
}

/// Cloneable handle to the shared event stream.
#[derive(Clone, Default)]
pub struct SensorBus {
    inner: Arc<BusInner>,
}

impl SensorBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn routes(&self) -> MutexGuard<'_, HashMap<String, Vec<(SubscriptionId, UnboundedSender<Sample>)>>> {
        // A poisoned map is still structurally valid
        self.inner
            .routes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install a subscription for one sensor.
    pub fn subscribe(&self, sensor: &str) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = unbounded_channel();

        self.routes()
            .entry(sensor.to_string())
            .or_default()
            .push((id, sender));

        tracing::debug!(sensor, id = id.0, "subscribed");

        Subscription {
            id,
            sensor: sensor.to_string(),
            receiver,
        }
    }

    /// Remove a subscription. Returns `false` if it was not installed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut routes = self.routes();
        let mut removed = false;

        routes.retain(|_, subscribers| {
            let before = subscribers.len();
            subscribers.retain(|(sid, _)| *sid != id);
            removed |= subscribers.len() != before;
            !subscribers.is_empty()
        });

        if removed {
            tracing::debug!(id = id.0, "unsubscribed");
        }
        removed
    }

    /// Deliver a sample to every subscriber of its sensor.
    ///
    /// Returns the number of subscriptions that received it.
    pub fn publish(&self, sample: Sample) -> usize {
        let mut routes = self.routes();
        let Some(subscribers) = routes.get_mut(&sample.sensor) else {
            return 0;
        };

        // Receivers dropped without unsubscribing are pruned here
        subscribers.retain(|(_, sender)| !sender.is_closed());

        let mut delivered = 0;
        for (_, sender) in subscribers.iter() {
            if sender.send(sample.clone()).is_ok() {
                delivered += 1;
            }
        }

        if subscribers.is_empty() {
            routes.remove(&sample.sensor);
        }
        delivered
    }

    /// Number of live subscriptions for a sensor.
    pub fn subscriber_count(&self, sensor: &str) -> usize {
        self.routes().get(sensor).map(Vec::len).unwrap_or(0)
    }

    /// Total number of live subscriptions.
    pub fn total_subscriptions(&self) -> usize {
        self.routes().values().map(Vec::len).sum()
    }
}
