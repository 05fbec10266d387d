use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// Events delivered to controllers by the host
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum DeviceEvent {
    /// An app came to the foreground
    AppLaunched { package: String },
    /// The screen turned off / device locked
    ScreenOff,
    /// The user unlocked the device
    UserPresent,
}

pub type SubscriptionId = u64;

/// A live subscription; events arrive one at a time in publish order
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: UnboundedReceiver<DeviceEvent>,
}

#[derive(Default)]
struct BusInner {
    next_id: SubscriptionId,
    subscribers: HashMap<SubscriptionId, UnboundedSender<DeviceEvent>>,
}

/// Fan-out of device events to explicitly registered subscribers
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscribers.insert(id, tx);
        debug!("Event bus subscription {} registered", id);
        Subscription { id, events: rx }
    }

    /// Remove a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.inner.lock().subscribers.remove(&id).is_some();
        if removed {
            debug!("Event bus subscription {} released", id);
        }
        removed
    }

    /// Deliver an event to every subscriber, returning how many received it
    pub fn publish(&self, event: DeviceEvent) -> usize {
        let mut inner = self.inner.lock();
        inner
            .subscribers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
        inner.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}
