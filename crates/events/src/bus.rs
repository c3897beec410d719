use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::trace;

/// Callback invoked with an event payload.
pub type Handler = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Token returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Name-based publish/subscribe seam.
///
/// The uploader only publishes and subscribes through this trait, so any
/// external pub/sub mechanism can stand in for [`LocalBus`].
pub trait EventBus: Send + Sync {
    fn publish(&self, name: &str, payload: serde_json::Value);

    fn subscribe(&self, name: &str, handler: Handler) -> SubscriptionId;

    /// Returns `false` if the subscription was unknown.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// In-process bus. Handlers run synchronously on the publishing thread,
/// in subscription order, outside the registry lock.
#[derive(Default)]
pub struct LocalBus {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<String, Vec<(SubscriptionId, Handler)>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handlers registered for `name`.
    pub fn subscriber_count(&self, name: &str) -> usize {
        let handlers = self.handlers.read().unwrap();
        handlers.get(name).map_or(0, Vec::len)
    }
}

impl EventBus for LocalBus {
    fn publish(&self, name: &str, payload: serde_json::Value) {
        let targets: Vec<Handler> = {
            let handlers = self.handlers.read().unwrap();
            match handlers.get(name) {
                Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return,
            }
        };
        trace!(event = name, handlers = targets.len(), "publishing");
        for handler in targets {
            handler(&payload);
        }
    }

    fn subscribe(&self, name: &str, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.handlers.write().unwrap();
        handlers
            .entry(name.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap();
        let mut removed = false;
        handlers.retain(|_, list| {
            let before = list.len();
            list.retain(|(sid, _)| *sid != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }
}
