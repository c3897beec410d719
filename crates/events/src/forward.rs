use std::sync::Arc;

use chunkup_protocol::UploadEvent;
use tokio::sync::mpsc;
use tracing::debug;

use crate::bus::EventBus;

/// Joins the namespace prefix and an event name.
pub fn prefixed(prefix: &str, name: &str) -> String {
    format!("{prefix}{name}")
}

/// Publishes every typed event from `events` on `bus` as
/// `prefix + name`, until the sending side is dropped.
///
/// Returns the number of events forwarded.
pub async fn forward(
    mut events: mpsc::UnboundedReceiver<UploadEvent>,
    bus: Arc<dyn EventBus>,
    prefix: String,
) -> usize {
    let mut forwarded = 0;
    while let Some(event) = events.recv().await {
        bus.publish(&prefixed(&prefix, event.name()), event.payload());
        forwarded += 1;
    }
    debug!(forwarded, "event stream closed");
    forwarded
}
