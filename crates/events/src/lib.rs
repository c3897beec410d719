//! Event bus adapter.
//!
//! A thin publish/subscribe seam: the uploader emits typed
//! [`UploadEvent`](chunkup_protocol::UploadEvent)s on a channel, and
//! [`forward`] republishes them by name on any [`EventBus`].

mod bus;
mod forward;

pub use bus::{EventBus, Handler, LocalBus, SubscriptionId};
pub use forward::{forward, prefixed};
