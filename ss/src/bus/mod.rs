//! Message bus contract
//!
//! The coordinator only needs two primitives from a bus: subscribe a handler to a named
//! channel and publish a raw string to it. Delivery is assumed at-least-once, unordered
//! across processes and possibly duplicated.
//!
//! A [`Subscription`] is an RAII guard. Whoever owns it owns the delivery: dropping it
//! stops the handler once the in-flight message has been handled.

mod memory;
mod registry;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub use memory::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_RECORD_LIMIT, InMemoryBus, PublishedMessage};
pub use registry::{BusRegistry, BusSelection};

/// Handler invoked for every message delivered on a subscribed channel
///
/// Arguments are `(channel, message)`. The bus awaits the returned future before it
/// delivers the next message to the same subscription.
pub type MessageHandler = Arc<dyn Fn(String, String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Errors reported by a bus implementation
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Bus unavailable: {0}")]
    Unavailable(String),

    #[error("Subscribe to channel '{channel}' failed: {message}")]
    Subscribe { channel: String, message: String },

    #[error("Publish to channel '{channel}' failed: {message}")]
    Publish { channel: String, message: String },
}

/// Pub/sub transport
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Name used for explicit bus selection
    fn name(&self) -> &str;

    /// Start delivering messages published on `channel` to `handler`
    async fn subscribe(&self, channel: &str, handler: MessageHandler) -> Result<Subscription, BusError>;

    /// Publish a raw message to every subscriber of `channel`
    async fn publish(&self, channel: &str, message: &str) -> Result<(), BusError>;
}

type CancelFn = Box<dyn FnOnce() + Send + Sync>;

/// Live subscription to a channel; delivery ends when this is dropped
pub struct Subscription {
    id: Uuid,
    channel: String,
    cancel: Option<CancelFn>,
}

impl Subscription {
    /// Create a subscription whose delivery is stopped by `cancel`
    pub fn new(channel: impl Into<String>, cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        let channel = channel.into();
        let id = Uuid::now_v7();
        debug!(%id, %channel, "Subscription::new: called");
        Self {
            id,
            channel,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Stop delivery explicitly
    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            debug!(id = %self.id, channel = %self.channel, "Subscription::stop: cancelling delivery");
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_drop_cancels_once() {
        let cancelled = Arc::new(AtomicUsize::new(0));
        let counter = cancelled.clone();
        let sub = Subscription::new("shell-changed", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(sub.channel(), "shell-changed");

        drop(sub);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explicit_cancel_does_not_cancel_twice() {
        let cancelled = Arc::new(AtomicUsize::new(0));
        let counter = cancelled.clone();
        let sub = Subscription::new("shell-changed", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        sub.cancel();
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }
}
