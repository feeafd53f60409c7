//! In-process message bus
//!
//! Fans messages out to every subscriber through one `tokio::sync::broadcast` channel per
//! channel name. Each subscription runs its own delivery task, so a slow handler only
//! delays its own subscription. Used to wire several nodes inside one process (tests,
//! `ss simulate`) and carries fault injection for exercising the degraded paths.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

use super::{BusError, MessageBus, MessageHandler, Subscription};

/// Default per-channel buffer (messages)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default number of published messages kept for inspection
pub const DEFAULT_RECORD_LIMIT: usize = 4096;

/// A message accepted by [`InMemoryBus::publish`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub channel: String,
    pub message: String,
}

pub struct InMemoryBus {
    name: String,
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    published: Mutex<VecDeque<PublishedMessage>>,
    record_limit: usize,
    published_total: AtomicUsize,
    fail_publish: AtomicBool,
    fail_subscribes: AtomicUsize,
    duplicate_delivery: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryBus {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capacity(name, DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        let name = name.into();
        debug!(%name, capacity, "InMemoryBus::new: creating bus");
        Self {
            name,
            capacity: capacity.max(1),
            channels: Mutex::new(HashMap::new()),
            published: Mutex::new(VecDeque::new()),
            record_limit: DEFAULT_RECORD_LIMIT,
            published_total: AtomicUsize::new(0),
            fail_publish: AtomicBool::new(false),
            fail_subscribes: AtomicUsize::new(0),
            duplicate_delivery: AtomicBool::new(false),
        }
    }

    /// Keep at most `limit` published messages; older ones are dropped first
    pub fn with_record_limit(mut self, limit: usize) -> Self {
        self.record_limit = limit;
        self
    }

    /// The most recently accepted messages, oldest first
    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.published).iter().cloned().collect()
    }

    /// Messages accepted since creation or the last [`clear_published`](Self::clear_published)
    pub fn published_count(&self) -> usize {
        self.published_total.load(Ordering::SeqCst)
    }

    pub fn clear_published(&self) {
        let mut published = lock(&self.published);
        published.clear();
        self.published_total.store(0, Ordering::SeqCst);
    }

    /// Number of live delivery tasks on `channel`
    pub fn subscriber_count(&self, channel: &str) -> usize {
        lock(&self.channels)
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Make every subsequent publish fail until reset
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` subscribe calls fail
    pub fn fail_next_subscribes(&self, count: usize) {
        self.fail_subscribes.store(count, Ordering::SeqCst);
    }

    /// Deliver every published message twice (at-least-once simulation)
    pub fn set_duplicate_delivery(&self, duplicate: bool) {
        self.duplicate_delivery.store(duplicate, Ordering::SeqCst);
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        lock(&self.channels)
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Sender for `channel` if anyone still listens; channels nobody listens to are forgotten
    fn live_sender(&self, channel: &str) -> Option<broadcast::Sender<String>> {
        let mut channels = lock(&self.channels);
        match channels.get(channel) {
            Some(tx) if tx.receiver_count() > 0 => Some(tx.clone()),
            Some(_) => {
                channels.remove(channel);
                None
            }
            None => None,
        }
    }

    fn record(&self, channel: &str, message: &str) {
        let mut published = lock(&self.published);
        if self.record_limit > 0 {
            if published.len() == self.record_limit {
                published.pop_front();
            }
            published.push_back(PublishedMessage {
                channel: channel.to_string(),
                message: message.to_string(),
            });
        }
        self.published_total.fetch_add(1, Ordering::SeqCst);
    }

    fn take_subscribe_failure(&self) -> bool {
        self.fail_subscribes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    fn name(&self) -> &str {
        &self.name
    }

    async fn subscribe(&self, channel: &str, handler: MessageHandler) -> Result<Subscription, BusError> {
        debug!(bus = %self.name, %channel, "InMemoryBus::subscribe: called");
        if self.take_subscribe_failure() {
            warn!(bus = %self.name, %channel, "InMemoryBus::subscribe: injected failure");
            return Err(BusError::Subscribe {
                channel: channel.to_string(),
                message: "injected failure".to_string(),
            });
        }

        let mut rx = self.sender(channel).subscribe();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let task_channel = channel.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    received = rx.recv() => match received {
                        // Awaited inside the arm: the stop branch is not polled until
                        // the handler for this message has finished
                        Ok(message) => handler(task_channel.clone(), message).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(channel = %task_channel, skipped, "InMemoryBus: subscriber lagged, messages dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!(channel = %task_channel, "InMemoryBus: delivery task stopped");
        });

        Ok(Subscription::new(channel, move || {
            let _ = stop_tx.send(());
        }))
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), BusError> {
        debug!(bus = %self.name, %channel, len = message.len(), "InMemoryBus::publish: called");
        if self.fail_publish.load(Ordering::SeqCst) {
            warn!(bus = %self.name, %channel, "InMemoryBus::publish: injected failure");
            return Err(BusError::Publish {
                channel: channel.to_string(),
                message: "injected failure".to_string(),
            });
        }

        self.record(channel, message);

        // No subscribers is not an error for a fan-out bus
        let Some(tx) = self.live_sender(channel) else {
            return Ok(());
        };
        let copies = if self.duplicate_delivery.load(Ordering::SeqCst) { 2 } else { 1 };
        for _ in 0..copies {
            let _ = tx.send(message.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn forwarding_handler(tx: mpsc::UnboundedSender<(String, String)>) -> MessageHandler {
        Arc::new(move |channel: String, message: String| -> BoxFuture<'static, ()> {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send((channel, message));
            })
        })
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let bus = InMemoryBus::new("memory");
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        let _sub1 = bus.subscribe("events", forwarding_handler(tx1)).await.unwrap();
        let _sub2 = bus.subscribe("events", forwarding_handler(tx2)).await.unwrap();
        assert_eq!(bus.subscriber_count("events"), 2);

        bus.publish("events", "alpha:Reload").await.unwrap();

        let (channel, message) = rx1.recv().await.unwrap();
        assert_eq!(channel, "events");
        assert_eq!(message, "alpha:Reload");
        assert_eq!(rx2.recv().await.unwrap().1, "alpha:Reload");
        assert_eq!(bus.published_count(), 1);
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let bus = InMemoryBus::new("memory");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = bus.subscribe("events", forwarding_handler(tx)).await.unwrap();

        bus.publish("other", "alpha:Reload").await.unwrap();
        bus.publish("events", "beta:Reload").await.unwrap();

        assert_eq!(rx.recv().await.unwrap().1, "beta:Reload");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropping_subscription_stops_delivery() {
        let bus = InMemoryBus::new("memory");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = bus.subscribe("events", forwarding_handler(tx)).await.unwrap();

        drop(sub);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(bus.subscriber_count("events"), 0);

        bus.publish("events", "alpha:Reload").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handler_completes_before_next_delivery() {
        let bus = InMemoryBus::new("memory");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler: MessageHandler = Arc::new(move |_channel: String, message: String| -> BoxFuture<'static, ()> {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(format!("start {}", message));
                tokio::time::sleep(Duration::from_millis(10)).await;
                let _ = tx.send(format!("end {}", message));
            })
        });
        let _sub = bus.subscribe("events", handler).await.unwrap();

        bus.publish("events", "1").await.unwrap();
        bus.publish("events", "2").await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(rx.recv().await.unwrap());
        }
        assert_eq!(seen, vec!["start 1", "end 1", "start 2", "end 2"]);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let bus = InMemoryBus::new("memory");
        let (tx, _rx) = mpsc::unbounded_channel();

        bus.fail_next_subscribes(1);
        assert!(bus.subscribe("events", forwarding_handler(tx.clone())).await.is_err());
        assert!(bus.subscribe("events", forwarding_handler(tx)).await.is_ok());

        bus.set_fail_publish(true);
        assert!(matches!(
            bus.publish("events", "alpha:Reload").await,
            Err(BusError::Publish { .. })
        ));
        assert_eq!(bus.published_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_delivery() {
        let bus = InMemoryBus::new("memory");
        bus.set_duplicate_delivery(true);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = bus.subscribe("events", forwarding_handler(tx)).await.unwrap();

        bus.publish("events", "alpha:Reload").await.unwrap();

        assert_eq!(rx.recv().await.unwrap().1, "alpha:Reload");
        assert_eq!(rx.recv().await.unwrap().1, "alpha:Reload");
        assert_eq!(bus.published_count(), 1);
    }

    #[tokio::test]
    async fn test_published_record_is_bounded() {
        let bus = InMemoryBus::new("memory").with_record_limit(2);
        for i in 0..5 {
            bus.publish("events", &format!("t{}:Reload", i)).await.unwrap();
        }

        let kept: Vec<String> = bus.published().into_iter().map(|m| m.message).collect();
        assert_eq!(kept, vec!["t3:Reload", "t4:Reload"]);
        assert_eq!(bus.published_count(), 5);

        bus.clear_published();
        assert!(bus.published().is_empty());
        assert_eq!(bus.published_count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_channels_are_forgotten() {
        let bus = InMemoryBus::new("memory");
        for i in 0..10 {
            bus.publish(&format!("nobody-{}", i), "alpha:Reload").await.unwrap();
        }
        assert!(lock(&bus.channels).is_empty());

        let (tx, _rx) = mpsc::unbounded_channel();
        let sub = bus.subscribe("events", forwarding_handler(tx)).await.unwrap();
        assert_eq!(lock(&bus.channels).len(), 1);

        drop(sub);
        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.publish("events", "alpha:Reload").await.unwrap();
        assert!(lock(&bus.channels).is_empty());
    }
}
