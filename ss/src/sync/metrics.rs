//! Coordinator counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Snapshot of coordinator activity for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncMetrics {
    pub messages_received: u64,
    pub messages_ignored: u64,
    pub payloads_degraded: u64,
    pub snapshots_adopted: u64,
    pub persist_failures: u64,
    pub reloads_applied: u64,
    pub reload_failures: u64,
    pub marked_initializing: u64,
    pub messages_published: u64,
    pub publish_failures: u64,
    pub publishes_suppressed: u64,
    pub resubscribes: u64,
    pub subscribe_failures: u64,
}

/// Live counters behind [`SyncMetrics`]
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub messages_received: AtomicU64,
    pub messages_ignored: AtomicU64,
    pub payloads_degraded: AtomicU64,
    pub snapshots_adopted: AtomicU64,
    pub persist_failures: AtomicU64,
    pub reloads_applied: AtomicU64,
    pub reload_failures: AtomicU64,
    pub marked_initializing: AtomicU64,
    pub messages_published: AtomicU64,
    pub publish_failures: AtomicU64,
    pub publishes_suppressed: AtomicU64,
    pub resubscribes: AtomicU64,
    pub subscribe_failures: AtomicU64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
    pub fn snapshot(&self) -> SyncMetrics {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        SyncMetrics {
            messages_received: get(&self.messages_received),
            messages_ignored: get(&self.messages_ignored),
            payloads_degraded: get(&self.payloads_degraded),
            snapshots_adopted: get(&self.snapshots_adopted),
            persist_failures: get(&self.persist_failures),
            reloads_applied: get(&self.reloads_applied),
            reload_failures: get(&self.reload_failures),
            marked_initializing: get(&self.marked_initializing),
            messages_published: get(&self.messages_published),
            publish_failures: get(&self.publish_failures),
            publishes_suppressed: get(&self.publishes_suppressed),
            resubscribes: get(&self.resubscribes),
            subscribe_failures: get(&self.subscribe_failures),
        }
    }
}
