//! Deferred tasks
//!
//! Work registered against a unit of work (an inbound request, a CLI command) that only
//! runs once that unit has finished, so whatever the unit persisted has settled first.
//! Tasks run sequentially ordered by `(order, registration sequence)`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use futures::future::BoxFuture;
use tracing::debug;

/// Deferred work item
pub type DeferredTask = BoxFuture<'static, ()>;

/// Order of ordinary deferred work
pub const DEFAULT_ORDER: i32 = 0;

/// Something that accepts work to run after the current unit of work completes
pub trait DeferredScheduler: Send + Sync {
    /// Queue `task`; lower `order` runs first, ties run in registration order
    fn schedule(&self, order: i32, task: DeferredTask);
}

struct Entry {
    order: i32,
    seq: u64,
    task: DeferredTask,
}

/// A unit of work collecting deferred tasks
pub struct UnitOfWork {
    label: String,
    tasks: Mutex<Vec<Entry>>,
    seq: AtomicU64,
}

impl UnitOfWork {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        debug!(%label, "UnitOfWork::new: called");
        Self {
            label,
            tasks: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of tasks waiting for completion
    pub fn pending(&self) -> usize {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Finish the unit of work and run its deferred tasks
    ///
    /// Returns the number of tasks run.
    pub async fn complete(self) -> usize {
        debug!(label = %self.label, "UnitOfWork::complete: called");
        let mut batch = self.tasks.into_inner().unwrap_or_else(PoisonError::into_inner);
        batch.sort_by_key(|e| (e.order, e.seq));

        let ran = batch.len();
        for entry in batch {
            debug!(label = %self.label, order = entry.order, seq = entry.seq, "UnitOfWork::complete: running task");
            entry.task.await;
        }
        debug!(label = %self.label, ran, "UnitOfWork::complete: done");
        ran
    }
}

impl DeferredScheduler for UnitOfWork {
    fn schedule(&self, order: i32, task: DeferredTask) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        debug!(label = %self.label, order, seq, "UnitOfWork::schedule: called");
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Entry { order, seq, task });
    }
}
