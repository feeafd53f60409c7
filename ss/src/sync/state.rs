//! One-shot subscription state
//!
//! The first time the control tenant finishes initializing, the process subscribes to the
//! channel. Concurrent initializations collapse into one subscribe cycle: entry is gated
//! by a single-permit semaphore, and the phase moves to `Subscribed` when the cycle ends
//! whether or not the subscribe call succeeded. The state is injected into the
//! coordinator, so tests get a fresh one per case.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::sync::Semaphore;
use tracing::debug;

/// Lifecycle of the process-wide subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionPhase {
    NotSubscribed,
    Subscribing,
    /// Terminal for the lifetime of the state object
    Subscribed,
}

pub struct SubscriptionState {
    gate: Semaphore,
    phase: Mutex<SubscriptionPhase>,
}

impl Default for SubscriptionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Moves the phase to `Subscribed` when dropped, even on early return or panic
struct SubscribedOnDrop<'a>(&'a SubscriptionState);

impl Drop for SubscribedOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set_phase(SubscriptionPhase::Subscribed);
    }
}

impl SubscriptionState {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(1),
            phase: Mutex::new(SubscriptionPhase::NotSubscribed),
        }
    }

    pub fn phase(&self) -> SubscriptionPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_subscribed(&self) -> bool {
        self.phase() == SubscriptionPhase::Subscribed
    }

    fn set_phase(&self, phase: SubscriptionPhase) {
        debug!(?phase, "SubscriptionState::set_phase: called");
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    /// Run `subscribe` unless a cycle already ran
    ///
    /// Returns `Some(result)` for the caller that ran the cycle and `None` for every
    /// caller that found the state already `Subscribed`.
    pub async fn run_once<F, Fut, T>(&self, subscribe: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if self.is_subscribed() {
            return None;
        }

        let _permit = self.gate.acquire().await.ok()?;
        if self.is_subscribed() {
            debug!("SubscriptionState::run_once: subscribed while waiting");
            return None;
        }

        self.set_phase(SubscriptionPhase::Subscribing);
        let _finally = SubscribedOnDrop(self);
        Some(subscribe().await)
    }
}
