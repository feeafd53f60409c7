//! Typed results of the receive and publish paths
//!
//! The coordinator never fails outward; every path ends in one of these values so callers
//! and tests can tell "coordination happened" from "coordination was skipped, and why".

use std::fmt;

use crate::codec::{IgnoreReason, PayloadError};
use crate::deferred::DeferredScheduler;

/// Where a local reload trigger comes from
#[derive(Clone, Copy)]
pub enum Origin<'a> {
    /// A genuine trigger running inside a unit of work with an active tenant scope
    Scoped(&'a dyn DeferredScheduler),
    /// A reload performed on behalf of a channel message, or with no ambient scope
    Internal,
}

impl fmt::Debug for Origin<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scoped(_) => f.write_str("Scoped"),
            Self::Internal => f.write_str("Internal"),
        }
    }
}

/// Outcome of persisting a snapshot adopted from a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistResult {
    Saved,
    /// Storage failed; the in-memory reload still used the adopted snapshot
    Failed(String),
}

/// Why a publish did not happen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// No message bus is configured
    NoBus,
    /// The reload was caused by a channel message (loop breaker)
    InternalOrigin,
    /// The tenant is being set up by a peer
    Initializing,
    /// The control tenant has no live context to publish through
    ControlUnavailable,
    /// The tenant has no live context to snapshot
    UnknownTenant,
}

/// Outcome of a publish trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The event was handed to the bus
    Published,
    /// A publish task was queued on the unit of work
    Deferred,
    Suppressed(Suppression),
    /// The bus or the codec rejected the event; not retried
    Failed(String),
}

impl PublishOutcome {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Self::Suppressed(_))
    }
}

/// Details of a reload applied for a received event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadReport {
    pub tenant: String,
    /// The event's snapshot differed from local storage and was adopted
    pub adopted: bool,
    /// Result of persisting the adopted snapshot, if one was adopted
    pub persist: Option<PersistResult>,
    /// Why the event's snapshot was unusable, if it was
    pub payload_error: Option<PayloadError>,
    /// Control instances re-subscribed after reloading the control tenant
    pub resubscribed: usize,
    /// Generation of the rebuilt context
    pub generation: u64,
}

/// Outcome of handling one channel message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Not a message of this protocol
    Ignored(IgnoreReason),
    /// No settings could be resolved for the tenant
    Unresolved { tenant: String },
    /// Settings exist but the tenant has no live context here
    NotLoaded { tenant: String },
    MarkedInitializing { tenant: String },
    Reloaded(ReloadReport),
    ReloadFailed { tenant: String, error: String },
}
