//! Tenant lifecycle synchronization
//!
//! [`ShellSync`] keeps the tenants hosted by this process consistent with the rest of
//! the fleet using nothing but a pub/sub channel:
//!
//! - **Receive:** one subscription per process, owned by the control tenant's context.
//!   Every inbound event is decoded, merged with local storage and replayed as a local
//!   reload or an `Initializing` mark.
//! - **Publish:** `Initialize` before a tenant's setup runs, and a full `Reload` snapshot
//!   after a genuine local reload, deferred until the triggering unit of work has settled.
//!
//! Loops are broken explicitly: reloads performed on behalf of a channel message carry
//! [`Origin::Internal`] and never publish.

mod config;
mod core;
mod metrics;
mod outcome;
mod state;

pub use config::SyncConfig;
pub use core::ShellSync;
pub use metrics::SyncMetrics;
pub use outcome::{Origin, PersistResult, PublishOutcome, ReceiveOutcome, ReloadReport, Suppression};
pub use state::{SubscriptionPhase, SubscriptionState};
