//! ShellSync - tenant shell lifecycle synchronization over pub/sub
//!
//! Nodes hosting the same set of tenants stay consistent without a coordinator service:
//! each node announces tenant setup and reloads on a shared channel, and replays what its
//! peers announce as local reloads.
//!
//! # Core Concepts
//!
//! - **Best-effort convergence**: a lost message means coordination does not happen this
//!   time, never a crash or corrupted local state
//! - **Snapshots over deltas**: a `Reload` carries the full settings, so applying it twice
//!   is the same as applying it once
//! - **Explicit loop-breaking**: reloads done on behalf of a channel message never publish
//!
//! # Modules
//!
//! - [`codec`] - Wire format of channel messages
//! - [`sync`] - The synchronization coordinator
//! - [`bus`] - Message bus contract and the in-process bus
//! - [`store`] - Persisted tenant settings
//! - [`registry`] - Live tenant contexts
//! - [`deferred`] - Work deferred until a unit of work completes
//! - [`node`] - Host harness wiring one process
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod bus;
pub mod cli;
pub mod codec;
pub mod config;
pub mod deferred;
pub mod domain;
pub mod node;
pub mod registry;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use bus::{BusError, BusRegistry, BusSelection, InMemoryBus, MessageBus, MessageHandler, Subscription};
pub use codec::{CodecError, IgnoreReason, ParseResult, PayloadError, decode, encode};
pub use config::{Config, SimulationConfig, StorageConfig};
pub use deferred::{DEFAULT_ORDER, DeferredScheduler, DeferredTask, UnitOfWork};
pub use domain::{EventKind, ShellEvent, TenantSettings, TenantState};
pub use node::Node;
pub use registry::{LocalRegistry, RegistryError, RegistryEvent, RuntimeRegistry, TenantContext};
pub use store::{FileStore, MemoryStore, StateStore, StoreError};
pub use sync::{
    Origin, PersistResult, PublishOutcome, ReceiveOutcome, ReloadReport, ShellSync, SubscriptionPhase,
    SubscriptionState, Suppression, SyncConfig, SyncMetrics,
};
