//! Domain types shared by the codec, the coordinator and the external contracts
//!
//! - [`TenantSettings`] / [`TenantState`] - what a tenant is and which lifecycle phase it is in
//! - [`ShellEvent`] / [`EventKind`] - the lifecycle message exchanged over the channel

mod event;
mod settings;

pub use event::{EventKind, ShellEvent};
pub use settings::{TenantSettings, TenantState};
