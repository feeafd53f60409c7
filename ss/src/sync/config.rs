//! Coordinator configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bus::{BusSelection, DEFAULT_CHANNEL_CAPACITY};

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Channel dedicated to tenant lifecycle events
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Name of the tenant responsible for cluster-wide coordination
    #[serde(rename = "control-tenant", default = "default_control_tenant")]
    pub control_tenant: String,

    /// Deferred-task order of the reload publish (after ordinary deferred work)
    #[serde(rename = "publish-order", default = "default_publish_order")]
    pub publish_order: i32,

    /// Which registered bus is the active one, written as `last-registered` or `named: <bus>`
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub bus: BusSelection,

    /// Subscribe attempts before the one-shot subscription gives up
    #[serde(rename = "subscribe-attempts", default = "default_subscribe_attempts")]
    pub subscribe_attempts: u32,

    /// Delay between subscribe attempts in milliseconds
    #[serde(rename = "subscribe-retry-delay-ms", default = "default_subscribe_retry_delay_ms")]
    pub subscribe_retry_delay_ms: u64,

    /// Per-channel buffer of the in-process bus
    #[serde(rename = "bus-capacity", default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

fn default_channel() -> String {
    debug!("default_channel: called");
    "shell-changed".to_string()
}

fn default_control_tenant() -> String {
    debug!("default_control_tenant: called");
    "Default".to_string()
}

fn default_publish_order() -> i32 {
    debug!("default_publish_order: called");
    100
}

fn default_subscribe_attempts() -> u32 {
    debug!("default_subscribe_attempts: called");
    3
}

fn default_subscribe_retry_delay_ms() -> u64 {
    debug!("default_subscribe_retry_delay_ms: called");
    250
}

fn default_bus_capacity() -> usize {
    debug!("default_bus_capacity: called");
    DEFAULT_CHANNEL_CAPACITY
}

impl Default for SyncConfig {
    fn default() -> Self {
        debug!("SyncConfig::default: called");
        Self {
            channel: default_channel(),
            control_tenant: default_control_tenant(),
            publish_order: default_publish_order(),
            bus: BusSelection::default(),
            subscribe_attempts: default_subscribe_attempts(),
            subscribe_retry_delay_ms: default_subscribe_retry_delay_ms(),
            bus_capacity: default_bus_capacity(),
        }
    }
}

impl SyncConfig {
    /// Delay between subscribe attempts as a Duration
    pub fn subscribe_retry_delay(&self) -> Duration {
        Duration::from_millis(self.subscribe_retry_delay_ms)
    }

    pub fn is_control(&self, tenant: &str) -> bool {
        tenant == self.control_tenant
    }
}
