//! Tenant settings and lifecycle state

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Lifecycle state of a tenant
///
/// Only `Running` and `Initializing` are manipulated by the synchronization protocol;
/// `Uninitialized` and `Disabled` pass through untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TenantState {
    #[default]
    Uninitialized,
    Running,
    Initializing,
    Disabled,
}

impl fmt::Display for TenantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "Uninitialized",
            Self::Running => "Running",
            Self::Initializing => "Initializing",
            Self::Disabled => "Disabled",
        };
        write!(f, "{}", s)
    }
}

/// Settings of one tenant
///
/// `config` is opaque to the coordinator. A `BTreeMap` keeps equality independent of
/// insertion order, so two snapshots with the same content always compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantSettings {
    /// Unique, stable tenant identifier
    pub name: String,

    /// Current lifecycle state
    #[serde(default)]
    pub state: TenantState,

    /// Opaque configuration payload
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
}

impl TenantSettings {
    /// Create settings for a tenant in the `Uninitialized` state
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        debug!(%name, "TenantSettings::new: called");
        Self {
            name,
            state: TenantState::Uninitialized,
            config: BTreeMap::new(),
        }
    }

    /// Builder-style state setter
    pub fn with_state(mut self, state: TenantState) -> Self {
        self.state = state;
        self
    }

    /// Builder-style configuration entry
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Look up a configuration entry
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    pub fn is_initializing(&self) -> bool {
        self.state == TenantState::Initializing
    }
}
