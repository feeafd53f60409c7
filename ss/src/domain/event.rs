//! Lifecycle events exchanged between nodes

use std::fmt;
use std::str::FromStr;

use super::settings::TenantSettings;

/// Kind of lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A node is about to run setup for the tenant
    Initialize,
    /// The tenant was reloaded on a node
    Reload,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialize => "Initialize",
            Self::Reload => "Reload",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Initialize" => Ok(Self::Initialize),
            "Reload" => Ok(Self::Reload),
            other => Err(format!("unknown event kind: {}", other)),
        }
    }
}

/// One lifecycle event concerning exactly one tenant
///
/// `payload` is only meaningful for [`EventKind::Reload`] and carries a full snapshot
/// of the tenant's settings at publish time.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellEvent {
    pub tenant: String,
    pub kind: EventKind,
    pub payload: Option<TenantSettings>,
}

impl ShellEvent {
    pub fn initialize(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            kind: EventKind::Initialize,
            payload: None,
        }
    }

    /// Reload request without a snapshot; receivers reload from their own storage
    pub fn reload(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            kind: EventKind::Reload,
            payload: None,
        }
    }

    /// Reload carrying a full settings snapshot
    pub fn reload_with(settings: TenantSettings) -> Self {
        Self {
            tenant: settings.name.clone(),
            kind: EventKind::Reload,
            payload: Some(settings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tokens() {
        assert_eq!(EventKind::Initialize.to_string(), "Initialize");
        assert_eq!("Reload".parse::<EventKind>(), Ok(EventKind::Reload));
        assert!("reload".parse::<EventKind>().is_err());
        assert!("Bogus".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_reload_with_takes_tenant_from_settings() {
        let event = ShellEvent::reload_with(TenantSettings::new("gamma"));
        assert_eq!(event.tenant, "gamma");
        assert_eq!(event.kind, EventKind::Reload);
        assert!(event.payload.is_some());
    }
}
