//! Registered bus implementations and the policy that picks the active one

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::MessageBus;

/// Which registered bus the coordinator binds to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BusSelection {
    /// The most recently registered bus wins
    #[default]
    LastRegistered,
    /// Bind the bus with this name; no bus if none matches
    Named(String),
}

/// Every bus implementation registered in this process, in registration order
#[derive(Default, Clone)]
pub struct BusRegistry {
    buses: Vec<Arc<dyn MessageBus>>,
}

impl BusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding a single bus
    pub fn single(bus: Arc<dyn MessageBus>) -> Self {
        let mut registry = Self::new();
        registry.register(bus);
        registry
    }

    pub fn register(&mut self, bus: Arc<dyn MessageBus>) {
        debug!(bus = bus.name(), position = self.buses.len(), "BusRegistry::register: called");
        self.buses.push(bus);
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.buses.iter().map(|b| b.name().to_string()).collect()
    }

    /// Resolve the active bus under `selection`
    pub fn select(&self, selection: &BusSelection) -> Option<Arc<dyn MessageBus>> {
        debug!(?selection, registered = self.buses.len(), "BusRegistry::select: called");
        match selection {
            BusSelection::LastRegistered => self.buses.last().cloned(),
            BusSelection::Named(name) => {
                let found = self.buses.iter().rev().find(|b| b.name() == name).cloned();
                if found.is_none() && !self.buses.is_empty() {
                    warn!(%name, registered = ?self.names(), "BusRegistry::select: no bus with configured name");
                }
                found
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;

    fn registry() -> BusRegistry {
        let mut registry = BusRegistry::new();
        registry.register(Arc::new(InMemoryBus::new("first")));
        registry.register(Arc::new(InMemoryBus::new("second")));
        registry
    }

    #[test]
    fn test_empty_registry_selects_nothing() {
        let registry = BusRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.select(&BusSelection::LastRegistered).is_none());
        assert!(registry.select(&BusSelection::Named("first".into())).is_none());
    }

    #[test]
    fn test_last_registered_wins() {
        let bus = registry().select(&BusSelection::LastRegistered).unwrap();
        assert_eq!(bus.name(), "second");
    }

    #[test]
    fn test_named_selection() {
        let registry = registry();
        let bus = registry.select(&BusSelection::Named("first".into())).unwrap();
        assert_eq!(bus.name(), "first");
        assert!(registry.select(&BusSelection::Named("redis".into())).is_none());
    }

    fn selection_from_yaml(yaml: &str) -> BusSelection {
        serde_yaml::with::singleton_map::deserialize(serde_yaml::Deserializer::from_str(yaml)).unwrap()
    }

    #[test]
    fn test_selection_yaml_forms() {
        assert_eq!(selection_from_yaml("last-registered"), BusSelection::LastRegistered);
        assert_eq!(
            selection_from_yaml("named: redis"),
            BusSelection::Named("redis".to_string())
        );
    }
}
